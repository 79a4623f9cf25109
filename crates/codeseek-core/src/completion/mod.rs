//! Retrieval-augmented inline completion.
//!
//! A [`CompletionService`] owns one [`CompletionSession`] per document. Each session
//! debounces requests and allows one generation at a time; the shared
//! [`CompletionPipeline`] turns a cursor position into a cleaned suggestion.

pub mod clean;
pub mod context;
pub mod prompt;
pub mod session;

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use codeseek_index::IndexError;
use codeseek_index::embedder::Embedder;
use codeseek_index::languages::is_supported;
use codeseek_index::project::{Project, resolve_project};
use codeseek_index::store::{ChunkRow, CodeStore};
use codeseek_llm::{GenerateRequest, LlmProvider};
use tokio_util::sync::CancellationToken;

pub use clean::clean_completion;
pub use context::CompletionContext;
pub use session::{CompletionSession, Phase};

use crate::config::{CompletionConfig, CompletionMode};

/// Session count above which idle, unreferenced sessions are dropped on the next insert.
pub const MAX_SESSIONS: usize = 256;

/// A single inline suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
}

impl Completion {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Document text and cursor at the moment of a trigger.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub path: PathBuf,
    pub text: String,
    /// Zero-based line.
    pub line: usize,
    /// Zero-based column in characters.
    pub column: usize,
}

impl DocumentSnapshot {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            line,
            column,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("generation service error: {0}")]
    Generation(String),

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("index store error: {0}")]
    Store(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<IndexError> for CompletionError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Embedding(msg) => Self::Embedding(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Run `fut` unless `cancel` fires before or during it.
async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, CompletionError> {
    if cancel.is_cancelled() {
        return Err(CompletionError::Cancelled);
    }
    let out = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(CompletionError::Cancelled),
        out = fut => out,
    };
    if cancel.is_cancelled() {
        return Err(CompletionError::Cancelled);
    }
    Ok(out)
}

/// Context assembly, optional retrieval, generation and cleaning.
pub struct CompletionPipeline<P> {
    provider: Arc<P>,
    embedder: Embedder<P>,
    store: CodeStore,
    projects: Vec<Project>,
    config: CompletionConfig,
}

impl<P> std::fmt::Debug for CompletionPipeline<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPipeline")
            .field("mode", &self.config.mode)
            .field("projects", &self.projects)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> CompletionPipeline<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: CodeStore,
        roots: Vec<PathBuf>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            embedder: Embedder::new(Arc::clone(&provider)),
            provider,
            store,
            projects: roots.into_iter().map(Project::from_root).collect(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    /// Produce at most one suggestion for the cursor in `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError::Cancelled`] if `cancel` fires, or the service
    /// error that stopped the request.
    pub async fn complete(
        &self,
        doc: &DocumentSnapshot,
        cancel: &CancellationToken,
    ) -> Result<Option<Completion>, CompletionError> {
        let mut ctx = CompletionContext::around_cursor(
            &doc.text,
            doc.line,
            doc.column,
            self.config.before_lines,
            self.config.after_lines,
        );

        let prompt = match self.config.mode {
            CompletionMode::Retrieval => {
                ctx.chunks = self.retrieve(&doc.path, &ctx.before, cancel).await?;
                prompt::retrieval_prompt(&ctx, &self.config.sentinel)
            }
            CompletionMode::LocalContext => {
                prompt::local_context_prompt(&ctx, &self.config.sentinel)
            }
        };

        let request = GenerateRequest::new(prompt)
            .with_temperature(self.config.temperature)
            .with_context_length(self.config.context_length);
        let raw = unless_cancelled(cancel, self.provider.generate(&request))
            .await?
            .map_err(|e| CompletionError::Generation(e.to_string()))?;

        let cleaned = clean_completion(&raw, self.config.mode, &ctx, &self.config.sentinel);
        tracing::debug!(
            file = %doc.path.display(),
            chunks = ctx.chunks.len(),
            raw_len = raw.len(),
            suggested = cleaned.is_some(),
            "completion generated"
        );
        Ok(cleaned.map(Completion::new))
    }

    /// Nearest chunks for `before`; empty when the document has no indexed project.
    async fn retrieve(
        &self,
        path: &Path,
        before: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkRow>, CompletionError> {
        if self.config.top_k == 0 || before.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(project) = resolve_project(&self.projects, path) else {
            tracing::debug!(file = %path.display(), "no project for document, skipping retrieval");
            return Ok(Vec::new());
        };
        let Some(table) = unless_cancelled(cancel, self.store.open(project)).await?? else {
            tracing::debug!(project = project.id(), "project not indexed, skipping retrieval");
            return Ok(Vec::new());
        };

        let query = unless_cancelled(cancel, self.embedder.embed(before)).await??;
        if query.len() != table.dimension() {
            return Err(CompletionError::Embedding(format!(
                "query has {} dimensions, table {} expects {}",
                query.len(),
                table.name(),
                table.dimension()
            )));
        }
        let hits =
            unless_cancelled(cancel, table.vector_search(&query, self.config.top_k)).await??;
        Ok(hits.into_iter().map(|hit| hit.row).collect())
    }
}

/// Completion entry point for a host: one session per document.
///
/// Hosts should call [`close`](Self::close) when a document closes. Sessions left behind are
/// pruned once more than [`MAX_SESSIONS`] exist, which also drops their last result.
pub struct CompletionService<P> {
    pipeline: Arc<CompletionPipeline<P>>,
    sessions: Mutex<HashMap<PathBuf, Arc<CompletionSession>>>,
    enabled: AtomicBool,
}

impl<P> std::fmt::Debug for CompletionService<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionService")
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> CompletionService<P> {
    #[must_use]
    pub fn new(pipeline: CompletionPipeline<P>) -> Self {
        let enabled = pipeline.config().enabled;
        Self {
            pipeline: Arc::new(pipeline),
            sessions: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(enabled),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &CompletionPipeline<P> {
        &self.pipeline
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Session for `path`, created on first use.
    #[must_use]
    pub fn session(&self, path: &Path) -> Arc<CompletionSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions.len() >= MAX_SESSIONS && !sessions.contains_key(path) {
            let before = sessions.len();
            sessions.retain(|_, s| Arc::strong_count(s) > 1 || s.phase() != Phase::Idle);
            tracing::debug!(pruned = before - sessions.len(), "pruned idle completion sessions");
        }
        let config = self.pipeline.config();
        Arc::clone(sessions.entry(path.to_path_buf()).or_insert_with(|| {
            Arc::new(CompletionSession::new(
                Duration::from_millis(config.debounce_ms),
                config.busy_policy,
            ))
        }))
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget the session for a closed document.
    pub fn close(&self, path: &Path) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Handle one trigger. Every failure collapses to `None`.
    pub async fn request(
        &self,
        doc: DocumentSnapshot,
        cancel: CancellationToken,
    ) -> Option<Completion> {
        if !self.is_enabled() || !is_supported(&doc.path) {
            return None;
        }
        let session = self.session(&doc.path);
        let pipeline = &self.pipeline;
        let (doc, token) = (&doc, &cancel);
        session
            .request(&cancel, move || async move {
                match pipeline.complete(doc, token).await {
                    Ok(result) => result,
                    Err(CompletionError::Cancelled) => {
                        tracing::debug!(file = %doc.path.display(), "completion cancelled");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(file = %doc.path.display(), "completion failed: {e}");
                        None
                    }
                }
            })
            .await
    }
}

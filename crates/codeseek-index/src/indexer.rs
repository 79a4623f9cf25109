//! Project indexing orchestrator: walk → chunk → embed → store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, UNIX_EPOCH};

use codeseek_llm::LlmProvider;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::chunker::{Chunker, ChunkerConfig};
use crate::embedder::Embedder;
use crate::error::{IndexError, Result};
use crate::languages::{DEFAULT_EXCLUDE_GLOBS, PathFilter, is_supported};
use crate::project::{Project, resolve_project};
use crate::store::{ChunkPredicate, CodeStore, IndexedChunk, ProjectTable};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Root-relative exclusion globs.
    pub exclude: Vec<String>,
    pub respect_gitignore: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            exclude: DEFAULT_EXCLUDE_GLOBS.iter().map(|g| (*g).to_owned()).collect(),
            respect_gitignore: true,
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed { chunks: usize },
    /// Rows with the current mtime already exist.
    Unchanged,
    /// Nothing but whitespace.
    Empty,
    /// The file is gone; its rows were deleted.
    Removed,
    /// Unsupported extension or excluded path.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Summary of one project within a bulk run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub root: PathBuf,
    pub files: Vec<FileReport>,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
    pub chunks_created: usize,
    /// Rows evicted because their file is no longer eligible.
    pub chunks_removed: usize,
    /// Set when the project's table could not be opened.
    pub error: Option<String>,
}

impl ProjectReport {
    fn new(project: &Project) -> Self {
        Self {
            project: project.id().to_owned(),
            root: project.root().to_path_buf(),
            ..Self::default()
        }
    }

    fn record(&mut self, file: PathBuf, outcome: FileOutcome) {
        match &outcome {
            FileOutcome::Indexed { chunks } => {
                self.files_indexed += 1;
                self.chunks_created += chunks;
            }
            FileOutcome::Unchanged => self.files_unchanged += 1,
            FileOutcome::Failed { .. } => self.files_failed += 1,
            FileOutcome::Empty | FileOutcome::Removed | FileOutcome::Skipped => {}
        }
        self.files.push(FileReport { file, outcome });
    }
}

/// Summary of a bulk run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub projects: Vec<ProjectReport>,
    pub files_total: usize,
    pub duration_ms: u64,
}

impl BulkReport {
    #[must_use]
    pub fn files_indexed(&self) -> usize {
        self.projects.iter().map(|p| p.files_indexed).sum()
    }

    #[must_use]
    pub fn files_failed(&self) -> usize {
        self.projects.iter().map(|p| p.files_failed).sum()
    }
}

/// Progress notifications for a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    Started { total: usize },
    Progress { project: String, processed: usize, total: usize },
    ProjectDone { project: String, indexed: usize, failed: usize },
    FileUpdated { file: PathBuf, outcome: FileOutcome },
}

/// Orchestrates code indexing over one or more project roots.
pub struct CodeIndexer<P> {
    store: CodeStore,
    embedder: Embedder<P>,
    chunker: Chunker,
    filter: PathFilter,
    respect_gitignore: bool,
    projects: Vec<Project>,
    bulk_running: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedSender<IndexEvent>>,
}

impl<P> std::fmt::Debug for CodeIndexer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIndexer")
            .field("projects", &self.projects)
            .finish_non_exhaustive()
    }
}

/// Clears the bulk flag when a run ends, however it ends.
struct BulkGuard(Arc<AtomicBool>);

impl Drop for BulkGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<P: LlmProvider> CodeIndexer<P> {
    /// # Errors
    ///
    /// Returns [`IndexError::Pattern`] if an exclusion glob is invalid.
    pub fn new(
        store: CodeStore,
        provider: Arc<P>,
        roots: Vec<PathBuf>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let filter = PathFilter::new(&config.exclude)?;
        let mut projects: Vec<Project> = Vec::with_capacity(roots.len());
        for root in roots {
            if !projects.iter().any(|p| p.root() == root) {
                projects.push(Project::from_root(root));
            }
        }
        Ok(Self {
            store,
            embedder: Embedder::new(provider),
            chunker: Chunker::new(config.chunker),
            filter,
            respect_gitignore: config.respect_gitignore,
            projects,
            bulk_running: Arc::new(AtomicBool::new(false)),
            events: None,
        })
    }

    #[must_use]
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<IndexEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    #[must_use]
    pub fn store(&self) -> &CodeStore {
        &self.store
    }

    #[must_use]
    pub fn is_bulk_running(&self) -> bool {
        self.bulk_running.load(Ordering::SeqCst)
    }

    /// Index every eligible file under every root, skipping unchanged files.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::BulkInProgress`] if another bulk run is active.
    /// Failures scoped to a project or a file are recorded in the report.
    pub async fn index_all(&self) -> Result<BulkReport> {
        if self
            .bulk_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("bulk indexing already in progress, request ignored");
            return Err(IndexError::BulkInProgress);
        }
        let _guard = BulkGuard(Arc::clone(&self.bulk_running));

        let start = Instant::now();
        let plan: Vec<(&Project, Vec<PathBuf>)> = self
            .projects
            .iter()
            .map(|p| (p, self.eligible_files(p)))
            .collect();
        let total: usize = plan.iter().map(|(_, files)| files.len()).sum();
        tracing::info!(total, projects = plan.len(), "indexing started");
        self.emit(IndexEvent::Started { total });

        let mut report = BulkReport {
            files_total: total,
            ..BulkReport::default()
        };
        let mut processed = 0usize;
        for (project, files) in plan {
            let project_report = self.index_project(project, &files, &mut processed, total).await;
            self.emit(IndexEvent::ProjectDone {
                project: project.id().to_owned(),
                indexed: project_report.files_indexed,
                failed: project_report.files_failed,
            });
            report.projects.push(project_report);
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            indexed = report.files_indexed(),
            failed = report.files_failed(),
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }

    async fn index_project(
        &self,
        project: &Project,
        files: &[PathBuf],
        processed: &mut usize,
        total: usize,
    ) -> ProjectReport {
        let mut report = ProjectReport::new(project);
        let table = match self.store.open_or_create(project, &self.embedder).await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(project = project.id(), "cannot open index table: {e}");
                report.error = Some(e.to_string());
                *processed += files.len();
                return report;
            }
        };

        for path in files {
            *processed += 1;
            let outcome = match self.index_file(&table, path).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(file = %path.display(), "indexing failed: {e}");
                    FileOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            tracing::debug!(
                project = project.id(),
                file = %path.display(),
                progress = format_args!("{processed}/{total}"),
                ?outcome,
            );
            report.record(path.clone(), outcome);
            self.emit(IndexEvent::Progress {
                project: project.id().to_owned(),
                processed: *processed,
                total,
            });
        }

        let current: BTreeSet<String> = files.iter().map(|p| path_key(p)).collect();
        match self.evict_stale(project, &table, &current).await {
            Ok(removed) => report.chunks_removed = removed,
            Err(e) => tracing::warn!(project = project.id(), "stale chunk eviction failed: {e}"),
        }
        report
    }

    /// Delete rows for files that were indexed before but are no longer eligible.
    ///
    /// Roots with the same basename share a table, so only rows owned by `project` are
    /// candidates.
    async fn evict_stale(
        &self,
        project: &Project,
        table: &ProjectTable,
        current: &BTreeSet<String>,
    ) -> Result<usize> {
        let mut removed = 0;
        for file in table.indexed_files().await? {
            if current.contains(&file) {
                continue;
            }
            let owned = resolve_project(&self.projects, Path::new(&file))
                .is_some_and(|owner| owner == project);
            if !owned {
                continue;
            }
            let predicate = ChunkPredicate::file(file.as_str());
            removed += table.query_where(&predicate).await?.len();
            table.delete_where(&predicate).await?;
            tracing::debug!(file = %file, "evicted stale chunks");
        }
        Ok(removed)
    }

    async fn index_file(&self, table: &ProjectTable, path: &Path) -> Result<FileOutcome> {
        let file = path_key(path);
        let mtime = file_mtime(path).await?;
        let current = table.query_where(&ChunkPredicate::file_at(file.as_str(), mtime)).await?;
        if !current.is_empty() {
            return Ok(FileOutcome::Unchanged);
        }

        let text = read_source(path).await?;
        if text.is_empty() {
            let predicate = ChunkPredicate::file(file.as_str());
            if !table.query_where(&predicate).await?.is_empty() {
                table.delete_where(&predicate).await?;
            }
            return Ok(FileOutcome::Empty);
        }

        let chunks = self.write_chunks(table, &file, mtime, &text).await?;
        Ok(FileOutcome::Indexed { chunks })
    }

    /// Embed every chunk, then replace the file's rows.
    async fn write_chunks(
        &self,
        table: &ProjectTable,
        file: &str,
        mtime: i64,
        text: &str,
    ) -> Result<usize> {
        let chunks = self.chunker.split(text);
        let embeddings = self
            .embedder
            .embed_batch(&chunks, Some(table.dimension()))
            .await?;
        let rows: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| IndexedChunk {
                id: format!("{file}-{i}"),
                file: file.to_owned(),
                mtime,
                text,
                embedding,
            })
            .collect();
        let count = rows.len();
        // Not atomic: a reader may briefly see no rows for this file.
        table.delete_where(&ChunkPredicate::file(file)).await?;
        table.upsert(rows).await?;
        Ok(count)
    }

    /// Re-embed one file after a change notification.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoProject`] if no root contains `path`, or the
    /// store, embedding, or file access error that stopped the update.
    pub async fn reindex_file(&self, path: &Path) -> Result<FileOutcome> {
        if !is_supported(path) {
            return Ok(FileOutcome::Skipped);
        }
        let project = resolve_project(&self.projects, path)
            .ok_or_else(|| IndexError::NoProject(path.to_path_buf()))?;
        if !self.filter.is_eligible(project.root(), path) {
            return Ok(FileOutcome::Skipped);
        }

        let table = self.store.open_or_create(project, &self.embedder).await?;
        let file = path_key(path);
        let outcome = match tokio::fs::metadata(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                table.delete_where(&ChunkPredicate::file(file.as_str())).await?;
                FileOutcome::Removed
            }
            Err(source) => {
                return Err(IndexError::FileAccess {
                    path: path.to_path_buf(),
                    source,
                });
            }
            Ok(_) => {
                let mtime = file_mtime(path).await?;
                let text = read_source(path).await?;
                if text.is_empty() {
                    table.delete_where(&ChunkPredicate::file(file.as_str())).await?;
                    FileOutcome::Empty
                } else {
                    let chunks = self.write_chunks(&table, &file, mtime, &text).await?;
                    FileOutcome::Indexed { chunks }
                }
            }
        };

        tracing::info!(project = project.id(), file = %path.display(), ?outcome, "file reindexed");
        self.emit(IndexEvent::FileUpdated {
            file: path.to_path_buf(),
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    /// Eligible files under `project`, sorted, excluding those owned by a nested root.
    fn eligible_files(&self, project: &Project) -> Vec<PathBuf> {
        ignore::WalkBuilder::new(project.root())
            .hidden(true)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
            .flatten()
            .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
            .map(ignore::DirEntry::into_path)
            .filter(|path| self.filter.is_eligible(project.root(), path))
            .filter(|path| {
                resolve_project(&self.projects, path).is_some_and(|owner| owner == project)
            })
            .collect()
    }

    fn emit(&self, event: IndexEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// The string stored in the `file` column.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn file_mtime(path: &Path) -> Result<i64> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| IndexError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
    let modified = meta.modified().map_err(|source| IndexError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    Ok(i64::try_from(millis).unwrap_or(i64::MAX))
}

/// File contents, lossily decoded and trimmed.
async fn read_source(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| IndexError::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use codeseek_llm::mock::MockProvider;
    use codeseek_store::{
        BoxFuture, InMemoryVectorStore, ScoredVectorPoint, StoredPoint, VectorFilter, VectorPoint,
        VectorStore, VectorStoreError,
    };

    use super::*;

    /// Delegates to the in-memory store and counts writes.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryVectorStore,
        upserts: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl CountingStore {
        fn writes(&self) -> usize {
            self.upserts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
        }
    }

    impl VectorStore for CountingStore {
        fn ensure_collection(
            &self,
            collection: &str,
            vector_size: u64,
        ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
            self.inner.ensure_collection(collection, vector_size)
        }

        fn collection_exists(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, std::result::Result<bool, VectorStoreError>> {
            self.inner.collection_exists(collection)
        }

        fn vector_size(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, std::result::Result<Option<u64>, VectorStoreError>> {
            self.inner.vector_size(collection)
        }

        fn delete_collection(
            &self,
            collection: &str,
        ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
            self.inner.delete_collection(collection)
        }

        fn upsert(
            &self,
            collection: &str,
            points: Vec<VectorPoint>,
        ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            self.inner.upsert(collection, points)
        }

        fn delete_by_filter(
            &self,
            collection: &str,
            filter: VectorFilter,
        ) -> BoxFuture<'_, std::result::Result<(), VectorStoreError>> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_by_filter(collection, filter)
        }

        fn scroll(
            &self,
            collection: &str,
            filter: Option<VectorFilter>,
        ) -> BoxFuture<'_, std::result::Result<Vec<StoredPoint>, VectorStoreError>> {
            self.inner.scroll(collection, filter)
        }

        fn search(
            &self,
            collection: &str,
            vector: Vec<f32>,
            limit: u64,
            filter: Option<VectorFilter>,
        ) -> BoxFuture<'_, std::result::Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
            self.inner.search(collection, vector, limit, filter)
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn indexer(
        store: Arc<dyn VectorStore>,
        provider: Arc<MockProvider>,
        root: &Path,
    ) -> CodeIndexer<MockProvider> {
        CodeIndexer::new(
            CodeStore::new(store),
            provider,
            vec![root.to_path_buf()],
            IndexerConfig::default(),
        )
        .unwrap()
    }

    async fn all_rows(indexer: &CodeIndexer<MockProvider>) -> Vec<crate::store::ChunkRow> {
        let table = indexer
            .store()
            .open(&indexer.projects()[0])
            .await
            .unwrap()
            .unwrap();
        table.query_where(&ChunkPredicate::default()).await.unwrap()
    }

    fn bump_mtime(path: &Path) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        file.set_modified(later).unwrap();
    }

    #[test]
    fn default_config_uses_default_excludes() {
        let config = IndexerConfig::default();
        assert_eq!(config.chunker.chunk_size, 1000);
        assert_eq!(config.chunker.overlap, 200);
        assert_eq!(config.exclude.len(), DEFAULT_EXCLUDE_GLOBS.len());
        assert!(config.respect_gitignore);
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let config = IndexerConfig {
            exclude: vec!["[".into()],
            ..IndexerConfig::default()
        };
        let result = CodeIndexer::new(
            CodeStore::in_memory(),
            Arc::new(MockProvider::default()),
            vec![],
            config,
        );
        assert!(matches!(result, Err(IndexError::Pattern(_))));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(FileOutcome::Indexed { chunks: 3 }).unwrap();
        assert_eq!(json["outcome"], "indexed");
        assert_eq!(json["chunks"], 3);
    }

    #[tokio::test]
    async fn long_file_produces_three_chunks_with_one_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let path = write(dir.path(), "src/big.js", &text);

        let provider = Arc::new(MockProvider::default());
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::clone(&provider),
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();

        assert_eq!(report.files_total, 1);
        assert_eq!(report.projects[0].files_indexed, 1);
        assert_eq!(report.projects[0].chunks_created, 3);
        // one probe for the table dimension plus one per chunk
        assert_eq!(provider.embed_calls(), 4);

        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 3);
        let key = path.to_string_lossy().into_owned();
        assert!(rows.iter().all(|r| r.file == key));
        let mtimes: BTreeSet<i64> = rows.iter().map(|r| r.mtime).collect();
        assert_eq!(mtimes.len(), 1);
        let ids: BTreeSet<String> = rows.iter().map(|r| r.id.clone()).collect();
        assert!(ids.contains(&format!("{key}-0")));
        assert!(ids.contains(&format!("{key}-2")));
    }

    #[tokio::test]
    async fn second_run_without_changes_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "export const a = 1;");
        write(dir.path(), "lib/b.py", "def b():\n    return 2\n");

        let store = Arc::new(CountingStore::default());
        let provider = Arc::new(MockProvider::default());
        let indexer = indexer(store.clone(), Arc::clone(&provider), dir.path());

        indexer.index_all().await.unwrap();
        let writes_after_first = store.writes();
        let embeds_after_first = provider.embed_calls();
        assert!(writes_after_first > 0);

        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].files_unchanged, 2);
        assert_eq!(report.projects[0].files_indexed, 0);
        assert_eq!(store.writes(), writes_after_first);
        assert_eq!(provider.embed_calls(), embeds_after_first);
    }

    #[tokio::test]
    async fn changed_file_replaces_rows() {
        let dir = tempfile::tempdir().unwrap();
        let long: String = "x".repeat(2500);
        let path = write(dir.path(), "a.js", &long);

        let provider = Arc::new(MockProvider::default());
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            provider,
            dir.path(),
        );
        indexer.index_all().await.unwrap();
        assert_eq!(all_rows(&indexer).await.len(), 3);
        let old_mtime = all_rows(&indexer).await[0].mtime;

        std::fs::write(&path, "short now").unwrap();
        bump_mtime(&path);
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].files_indexed, 1);

        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "short now");
        assert_ne!(rows[0].mtime, old_mtime);
    }

    #[tokio::test]
    async fn excluded_and_unsupported_files_are_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.ts", "let x = 1;");
        write(dir.path(), "node_modules/dep/index.js", "module.exports = {};");
        write(dir.path(), "tests/app.test.ts", "test('x', () => {});");
        write(dir.path(), "README.md", "# readme");

        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.files_total, 1);
        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].file.ends_with("app.ts"));
    }

    #[tokio::test]
    async fn gitignored_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "generated/out.js", "var g = 1;");
        write(dir.path(), "main.js", "var m = 1;");

        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.files_total, 1);
        assert!(report.projects[0].files[0].file.ends_with("main.js"));
    }

    #[tokio::test]
    async fn empty_file_is_reported_and_writes_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blank.py", "   \n\n  ");

        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].files[0].outcome, FileOutcome::Empty);
        assert!(all_rows(&indexer).await.is_empty());
    }

    #[tokio::test]
    async fn deleted_file_is_evicted_on_next_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "keep.ts", "const keep = 1;");
        let gone = write(dir.path(), "gone.ts", "const gone = 1;");

        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        indexer.index_all().await.unwrap();
        assert_eq!(all_rows(&indexer).await.len(), 2);

        std::fs::remove_file(&gone).unwrap();
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].chunks_removed, 1);
        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].file.ends_with("keep.ts"));
    }

    #[tokio::test]
    async fn embedding_failure_fails_file_not_run() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "const a = 1;");
        write(dir.path(), "b.ts", "const b = 2;");

        // The probe succeeds (four dimensions); chunk embeddings for "a" do not match.
        let provider = Arc::new(MockProvider::default().with_embed_fn(|text| {
            if text.contains("const a") {
                vec![1.0, 2.0]
            } else {
                vec![0.1, 0.2, 0.3, 0.4]
            }
        }));
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            provider,
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();
        let project = &report.projects[0];
        assert_eq!(project.files_failed, 1);
        assert_eq!(project.files_indexed, 1);
        assert!(matches!(
            project.files[0].outcome,
            FileOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn unreachable_embedding_service_fails_the_project_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "const a = 1;");

        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::failing_embed()),
            dir.path(),
        );
        let report = indexer.index_all().await.unwrap();
        assert!(report.projects[0].error.is_some());
        assert!(report.projects[0].files.is_empty());
        assert!(!indexer.is_bulk_running());
    }

    #[tokio::test]
    async fn concurrent_bulk_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "const a = 1;");
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );

        indexer.bulk_running.store(true, Ordering::SeqCst);
        assert!(matches!(
            indexer.index_all().await,
            Err(IndexError::BulkInProgress)
        ));
        indexer.bulk_running.store(false, Ordering::SeqCst);
        assert!(indexer.index_all().await.is_ok());
        assert!(!indexer.is_bulk_running());
    }

    #[tokio::test]
    async fn progress_events_count_up_to_total() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "const a = 1;");
        write(dir.path(), "b.ts", "const b = 1;");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        )
        .with_events(tx);
        indexer.index_all().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events[0], IndexEvent::Started { total: 2 });
        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                IndexEvent::Progress { processed, .. } => Some(*processed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2]);
        assert!(matches!(
            events.last(),
            Some(IndexEvent::ProjectDone { indexed: 2, .. })
        ));
    }

    #[tokio::test]
    async fn reindex_file_leaves_only_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.ts", &"y".repeat(1500));
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        indexer.index_all().await.unwrap();
        assert_eq!(all_rows(&indexer).await.len(), 2);

        std::fs::write(&path, "const y = 2;").unwrap();
        bump_mtime(&path);
        let outcome = indexer.reindex_file(&path).await.unwrap();
        assert_eq!(outcome, FileOutcome::Indexed { chunks: 1 });

        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "const y = 2;");
    }

    #[tokio::test]
    async fn reindex_removed_file_deletes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.ts", "const a = 1;");
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        indexer.index_all().await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(indexer.reindex_file(&path).await.unwrap(), FileOutcome::Removed);
        assert!(all_rows(&indexer).await.is_empty());
    }

    #[tokio::test]
    async fn reindex_skips_unsupported_and_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let md = write(dir.path(), "notes.md", "# notes");
        let dep = write(dir.path(), "node_modules/x/index.js", "var x;");
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        assert_eq!(indexer.reindex_file(&md).await.unwrap(), FileOutcome::Skipped);
        assert_eq!(indexer.reindex_file(&dep).await.unwrap(), FileOutcome::Skipped);
    }

    #[tokio::test]
    async fn reindex_outside_roots_is_no_project() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let path = write(other.path(), "a.ts", "const a = 1;");
        let indexer = indexer(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockProvider::default()),
            dir.path(),
        );
        assert!(matches!(
            indexer.reindex_file(&path).await,
            Err(IndexError::NoProject(_))
        ));
    }

    #[tokio::test]
    async fn nested_roots_index_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("pkg");
        write(dir.path(), "top.ts", "const top = 1;");
        write(&inner, "inner.ts", "const inner = 1;");

        let indexer = CodeIndexer::new(
            CodeStore::in_memory(),
            Arc::new(MockProvider::default()),
            vec![dir.path().to_path_buf(), inner.clone()],
            IndexerConfig::default(),
        )
        .unwrap();
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.files_total, 2);
        assert_eq!(report.projects[0].files.len(), 1);
        assert_eq!(report.projects[1].files.len(), 1);
        assert!(report.projects[1].files[0].file.ends_with("inner.ts"));
    }

    #[tokio::test]
    async fn same_basename_roots_keep_each_others_rows() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a").join("app");
        let second = dir.path().join("b").join("app");
        write(&first, "x.ts", "const x = 1;");
        write(&second, "y.ts", "const y = 2;");

        let store = Arc::new(CountingStore::default());
        let provider = Arc::new(MockProvider::default());
        let indexer = CodeIndexer::new(
            CodeStore::new(store.clone()),
            provider.clone(),
            vec![first, second],
            IndexerConfig::default(),
        )
        .unwrap();
        assert_eq!(indexer.projects()[0].id(), indexer.projects()[1].id());

        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].chunks_removed, 0);
        assert_eq!(report.projects[1].chunks_removed, 0);
        let rows = all_rows(&indexer).await;
        assert_eq!(rows.len(), 2);

        let writes = store.writes();
        let embeds = provider.embed_calls();
        let report = indexer.index_all().await.unwrap();
        assert_eq!(report.projects[0].files_unchanged, 1);
        assert_eq!(report.projects[1].files_unchanged, 1);
        assert_eq!(store.writes(), writes);
        assert_eq!(provider.embed_calls(), embeds);
        assert_eq!(all_rows(&indexer).await.len(), 2);
    }
}

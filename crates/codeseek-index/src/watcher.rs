//! Debounced file watching that feeds single-file reindexing.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use codeseek_llm::LlmProvider;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::indexer::CodeIndexer;
use crate::languages::is_supported;

const DEBOUNCE: Duration = Duration::from_secs(1);

pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// Watch every project root of `indexer` recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be initialized or a
    /// root cannot be watched.
    pub fn start<P: LlmProvider + 'static>(indexer: Arc<CodeIndexer<P>>) -> Result<Self> {
        let (notify_tx, mut notify_rx) = mpsc::channel::<PathBuf>(64);

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |events: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let paths: HashSet<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any && is_supported(&e.path))
                    .map(|e| e.path)
                    .collect();

                for path in paths {
                    let _ = notify_tx.blocking_send(path);
                }
            },
        )?;

        for project in indexer.projects() {
            debouncer
                .watcher()
                .watch(project.root(), notify::RecursiveMode::Recursive)?;
            tracing::info!(project = project.id(), root = %project.root().display(), "watching");
        }

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(path) = notify_rx.recv().await {
                if let Err(e) = indexer.reindex_file(&path).await {
                    tracing::warn!(file = %path.display(), "reindex failed: {e}");
                }
            }
        });

        Ok(Self { handle })
    }

    /// Stop watching and drop pending notifications.
    pub fn stop(self) {
        self.handle.abort();
    }
}

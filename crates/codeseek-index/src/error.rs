//! Error types for codeseek-index.

use std::path::PathBuf;

/// Errors that can occur during indexing and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Embedding service unreachable or returned a malformed vector.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// Vector store connect/open/insert/delete/query failure.
    #[error("index store error: {0}")]
    Store(#[from] codeseek_store::VectorStoreError),

    /// Reading or stat-ing a source file failed.
    #[error("cannot access {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bulk run was requested while another one is active.
    #[error("bulk indexing already in progress")]
    BulkInProgress,

    /// The path is not under any known project root.
    #[error("no project root contains {}", .0.display())]
    NoProject(PathBuf),

    /// Invalid exclusion glob.
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// File watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

impl From<codeseek_llm::LlmError> for IndexError {
    fn from(err: codeseek_llm::LlmError) -> Self {
        Self::Embedding(err.to_string())
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;

//! Incremental chunked-embedding index over project source trees.
//!
//! Files are split into overlapping character windows, embedded through an
//! [`LlmProvider`](codeseek_llm::LlmProvider), and stored in one vector table per
//! project. Each row carries the source file's modification time so unchanged
//! files are skipped on the next bulk run and changed files are replaced as a batch.

pub mod chunker;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod project;
pub mod store;
pub mod watcher;

pub use error::{IndexError, Result};

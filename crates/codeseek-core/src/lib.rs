//! Configuration and the completion pipeline for codeseek.

pub mod completion;
pub mod config;

pub use completion::{Completion, CompletionService, DocumentSnapshot};
pub use config::Config;

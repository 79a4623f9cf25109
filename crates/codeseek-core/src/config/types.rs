use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "qwen2.5-coder:latest".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Qdrant,
    /// Process-local, lost on exit.
    Memory,
}

impl StoreBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            qdrant_url: default_qdrant_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Project roots. Empty means the current directory.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default = "default_true")]
    pub watch: bool,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_exclude() -> Vec<String> {
    codeseek_index::languages::DEFAULT_EXCLUDE_GLOBS
        .iter()
        .map(|g| (*g).to_owned())
        .collect()
}

fn default_true() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            exclude: default_exclude(),
            respect_gitignore: true,
            watch: true,
        }
    }
}

/// How the completion prompt is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionMode {
    /// Text before the cursor plus the nearest indexed chunks.
    #[default]
    Retrieval,
    /// Text around the cursor with a cursor marker, no retrieval.
    LocalContext,
}

/// What a request gets while another generation is running in the same session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusyPolicy {
    #[default]
    Empty,
    LastResult,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: CompletionMode,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_before_lines")]
    pub before_lines: usize,
    #[serde(default = "default_after_lines")]
    pub after_lines: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_context_length")]
    pub context_length: u64,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_before_lines() -> usize {
    30
}

fn default_after_lines() -> usize {
    5
}

fn default_top_k() -> usize {
    3
}

fn default_temperature() -> f32 {
    0.2
}

fn default_context_length() -> u64 {
    4096
}

fn default_sentinel() -> String {
    "[NO_COMPLETION]".into()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: CompletionMode::default(),
            debounce_ms: default_debounce_ms(),
            before_lines: default_before_lines(),
            after_lines: default_after_lines(),
            top_k: default_top_k(),
            temperature: default_temperature(),
            context_length: default_context_length(),
            sentinel: default_sentinel(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

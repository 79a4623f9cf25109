use std::path::PathBuf;
use std::str::FromStr;

use super::Config;

/// Parse `key` if set. Unparseable values are ignored with a warning.
fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {raw}");
            None
        }
    }
}

/// Parse a kebab-case enum through its serde representation.
fn parsed_enum<T: serde::de::DeserializeOwned>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if let Ok(v) = serde_json::from_value(serde_json::Value::String(raw.trim().to_owned())) {
        Some(v)
    } else {
        tracing::warn!("ignoring invalid {key} value: {raw}");
        None
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CODESEEK_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Some(backend) = parsed_enum("CODESEEK_STORE_BACKEND") {
            self.store.backend = backend;
        }
        if let Ok(v) = std::env::var("CODESEEK_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("CODESEEK_INDEX_ROOTS") {
            self.index.roots = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(size) = parsed("CODESEEK_INDEX_CHUNK_SIZE") {
            self.index.chunk_size = size;
        }
        if let Some(overlap) = parsed("CODESEEK_INDEX_CHUNK_OVERLAP") {
            self.index.chunk_overlap = overlap;
        }
        if let Some(watch) = parsed("CODESEEK_INDEX_WATCH") {
            self.index.watch = watch;
        }
        if let Some(enabled) = parsed("CODESEEK_COMPLETION_ENABLED") {
            self.completion.enabled = enabled;
        }
        if let Some(mode) = parsed_enum("CODESEEK_COMPLETION_MODE") {
            self.completion.mode = mode;
        }
        if let Some(ms) = parsed("CODESEEK_COMPLETION_DEBOUNCE_MS") {
            self.completion.debounce_ms = ms;
        }
        if let Some(k) = parsed("CODESEEK_COMPLETION_TOP_K") {
            self.completion.top_k = k;
        }
    }
}

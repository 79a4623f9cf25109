mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::Context;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Configured roots, or `fallback` when none are set.
    #[must_use]
    pub fn roots_or(&self, fallback: &Path) -> Vec<PathBuf> {
        if self.index.roots.is_empty() {
            vec![fallback.to_path_buf()]
        } else {
            self.index.roots.clone()
        }
    }

    #[must_use]
    pub fn indexer_config(&self) -> codeseek_index::indexer::IndexerConfig {
        codeseek_index::indexer::IndexerConfig {
            chunker: codeseek_index::chunker::ChunkerConfig {
                chunk_size: self.index.chunk_size,
                overlap: self.index.chunk_overlap,
            },
            exclude: self.index.exclude.clone(),
            respect_gitignore: self.index.respect_gitignore,
        }
    }
}

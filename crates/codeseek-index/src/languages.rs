//! Supported-language registry and path eligibility.

use std::path::Path;

use glob::{MatchOptions, Pattern};

/// A language the indexer and completion provider accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    pub aliases: &'static [&'static str],
}

pub const LANGUAGES: &[Language] = &[
    Language {
        id: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        aliases: &["JavaScript", "javascript"],
    },
    Language {
        id: "typescript",
        extensions: &["ts", "tsx"],
        aliases: &["TypeScript", "typescript"],
    },
    Language {
        id: "python",
        extensions: &["py"],
        aliases: &["Python", "python"],
    },
    Language {
        id: "php",
        extensions: &["php"],
        aliases: &["PHP", "php"],
    },
    Language {
        id: "vue",
        extensions: &["vue"],
        aliases: &["Vue", "vue"],
    },
];

/// Dependency, version-control, build-output and test directories.
pub const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/coverage/**",
    "**/out/**",
    "**/test/**",
    "**/tests/**",
    "**/__tests__/**",
];

/// Detect language from file extension.
#[must_use]
pub fn detect_language(path: &Path) -> Option<&'static Language> {
    let ext = path.extension()?.to_str()?;
    LANGUAGES.iter().find(|lang| lang.extensions.contains(&ext))
}

#[must_use]
pub fn is_supported(path: &Path) -> bool {
    detect_language(path).is_some()
}

/// All extensions in registry order, without duplicates.
#[must_use]
pub fn supported_extensions() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for ext in LANGUAGES.iter().flat_map(|l| l.extensions.iter().copied()) {
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

#[must_use]
pub fn language_ids() -> Vec<&'static str> {
    LANGUAGES.iter().map(|l| l.id).collect()
}

/// Compiled exclusion globs, matched against root-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    patterns: Vec<Pattern>,
}

impl PathFilter {
    /// # Errors
    ///
    /// Returns an error if any pattern is not a valid glob.
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self, glob::PatternError> {
        let patterns = globs
            .iter()
            .map(|g| Pattern::new(g.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            patterns: DEFAULT_EXCLUDE_GLOBS
                .iter()
                .filter_map(|g| Pattern::new(g).ok())
                .collect(),
        }
    }

    /// `rel_path` must be relative to the project root.
    #[must_use]
    pub fn is_excluded(&self, rel_path: &Path) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(rel_path, options))
    }

    /// Supported extension and not excluded under `root`.
    #[must_use]
    pub fn is_eligible(&self, root: &Path, path: &Path) -> bool {
        if !is_supported(path) {
            return false;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        !self.is_excluded(rel)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

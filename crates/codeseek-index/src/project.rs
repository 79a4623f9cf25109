//! Project identity: one vector table per workspace root.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Project {
    id: String,
    root: PathBuf,
}

impl Project {
    #[must_use]
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: sanitize_project_name(&name),
            root,
        }
    }

    /// Index-safe identifier, embedded in the table name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn sanitize_project_name(name: &str) -> String {
    if name.is_empty() {
        return "_".into();
    }
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// The project whose root is the longest prefix of `path`.
#[must_use]
pub fn resolve_project<'a>(projects: &'a [Project], path: &Path) -> Option<&'a Project> {
    projects
        .iter()
        .filter(|p| p.contains(path))
        .max_by_key(|p| p.root.components().count())
}

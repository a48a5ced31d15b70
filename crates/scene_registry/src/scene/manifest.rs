//! Build manifest
//!
//! The fixed, ordered list of scenes shipped with a build. A scene's build index
//! is its position among the *enabled* entries. The manifest is read-only at
//! runtime; editing it belongs to offline build tooling.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of the build list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    /// Scene path
    pub path: String,
    /// Disabled entries are kept in the list but get no build index
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BuildEntry {
    /// Create an enabled entry
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
        }
    }

    /// Create a disabled entry
    pub fn disabled(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            enabled: false,
        }
    }
}

/// Ordered build list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Entries in build order
    #[serde(default)]
    pub scenes: Vec<BuildEntry>,
}

/// Build manifest validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// An entry with an empty path
    #[error("Build entry {0} has an empty path")]
    EmptyPath(usize),

    /// The same path listed twice
    #[error("Scene '{0}' appears more than once in the build list")]
    DuplicatePath(String),
}

impl BuildManifest {
    /// Create a manifest with every path enabled, in order
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scenes: paths.into_iter().map(BuildEntry::new).collect(),
        }
    }

    /// Check that paths are non-empty and unique
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for (position, entry) in self.scenes.iter().enumerate() {
            if entry.path.is_empty() {
                return Err(ManifestError::EmptyPath(position));
            }
            if !seen.insert(entry.path.as_str()) {
                return Err(ManifestError::DuplicatePath(entry.path.clone()));
            }
        }
        Ok(())
    }

    /// Number of scenes with a build index
    pub fn len(&self) -> usize {
        self.enabled().count()
    }

    /// True when no scene has a build index
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build index of a path, if it is an enabled entry
    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.enabled().position(|entry| entry.path == path)
    }

    /// Path at a build index
    pub fn path_at(&self, index: usize) -> Option<&str> {
        self.enabled().nth(index).map(|entry| entry.path.as_str())
    }

    /// Enabled entries in build-index order
    pub fn enabled(&self) -> impl Iterator<Item = &BuildEntry> {
        self.scenes.iter().filter(|entry| entry.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_skip_disabled_entries() {
        let manifest = BuildManifest {
            scenes: vec![
                BuildEntry::new("scenes/Boot.scene"),
                BuildEntry::disabled("scenes/Debug.scene"),
                BuildEntry::new("scenes/Menu.scene"),
            ],
        };

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.index_of("scenes/Boot.scene"), Some(0));
        assert_eq!(manifest.index_of("scenes/Debug.scene"), None);
        assert_eq!(manifest.index_of("scenes/Menu.scene"), Some(1));
        assert_eq!(manifest.path_at(1), Some("scenes/Menu.scene"));
        assert_eq!(manifest.path_at(2), None);
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let manifest = BuildManifest::from_paths(["a.scene", "b.scene", "a.scene"]);
        assert_eq!(
            manifest.validate(),
            Err(ManifestError::DuplicatePath("a.scene".to_string()))
        );
    }

    #[test]
    fn test_empty_path_rejected() {
        let manifest = BuildManifest::from_paths(["a.scene", ""]);
        assert_eq!(manifest.validate(), Err(ManifestError::EmptyPath(1)));
    }

    #[test]
    fn test_enabled_defaults_to_true_when_parsed() {
        let manifest: BuildManifest = toml::from_str(
            r#"
            [[scenes]]
            path = "scenes/Boot.scene"

            [[scenes]]
            path = "scenes/Debug.scene"
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 1);
        assert!(manifest.validate().is_ok());
    }
}

//! # Registry Configuration
//!
//! Everything a [`SceneRegistry`](crate::scene::SceneRegistry) needs at
//! construction: naming policy for created scenes, the build list, and limits
//! for handler-queued commands.
//!
//! ```toml
//! duplicate_names = "reject"
//! scene_directory = "scenes"
//! scene_extension = "scene"
//! max_deferred_depth = 8
//! log_level = "info"
//!
//! [[build.scenes]]
//! path = "scenes/Boot.scene"
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::scene::BuildManifest;

/// What `create` does when the requested name is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNamePolicy {
    /// Fail with `DuplicateName`
    #[default]
    Reject,
    /// Append ` (n)` until the name is free
    Rename,
}

/// # Registry Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name collision policy for created scenes
    pub duplicate_names: DuplicateNamePolicy,
    /// Directory for created scenes without an explicit one
    pub scene_directory: String,
    /// File extension of created scene paths (without the dot)
    pub scene_extension: String,
    /// Maximum generations of handler-queued commands per operation
    pub max_deferred_depth: usize,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Build list
    pub build: BuildManifest,
}

impl RegistryConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            duplicate_names: DuplicateNamePolicy::Reject,
            scene_directory: "scenes".to_string(),
            scene_extension: "scene".to_string(),
            max_deferred_depth: 8,
            log_level: "info".to_string(),
            build: BuildManifest::default(),
        }
    }

    /// Set the duplicate name policy
    pub fn with_duplicate_names(mut self, policy: DuplicateNamePolicy) -> Self {
        self.duplicate_names = policy;
        self
    }

    /// Set the directory for created scenes
    pub fn with_scene_directory(mut self, directory: impl Into<String>) -> Self {
        self.scene_directory = directory.into();
        self
    }

    /// Set the build list
    pub fn with_build(mut self, build: BuildManifest) -> Self {
        self.build = build;
        self
    }

    /// Set the deferred command generation limit
    pub fn with_max_deferred_depth(mut self, depth: usize) -> Self {
        self.max_deferred_depth = depth;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scene_extension.is_empty() || self.scene_extension.contains(['.', '/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "scene extension '{}' must be a bare extension",
                self.scene_extension
            )));
        }

        if self.max_deferred_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_deferred_depth must be at least 1".to_string(),
            ));
        }

        self.build
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for RegistryConfig {}

//! Scene registry errors

use thiserror::Error;

use super::record::SceneIdentity;

/// Errors reported synchronously by registry operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Identity does not resolve to a known scene
    #[error("No scene with {0}")]
    NotFound(SceneIdentity),

    /// Unload or merge target is not loaded
    #[error("Scene '{0}' is not loaded")]
    NotLoaded(String),

    /// A load or unload for the same scene is still pending
    #[error("An operation on scene '{0}' is already in progress")]
    AlreadyInProgress(String),

    /// Another Single load is still swapping the loaded set; carries its target
    #[error("A Single load of scene '{0}' is still in progress")]
    SwapInProgress(String),

    /// Load target is already in the loaded set
    #[error("Scene '{0}' is already loaded")]
    AlreadyLoaded(String),

    /// Create-time name collision under the reject policy
    #[error("A scene named '{0}' already exists")]
    DuplicateName(String),

    /// Name unusable as a scene file name
    #[error("Invalid scene name '{0}'")]
    InvalidName(String),

    /// Merge of a scene into itself
    #[error("Cannot merge scene '{0}' into itself")]
    InvalidMerge(String),

    /// Handler-queued mutations kept re-triggering each other
    #[error("Deferred scene commands exceeded {depth} generations")]
    Reentrancy {
        /// Configured generation limit
        depth: usize,
    },
}

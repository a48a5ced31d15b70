//! Scene loader backends
//!
//! The registry never touches scene content. Loading and unloading are handed
//! to a [`SceneLoader`], which may be slow or fail; the registry only waits on
//! the futures it returns.

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

use super::record::SceneRecord;

/// Future returned by [`SceneLoader::begin_load`]
pub type LoadFuture = BoxFuture<'static, Result<(), LoaderError>>;

/// Future returned by [`SceneLoader::begin_unload`]
pub type UnloadFuture = BoxFuture<'static, Result<(), LoaderError>>;

/// Errors reported by a loader backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Scene content could not be found by the backend
    #[error("Scene content missing: {0}")]
    Missing(String),

    /// Backend failed while processing the scene
    #[error("Scene loader failed: {0}")]
    Failed(String),

    /// Backend dropped the request before answering
    #[error("Scene loader abandoned the request")]
    Abandoned,
}

/// Loader backend trait for host abstraction
///
/// Both calls start work and return immediately; the registry polls the
/// returned future from [`SceneRegistry::update`](crate::scene::SceneRegistry::update)
/// or blocks on it for synchronous operations.
pub trait SceneLoader {
    /// Start loading the content of a scene
    fn begin_load(&mut self, scene: &SceneRecord) -> LoadFuture;

    /// Start unloading the content of a scene
    fn begin_unload(&mut self, scene: &SceneRecord) -> UnloadFuture;
}

/// Loader that completes every request at once
///
/// Used for headless registries and tests where there is no content to move.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateLoader;

impl SceneLoader for ImmediateLoader {
    fn begin_load(&mut self, _scene: &SceneRecord) -> LoadFuture {
        future::ready(Ok(())).boxed()
    }

    fn begin_unload(&mut self, _scene: &SceneRecord) -> UnloadFuture {
        future::ready(Ok(())).boxed()
    }
}

//! # Scene Registry
//!
//! Scene identity and load-state bookkeeping for a game host.
//!
//! ## Features
//!
//! - **Stable identities**: resolve scenes by path, name or build index
//! - **Load modes**: Single (swap the loaded set) and Additive
//! - **Async operations**: pending loads driven from the frame loop
//! - **Notifications**: load, unload and active-scene events with
//!   handler-queued follow-up commands
//! - **Pluggable loaders**: the host moves content, the registry keeps books
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_registry::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new()
//!         .with_build(BuildManifest::from_paths(["scenes/Menu.scene", "scenes/Level1.scene"]));
//!     let mut registry = SceneRegistry::headless(config)?;
//!
//!     registry.subscribe(EventMask::LOADED, |event: &SceneEvent, _: &mut SceneCommands| {
//!         if let SceneEvent::Loaded(scene) = event {
//!             println!("loaded {scene}");
//!         }
//!     });
//!
//!     registry.load(0usize, LoadMode::Single, false)?;
//!     let level = registry.load(SceneIdentity::name("Level1"), LoadMode::Additive, true)?;
//!     while !level.is_done() {
//!         registry.update();
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod config;
pub mod core;
pub mod events;
pub mod foundation;
pub mod scene;

pub use crate::core::{DuplicateNamePolicy, RegistryConfig};
pub use scene::{SceneError, SceneRegistry};

/// Common imports for registry users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        core::{DuplicateNamePolicy, RegistryConfig},
        events::{EventMask, SceneCommand, SceneCommands, SceneEvent, SceneEventHandler, SubscriptionId},
        scene::{
            BuildEntry, BuildManifest, CreateParams, ImmediateLoader, LoadFuture, LoadMode, LoaderError,
            OperationHandle, OperationKind, OperationStatus, SceneError, SceneIdentity, SceneLoader,
            SceneRecord, SceneRegistry, UnloadFuture,
        },
    };
}

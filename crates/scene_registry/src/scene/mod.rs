//! Scene registry
//!
//! Tracks every scene the host knows about: its identity, whether it is
//! loaded, and which loaded scene is active. Content work goes through a
//! [`SceneLoader`]; the registry only commits the outcome.
//!
//! ## Architecture
//!
//! ```text
//! Caller (gameplay / tools)
//!      ↓  identities, handles
//! Scene Registry (records, loaded set, active scene)
//!      ↓  begin_load / begin_unload futures
//! Scene Loader (host content)
//! ```
//!
//! Records are snapshots. Every load/unload cycle gives a scene a new
//! incarnation, so a record taken before an unload stays invalid forever;
//! call [`SceneRegistry::refresh`] to get the current one.

mod error;
mod loader;
mod manifest;
mod operation;
mod record;
mod registry;


pub use error::SceneError;
pub use loader::{ImmediateLoader, LoadFuture, LoaderError, SceneLoader, UnloadFuture};
pub use manifest::{BuildEntry, BuildManifest, ManifestError};
pub use operation::{LoadMode, OperationHandle, OperationKind, OperationStatus};
pub use record::{scene_name_from_path, SceneIdentity, SceneRecord};
pub use registry::{CreateParams, SceneRegistry};

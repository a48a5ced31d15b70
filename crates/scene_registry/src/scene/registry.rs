//! Scene Registry - single source of truth for scene identity and load state
//!
//! The registry:
//! 1. Maps caller identities (path / name / build index) to scene incarnations
//! 2. Tracks the loaded set (in load order) and the active scene
//! 3. Hands content work to a [`SceneLoader`] and commits the result
//! 4. Notifies subscribers of loads, unloads and active-scene changes
//!
//! ## Operation flow
//!
//! ```text
//! load/unload ──► pending operation ──► update() polls loader future
//!                                         │
//!                   Single mode: evict ◄──┤
//!                                         ▼
//!                              commit (one step) ──► events ──► deferred commands
//! ```
//!
//! State only changes at commit. A loader failure or a cancel request before
//! commit leaves the registry exactly as it was.

use std::collections::HashMap;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};

use crate::config::ConfigError;
use crate::core::config::{DuplicateNamePolicy, RegistryConfig};
use crate::events::{
    EventBus, EventMask, SceneCommand, SceneCommands, SceneEvent, SceneEventHandler, SubscriptionId,
};
use crate::foundation::collections::{HandleMap, SceneKey};

use super::error::SceneError;
use super::loader::{ImmediateLoader, LoadFuture, LoaderError, SceneLoader, UnloadFuture};
use super::operation::{LoadMode, OperationHandle, OperationKind, OperationStatus};
use super::record::{scene_name_from_path, SceneIdentity, SceneRecord};

/// Parameters for [`SceneRegistry::create`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateParams {
    /// Directory of the new scene path; the configured directory when `None`
    pub directory: Option<String>,
}

impl CreateParams {
    /// Place the new scene in `directory`
    pub fn in_directory(directory: impl Into<String>) -> Self {
        Self {
            directory: Some(directory.into()),
        }
    }
}

/// Canonical state of one scene incarnation
#[derive(Debug, Clone)]
struct SceneState {
    path: String,
    build_index: Option<usize>,
    loaded: bool,
    /// Registration order, kept across re-incarnations of build-list scenes
    registered: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OperationId(u64);

enum Phase {
    /// Waiting on `begin_load` / `begin_unload`
    Loading(LoadFuture),
    /// Loader finished; waiting to commit
    Ready,
    /// Single mode: target is in, the rest of the loaded set is going out
    Evicting {
        evicted: Vec<SceneKey>,
        remaining: Vec<UnloadFuture>,
        failure: Option<LoaderError>,
    },
}

struct PendingOperation {
    id: OperationId,
    key: SceneKey,
    path: String,
    kind: OperationKind,
    phase: Phase,
    handle: OperationHandle,
    /// Pending unloads folded into a Single-mode eviction
    absorbed: Vec<AbsorbedUnload>,
}

/// A caller's pending unload taken over by a Single-mode eviction
///
/// Its loader future is dropped. If the swap commits, the handle completes
/// with it; otherwise the unload is started again on its own.
struct AbsorbedUnload {
    key: SceneKey,
    path: String,
    handle: OperationHandle,
}

enum Progress {
    Finished(Result<(), LoaderError>),
    Commit,
    Evicted(Vec<SceneKey>, Option<LoaderError>),
}

/// Scene Registry - owns every scene record and the loaded set
///
/// All mutations take `&mut self`, so structural changes never interleave.
/// Share it between threads behind a `Mutex` if needed.
pub struct SceneRegistry {
    config: RegistryConfig,
    loader: Box<dyn SceneLoader + Send>,

    scenes: HandleMap<SceneState>,
    by_path: HashMap<String, SceneKey>,
    next_registration: u64,

    /// Loaded scenes in load order
    loaded: Vec<SceneKey>,
    active: Option<SceneKey>,

    pending: Vec<PendingOperation>,
    next_operation: u64,

    events: EventBus,
    commands: SceneCommands,
    deferred_errors: Vec<SceneError>,
}

impl SceneRegistry {
    /// Create a registry with the given loader backend
    ///
    /// Every enabled build-list entry is registered (unloaded) so it can be
    /// resolved and loaded by index straight away.
    pub fn new<L>(config: RegistryConfig, loader: L) -> Result<Self, ConfigError>
    where
        L: SceneLoader + Send + 'static,
    {
        config.validate()?;

        let mut registry = Self {
            config,
            loader: Box::new(loader),
            scenes: HandleMap::with_key(),
            by_path: HashMap::new(),
            next_registration: 0,
            loaded: Vec::new(),
            active: None,
            pending: Vec::new(),
            next_operation: 1,
            events: EventBus::new(),
            commands: SceneCommands::new(),
            deferred_errors: Vec::new(),
        };

        let build_scenes: Vec<(usize, String)> = registry
            .config
            .build
            .enabled()
            .enumerate()
            .map(|(index, entry)| (index, entry.path.clone()))
            .collect();
        for (index, path) in build_scenes {
            registry.register(path, Some(index), None);
        }

        log::info!(
            "Scene registry ready: {} build scene(s)",
            registry.config.build.len()
        );
        Ok(registry)
    }

    /// Create a registry whose loader completes everything immediately
    pub fn headless(config: RegistryConfig) -> Result<Self, ConfigError> {
        Self::new(config, ImmediateLoader)
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current record for an identity
    pub fn resolve(&self, scene: impl Into<SceneIdentity>) -> Option<SceneRecord> {
        self.resolve_key(&scene.into()).and_then(|key| self.record_of(key))
    }

    /// Snapshot of the loaded set in load order
    pub fn list_loaded(&self) -> Vec<SceneRecord> {
        self.loaded.iter().filter_map(|key| self.record_of(*key)).collect()
    }

    /// The active scene
    pub fn active_scene(&self) -> Option<SceneRecord> {
        self.active.and_then(|key| self.record_of(key))
    }

    /// The `index`-th loaded scene
    pub fn scene_at(&self, index: usize) -> Option<SceneRecord> {
        self.loaded.get(index).and_then(|key| self.record_of(*key))
    }

    /// Number of loaded scenes
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Number of scenes the registry knows about, loaded or not
    ///
    /// Use [`loaded_count`](Self::loaded_count) for the scenes in the hierarchy.
    pub fn known_scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Number of scenes with a build index
    pub fn build_scene_count(&self) -> usize {
        self.config.build.len()
    }

    /// Whether the scene an identity resolves to is loaded
    pub fn is_loaded(&self, scene: impl Into<SceneIdentity>) -> bool {
        self.resolve_key(&scene.into())
            .and_then(|key| self.scenes.get(key))
            .is_some_and(|state| state.loaded)
    }

    /// Whether a record still names a live incarnation
    pub fn is_valid(&self, record: &SceneRecord) -> bool {
        self.scenes.contains_key(record.key())
    }

    /// Current record for the path of a possibly stale record
    pub fn refresh(&self, record: &SceneRecord) -> Option<SceneRecord> {
        self.resolve(record)
    }

    /// Whether a scene with the record's path is in the loaded set
    ///
    /// Unlike [`SceneRecord::is_loaded`], this reflects unloads that happened
    /// after the record was taken.
    pub fn is_loaded_in_hierarchy(&self, record: &SceneRecord) -> bool {
        self.loaded
            .iter()
            .filter_map(|key| self.scenes.get(*key))
            .any(|state| state.path == record.path())
    }

    /// Whether a load or unload is pending for the scene
    pub fn is_pending(&self, scene: impl Into<SceneIdentity>) -> bool {
        self.resolve_key(&scene.into())
            .and_then(|key| self.scenes.get(key))
            .is_some_and(|state| self.is_busy(&state.path))
    }

    /// Number of pending operations
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Take the errors of handler-queued commands
    pub fn drain_deferred_errors(&mut self) -> Vec<SceneError> {
        std::mem::take(&mut self.deferred_errors)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a handler for the event kinds in `mask`
    pub fn subscribe<H>(&mut self, mask: EventMask, handler: H) -> SubscriptionId
    where
        H: SceneEventHandler + 'static,
    {
        self.events.subscribe(mask, Box::new(handler))
    }

    /// Remove a handler
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Register a new, empty, unloaded scene
    ///
    /// The path is `<directory>/<name>.<extension>`.
    pub fn create(&mut self, name: &str, params: CreateParams) -> Result<SceneRecord, SceneError> {
        let record = self.create_scene(name, &params)?;
        self.flush_deferred();
        Ok(record)
    }

    /// Load a scene
    ///
    /// With `asynchronous` the operation stays pending until [`update`](Self::update)
    /// sees the loader finish; otherwise this blocks on the loader and commits
    /// before returning.
    ///
    /// A Single load of a scene that is already loaded keeps it without a
    /// reload and evicts everything else. An Additive load of a loaded scene
    /// fails with [`SceneError::AlreadyLoaded`]. Only one Single load can be
    /// pending at a time; another one fails with [`SceneError::SwapInProgress`].
    pub fn load(
        &mut self,
        scene: impl Into<SceneIdentity>,
        mode: LoadMode,
        asynchronous: bool,
    ) -> Result<OperationHandle, SceneError> {
        let handle = self.start_load(scene.into(), mode, asynchronous)?;
        self.flush_deferred();
        Ok(handle)
    }

    /// Unload a scene
    pub fn unload(
        &mut self,
        scene: impl Into<SceneIdentity>,
        asynchronous: bool,
    ) -> Result<OperationHandle, SceneError> {
        let handle = self.start_unload(scene.into(), asynchronous)?;
        self.flush_deferred();
        Ok(handle)
    }

    /// Make a loaded scene the active one
    ///
    /// Returns false, changing nothing, if the record is stale or its scene is
    /// not loaded.
    pub fn set_active(&mut self, record: &SceneRecord) -> bool {
        let changed = self.activate(record.key());
        self.flush_deferred();
        changed
    }

    /// Resolve an identity, then [`set_active`](Self::set_active)
    pub fn set_active_by(&mut self, scene: impl Into<SceneIdentity>) -> bool {
        match self.resolve(scene) {
            Some(record) => self.set_active(&record),
            None => false,
        }
    }

    /// Fold `source` into `destination`
    ///
    /// Source leaves the loaded set and its incarnation is invalidated without a
    /// loader call; if it was active, destination takes over.
    pub fn merge_scenes(
        &mut self,
        source: impl Into<SceneIdentity>,
        destination: impl Into<SceneIdentity>,
    ) -> Result<(), SceneError> {
        let source = self.loaded_target(source.into())?;
        let destination = self.loaded_target(destination.into())?;
        if source == destination {
            let path = self.scenes[source].path.clone();
            return Err(SceneError::InvalidMerge(path));
        }

        let previous = self.active_scene();
        if let Some(record) = self.retire(source) {
            log::debug!("Merged scene '{}' into '{}'", record.path(), self.scenes[destination].path);
            self.events.send(SceneEvent::Unloaded(record));
        }
        if previous.as_ref().is_some_and(|active| active.key() == source) {
            self.active = Some(destination);
            self.send_active_changed(previous);
        }

        self.dispatch();
        self.flush_deferred();
        Ok(())
    }

    /// Drive pending operations
    ///
    /// Call once per frame. Polls every pending loader future without
    /// blocking, commits what finished (in start order), then runs commands
    /// queued by event handlers. Returns the number of operations that ended.
    pub fn update(&mut self) -> usize {
        let ids: Vec<OperationId> = self.pending.iter().map(|op| op.id).collect();
        let mut finished = 0;
        for id in ids {
            if self.position(id).is_some() && self.step(id, false) {
                finished += 1;
            }
        }
        self.flush_deferred();
        finished
    }

    // ========================================================================
    // Host event mirroring
    // ========================================================================

    /// Record a load the host performed itself
    ///
    /// Unknown paths are registered on first observation. Single mode evicts
    /// every other loaded scene, like a Single load would, but without loader
    /// calls. Observing a scene that is already loaded changes nothing.
    pub fn observe_loaded(&mut self, path: &str, mode: LoadMode) -> Result<SceneRecord, SceneError> {
        if path.is_empty() {
            return Err(SceneError::InvalidName(path.to_string()));
        }
        if self.is_busy(path) {
            return Err(SceneError::AlreadyInProgress(path.to_string()));
        }
        if let Some(swap) = self.pending.iter().find(|op| matches!(op.phase, Phase::Evicting { .. })) {
            return Err(SceneError::SwapInProgress(swap.path.clone()));
        }

        let key = match self.by_path.get(path) {
            Some(key) => *key,
            None => {
                let build_index = self.config.build.index_of(path);
                self.register(path.to_string(), build_index, None)
            }
        };

        if !self.scenes[key].loaded {
            match mode {
                LoadMode::Single => {
                    let evicted: Vec<SceneKey> = self.loaded.clone();
                    let absorbed = self.absorb_unloads(&evicted);
                    self.commit_swap(key, &evicted);
                    for unload in absorbed {
                        unload.handle.complete();
                    }
                }
                LoadMode::Additive => self.commit_additive_key(key),
            }
            log::debug!("Observed host load of '{path}' ({mode:?})");
            self.dispatch();
            self.flush_deferred();
        }

        self.record_of(key)
            .ok_or_else(|| SceneError::NotFound(SceneIdentity::path(path)))
    }

    /// Record an unload the host performed itself
    pub fn observe_unloaded(&mut self, path: &str) -> Result<SceneRecord, SceneError> {
        let key = self.loaded_target(SceneIdentity::path(path))?;
        let record = self
            .commit_unload_key(key)
            .ok_or_else(|| SceneError::NotFound(SceneIdentity::path(path)))?;
        log::debug!("Observed host unload of '{path}'");
        self.dispatch();
        self.flush_deferred();
        Ok(record)
    }

    /// Record an active-scene change the host performed itself
    pub fn observe_active_changed(&mut self, path: &str) -> Result<bool, SceneError> {
        let identity = SceneIdentity::path(path);
        let key = self
            .resolve_key(&identity)
            .ok_or(SceneError::NotFound(identity))?;
        let changed = self.activate(key);
        self.flush_deferred();
        Ok(changed)
    }

    // ========================================================================
    // Internals: resolution and bookkeeping
    // ========================================================================

    fn resolve_key(&self, identity: &SceneIdentity) -> Option<SceneKey> {
        match identity {
            SceneIdentity::Path(path) => self.by_path.get(path).copied(),
            SceneIdentity::Name(name) => self
                .scenes
                .iter()
                .filter(|(_, state)| scene_name_from_path(&state.path) == name)
                .min_by_key(|(_, state)| state.registered)
                .map(|(key, _)| key),
            SceneIdentity::BuildIndex(index) => self
                .config
                .build
                .path_at(*index)
                .and_then(|path| self.by_path.get(path).copied()),
        }
    }

    fn record_of(&self, key: SceneKey) -> Option<SceneRecord> {
        self.scenes
            .get(key)
            .map(|state| SceneRecord::new(key, state.path.clone(), state.build_index, state.loaded))
    }

    fn register(&mut self, path: String, build_index: Option<usize>, registered: Option<u64>) -> SceneKey {
        let registered = registered.unwrap_or_else(|| {
            let order = self.next_registration;
            self.next_registration += 1;
            order
        });
        let key = self.scenes.insert(SceneState {
            path: path.clone(),
            build_index,
            loaded: false,
            registered,
        });
        self.by_path.insert(path, key);
        key
    }

    /// Drop an incarnation from the loaded set and invalidate it
    ///
    /// Build-list scenes get a fresh unloaded incarnation so they stay
    /// loadable. The active scene is cleared if it was this one; callers pick
    /// the successor.
    fn retire(&mut self, key: SceneKey) -> Option<SceneRecord> {
        self.loaded.retain(|loaded| *loaded != key);
        if self.active == Some(key) {
            self.active = None;
        }

        let record = self.record_of(key)?.invalidated();
        let state = self.scenes.remove(key)?;
        self.by_path.remove(&state.path);
        if let Some(index) = state.build_index {
            self.register(state.path, Some(index), Some(state.registered));
        }
        Some(record)
    }

    fn is_busy(&self, path: &str) -> bool {
        self.pending.iter().any(|op| {
            op.path == path
                || match &op.phase {
                    Phase::Evicting { evicted, .. } => evicted
                        .iter()
                        .filter_map(|key| self.scenes.get(*key))
                        .any(|state| state.path == path),
                    _ => false,
                }
        })
    }

    /// Resolve an identity that must be loaded and idle
    fn loaded_target(&self, identity: SceneIdentity) -> Result<SceneKey, SceneError> {
        let key = self
            .resolve_key(&identity)
            .ok_or_else(|| SceneError::NotFound(identity.clone()))?;
        let state = &self.scenes[key];
        if self.is_busy(&state.path) {
            return Err(SceneError::AlreadyInProgress(state.path.clone()));
        }
        if !state.loaded {
            return Err(SceneError::NotLoaded(state.path.clone()));
        }
        Ok(key)
    }

    fn create_scene(&mut self, name: &str, params: &CreateParams) -> Result<SceneRecord, SceneError> {
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(SceneError::InvalidName(name.to_string()));
        }

        let directory = params
            .directory
            .as_deref()
            .unwrap_or(&self.config.scene_directory)
            .trim_end_matches(['/', '\\'])
            .to_string();
        let path_for = |name: &str| {
            if directory.is_empty() {
                format!("{name}.{}", self.config.scene_extension)
            } else {
                format!("{directory}/{name}.{}", self.config.scene_extension)
            }
        };
        let taken = |name: &str| {
            self.resolve_key(&SceneIdentity::name(name)).is_some()
                || self.by_path.contains_key(&path_for(name))
        };

        let final_name = if !taken(name) {
            name.to_string()
        } else {
            match self.config.duplicate_names {
                DuplicateNamePolicy::Reject => {
                    return Err(SceneError::DuplicateName(name.to_string()));
                }
                DuplicateNamePolicy::Rename => {
                    let mut n = 1;
                    loop {
                        let candidate = format!("{name} ({n})");
                        if !taken(&candidate) {
                            break candidate;
                        }
                        n += 1;
                    }
                }
            }
        };

        let path = path_for(&final_name);
        let build_index = self.config.build.index_of(&path);
        let key = self.register(path, build_index, None);
        log::debug!("Created scene '{}'", self.scenes[key].path);

        self.record_of(key)
            .ok_or_else(|| SceneError::NotFound(SceneIdentity::name(final_name)))
    }

    // ========================================================================
    // Internals: operations
    // ========================================================================

    fn start_load(
        &mut self,
        identity: SceneIdentity,
        mode: LoadMode,
        asynchronous: bool,
    ) -> Result<OperationHandle, SceneError> {
        let key = self
            .resolve_key(&identity)
            .ok_or_else(|| SceneError::NotFound(identity.clone()))?;
        let path = self.scenes[key].path.clone();

        if self.is_busy(&path) {
            return Err(SceneError::AlreadyInProgress(path));
        }
        if mode == LoadMode::Single {
            // one loaded-set swap at a time
            if let Some(other) = self
                .pending
                .iter()
                .find(|op| op.kind == OperationKind::Load(LoadMode::Single))
            {
                return Err(SceneError::SwapInProgress(other.path.clone()));
            }
        }
        let already_loaded = self.scenes[key].loaded;
        if already_loaded && mode == LoadMode::Additive {
            return Err(SceneError::AlreadyLoaded(path));
        }

        let record = self
            .record_of(key)
            .ok_or_else(|| SceneError::NotFound(identity))?;
        let phase = if already_loaded {
            // content is already in; only the rest of the loaded set goes
            Phase::Ready
        } else {
            Phase::Loading(self.loader.begin_load(&record))
        };
        log::debug!("Loading scene '{path}' ({mode:?}, async: {asynchronous})");

        Ok(self.enqueue(key, path, record, OperationKind::Load(mode), phase, asynchronous))
    }

    fn start_unload(
        &mut self,
        identity: SceneIdentity,
        asynchronous: bool,
    ) -> Result<OperationHandle, SceneError> {
        let key = self.loaded_target(identity.clone())?;
        let path = self.scenes[key].path.clone();
        let record = self
            .record_of(key)
            .ok_or_else(|| SceneError::NotFound(identity))?;
        let phase = Phase::Loading(self.loader.begin_unload(&record));
        log::debug!("Unloading scene '{path}' (async: {asynchronous})");

        Ok(self.enqueue(key, path, record, OperationKind::Unload, phase, asynchronous))
    }

    fn enqueue(
        &mut self,
        key: SceneKey,
        path: String,
        record: SceneRecord,
        kind: OperationKind,
        phase: Phase,
        asynchronous: bool,
    ) -> OperationHandle {
        let handle = OperationHandle::new(record, kind);
        let id = self.push_pending(key, path, kind, phase, handle.clone());

        if !asynchronous {
            self.drive_blocking(id);
        }
        handle
    }

    fn push_pending(
        &mut self,
        key: SceneKey,
        path: String,
        kind: OperationKind,
        phase: Phase,
        handle: OperationHandle,
    ) -> OperationId {
        let id = OperationId(self.next_operation);
        self.next_operation += 1;

        self.pending.push(PendingOperation {
            id,
            key,
            path,
            kind,
            phase,
            handle,
            absorbed: Vec::new(),
        });
        id
    }

    fn position(&self, id: OperationId) -> Option<usize> {
        self.pending.iter().position(|op| op.id == id)
    }

    fn drive_blocking(&mut self, id: OperationId) {
        while !self.step(id, true) {}
    }

    fn eviction_in_flight(&self) -> Option<OperationId> {
        self.pending
            .iter()
            .find(|op| matches!(op.phase, Phase::Evicting { .. }))
            .map(|op| op.id)
    }

    /// Advance one operation as far as it can go; true once it has ended
    fn step(&mut self, id: OperationId, blocking: bool) -> bool {
        loop {
            let Some(index) = self.position(id) else {
                return true;
            };
            if self.pending[index].handle.is_cancel_requested() {
                self.end(index, &OperationStatus::Cancelled);
                return true;
            }

            let progress = match &mut self.pending[index].phase {
                Phase::Loading(future) => match poll_phase(future, blocking) {
                    Some(result) => Progress::Finished(result),
                    None => return false,
                },
                Phase::Ready => Progress::Commit,
                Phase::Evicting {
                    evicted,
                    remaining,
                    failure,
                } => {
                    remaining.retain_mut(|future| match poll_phase(future, blocking) {
                        Some(result) => {
                            if let Err(error) = result {
                                failure.get_or_insert(error);
                            }
                            false
                        }
                        None => true,
                    });
                    if !remaining.is_empty() {
                        return false;
                    }
                    Progress::Evicted(std::mem::take(evicted), failure.take())
                }
            };

            match progress {
                Progress::Finished(Ok(())) => self.pending[index].phase = Phase::Ready,
                Progress::Finished(Err(error)) => {
                    let status = match self.pending[index].kind {
                        OperationKind::Load(_) => OperationStatus::LoadFailed(error),
                        OperationKind::Unload => OperationStatus::UnloadFailed(error),
                    };
                    self.end(index, &status);
                    return true;
                }
                Progress::Commit => match self.pending[index].kind {
                    OperationKind::Load(LoadMode::Additive) => {
                        // additive loads land after an in-flight swap, never inside it
                        if let Some(other) = self.eviction_in_flight() {
                            if !blocking {
                                return false;
                            }
                            self.drive_blocking(other);
                            continue;
                        }
                        let op = self.pending.remove(index);
                        self.commit_additive_key(op.key);
                        self.finish_committed(&op);
                        return true;
                    }
                    OperationKind::Load(LoadMode::Single) => {
                        if self.begin_eviction(id) {
                            continue;
                        }
                        let op = self.pending.remove(index);
                        self.commit_swap(op.key, &[]);
                        self.finish_committed(&op);
                        return true;
                    }
                    OperationKind::Unload => {
                        let op = self.pending.remove(index);
                        self.commit_unload_key(op.key);
                        self.finish_committed(&op);
                        return true;
                    }
                },
                Progress::Evicted(evicted, Some(error)) => {
                    log::warn!(
                        "Single load of '{}' rolled back: {} scene(s) failed to unload",
                        self.pending[index].path,
                        evicted.len()
                    );
                    self.end(index, &OperationStatus::UnloadFailed(error));
                    return true;
                }
                Progress::Evicted(evicted, None) => {
                    let op = self.pending.remove(index);
                    self.commit_swap(op.key, &evicted);
                    self.finish_committed(&op);
                    return true;
                }
            }
        }
    }

    /// Start unloading everything but the target; false if there is nothing
    /// to evict
    fn begin_eviction(&mut self, id: OperationId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let target = self.pending[index].key;
        let evicted: Vec<SceneKey> = self
            .loaded
            .iter()
            .copied()
            .filter(|key| *key != target)
            .collect();
        if evicted.is_empty() {
            return false;
        }

        let absorbed = self.absorb_unloads(&evicted);
        let records: Vec<SceneRecord> = evicted.iter().filter_map(|key| self.record_of(*key)).collect();
        let remaining: Vec<UnloadFuture> = records
            .iter()
            .map(|record| self.loader.begin_unload(record))
            .collect();

        let Some(index) = self.position(id) else {
            return false;
        };
        let op = &mut self.pending[index];
        log::debug!("Evicting {} scene(s) for '{}'", evicted.len(), op.path);
        op.absorbed.extend(absorbed);
        op.phase = Phase::Evicting {
            evicted,
            remaining,
            failure: None,
        };
        true
    }

    /// Remove pending unloads of scenes about to be evicted; their handles
    /// follow the outcome of the eviction
    fn absorb_unloads(&mut self, evicted: &[SceneKey]) -> Vec<AbsorbedUnload> {
        let mut absorbed = Vec::new();
        self.pending.retain(|op| {
            let fold = op.kind == OperationKind::Unload && evicted.contains(&op.key);
            if fold {
                absorbed.push(AbsorbedUnload {
                    key: op.key,
                    path: op.path.clone(),
                    handle: op.handle.clone(),
                });
            }
            !fold
        });
        absorbed
    }

    /// Start an absorbed unload again after its swap ended without a commit
    fn requeue_unload(&mut self, unload: AbsorbedUnload) {
        if unload.handle.is_cancel_requested() {
            log::debug!("Cancelled {:?} of '{}'", OperationKind::Unload, unload.path);
            unload.handle.finish(OperationStatus::Cancelled);
            return;
        }
        let Some(record) = self.record_of(unload.key) else {
            unload
                .handle
                .finish(OperationStatus::UnloadFailed(LoaderError::Abandoned));
            return;
        };

        let phase = Phase::Loading(self.loader.begin_unload(&record));
        log::debug!("Unloading scene '{}' again after its swap ended", unload.path);
        self.push_pending(unload.key, unload.path, OperationKind::Unload, phase, unload.handle);
    }

    /// End an operation without committing
    fn end(&mut self, index: usize, status: &OperationStatus) {
        let op = self.pending.remove(index);
        match status {
            OperationStatus::Cancelled => log::debug!("Cancelled {:?} of '{}'", op.kind, op.path),
            _ => log::warn!("{:?} of '{}' failed: {:?}", op.kind, op.path, status),
        }
        op.handle.finish(status.clone());
        for unload in op.absorbed {
            self.requeue_unload(unload);
        }
    }

    fn finish_committed(&mut self, op: &PendingOperation) {
        log::debug!("Committed {:?} of '{}'", op.kind, op.path);
        self.dispatch();
        op.handle.complete();
        for unload in &op.absorbed {
            unload.handle.complete();
        }
    }

    // ========================================================================
    // Internals: commits (each one a single visible step)
    // ========================================================================

    fn commit_additive_key(&mut self, key: SceneKey) {
        self.scenes[key].loaded = true;
        self.loaded.push(key);
        if let Some(record) = self.record_of(key) {
            self.events.send(SceneEvent::Loaded(record));
        }
        if self.active.is_none() {
            self.active = Some(key);
            self.send_active_changed(None);
        }
    }

    /// Replace the loaded set with `target`
    ///
    /// A target that was already loaded stays in place and gets no `Loaded`
    /// event.
    fn commit_swap(&mut self, target: SceneKey, evicted: &[SceneKey]) {
        let previous = self.active_scene();
        let kept = self.scenes[target].loaded;
        for key in evicted {
            if let Some(record) = self.retire(*key) {
                self.events.send(SceneEvent::Unloaded(record));
            }
        }

        if !kept {
            self.scenes[target].loaded = true;
            self.loaded.push(target);
            if let Some(record) = self.record_of(target) {
                self.events.send(SceneEvent::Loaded(record));
            }
        }
        debug_assert_eq!(self.loaded, [target], "swap must leave only its target");

        self.active = Some(target);
        if previous.as_ref().map(SceneRecord::key) != Some(target) {
            self.send_active_changed(previous);
        }
    }

    fn commit_unload_key(&mut self, key: SceneKey) -> Option<SceneRecord> {
        let previous = self.active_scene();
        let record = self.retire(key)?;
        self.events.send(SceneEvent::Unloaded(record.clone()));

        if previous.as_ref().is_some_and(|active| active.key() == key) {
            self.active = self.loaded.first().copied();
            self.send_active_changed(previous);
        }
        Some(record)
    }

    fn activate(&mut self, key: SceneKey) -> bool {
        let Some(state) = self.scenes.get(key) else {
            return false;
        };
        if !state.loaded {
            return false;
        }
        if self.active == Some(key) {
            return true;
        }

        let previous = self.active_scene();
        self.active = Some(key);
        self.send_active_changed(previous);
        self.dispatch();
        true
    }

    fn send_active_changed(&mut self, previous: Option<SceneRecord>) {
        let next = self.active_scene();
        self.events.send(SceneEvent::ActiveChanged { previous, next });
    }

    fn dispatch(&mut self) {
        self.events.dispatch(&mut self.commands);
    }

    // ========================================================================
    // Internals: handler-queued commands
    // ========================================================================

    /// Run commands queued by handlers, generation by generation
    fn flush_deferred(&mut self) {
        let mut depth = 0;
        while !self.commands.is_empty() {
            if depth == self.config.max_deferred_depth {
                log::warn!(
                    "Dropping {} deferred scene command(s): chain exceeded {} generations",
                    self.commands.len(),
                    depth
                );
                self.commands.clear();
                self.deferred_errors.push(SceneError::Reentrancy { depth });
                break;
            }
            depth += 1;

            for command in self.commands.take() {
                if let Err(error) = self.apply(command) {
                    log::warn!("Deferred scene command failed: {error}");
                    self.deferred_errors.push(error);
                }
            }
        }
    }

    fn apply(&mut self, command: SceneCommand) -> Result<(), SceneError> {
        match command {
            SceneCommand::Create { name, params } => self.create_scene(&name, &params).map(drop),
            SceneCommand::Load { scene, mode, asynchronous } => {
                self.start_load(scene, mode, asynchronous).map(drop)
            }
            SceneCommand::Unload { scene, asynchronous } => {
                self.start_unload(scene, asynchronous).map(drop)
            }
            SceneCommand::SetActive(scene) => {
                let key = self
                    .resolve_key(&scene)
                    .ok_or_else(|| SceneError::NotFound(scene.clone()))?;
                if self.activate(key) {
                    Ok(())
                } else {
                    Err(SceneError::NotLoaded(self.scenes[key].path.clone()))
                }
            }
        }
    }
}

/// Poll a loader future once, or block on it
fn poll_phase<T>(future: &mut BoxFuture<'static, T>, blocking: bool) -> Option<T> {
    if blocking {
        return Some(pollster::block_on(future));
    }

    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    match future.poll_unpin(&mut cx) {
        Poll::Ready(value) => Some(value),
        Poll::Pending => None,
    }
}

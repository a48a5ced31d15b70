//! Operation handles
//!
//! Every load and unload returns an [`OperationHandle`]. The handle shares its
//! state with the registry: the registry writes the final status when the
//! operation commits, fails or is cancelled; callers poll it, await it, or
//! attach a completion callback.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use serde::{Deserialize, Serialize};

use super::loader::LoaderError;
use super::record::SceneRecord;

/// How a load treats the scenes that are already loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Replace the whole loaded set with the target
    #[default]
    Single,
    /// Add the target to the loaded set
    Additive,
}

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Load with the given mode
    Load(LoadMode),
    /// Unload
    Unload,
}

/// Progress of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still waiting on the loader
    Pending,
    /// State change committed
    Completed {
        /// A cancel request arrived, but only after the commit
        cancel_requested: bool,
    },
    /// Cancelled before anything was committed
    Cancelled,
    /// Loader failed to load the target; nothing was committed
    LoadFailed(LoaderError),
    /// Loader failed to unload a scene; nothing was committed
    UnloadFailed(LoaderError),
}

impl OperationStatus {
    /// True for every status except [`OperationStatus::Pending`]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// True when the state change was committed
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

type CompletionCallback = Box<dyn FnOnce(&OperationStatus) + Send>;

struct HandleState {
    status: OperationStatus,
    cancel_requested: bool,
    waker: Option<Waker>,
    callbacks: Vec<CompletionCallback>,
}

/// Shared view of one load or unload
#[derive(Clone)]
pub struct OperationHandle {
    scene: SceneRecord,
    kind: OperationKind,
    state: Arc<Mutex<HandleState>>,
}

impl OperationHandle {
    pub(crate) fn new(scene: SceneRecord, kind: OperationKind) -> Self {
        Self {
            scene,
            kind,
            state: Arc::new(Mutex::new(HandleState {
                status: OperationStatus::Pending,
                cancel_requested: false,
                waker: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Target scene as resolved when the operation started
    pub fn scene(&self) -> &SceneRecord {
        &self.scene
    }

    /// Operation kind
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Current status
    pub fn status(&self) -> OperationStatus {
        self.lock().status.clone()
    }

    /// True once the operation reached a terminal status
    pub fn is_done(&self) -> bool {
        self.lock().status.is_terminal()
    }

    /// Request cancellation
    ///
    /// Advisory: if the registry has not committed yet the operation ends as
    /// [`OperationStatus::Cancelled`]; otherwise the request is only reflected
    /// in [`OperationStatus::Completed`].
    pub fn cancel(&self) {
        self.lock().cancel_requested = true;
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Run `callback` with the final status
    ///
    /// Runs immediately if the operation is already done, otherwise on the
    /// thread that finishes it.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&OperationStatus) + Send + 'static,
    {
        let mut state = self.lock();
        if state.status.is_terminal() {
            let status = state.status.clone();
            drop(state);
            callback(&status);
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }

    /// Write the terminal status; later calls are ignored
    pub(crate) fn finish(&self, status: OperationStatus) {
        debug_assert!(status.is_terminal());
        let (status, waker, callbacks) = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                return;
            }
            state.status = status.clone();
            (status, state.waker.take(), std::mem::take(&mut state.callbacks))
        };

        if let Some(waker) = waker {
            waker.wake();
        }
        for callback in callbacks {
            callback(&status);
        }
    }

    /// Finish as committed, recording whether a cancel came too late
    pub(crate) fn complete(&self) {
        let cancel_requested = self.is_cancel_requested();
        self.finish(OperationStatus::Completed { cancel_requested });
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Future for OperationHandle {
    type Output = OperationStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.lock();
        if state.status.is_terminal() {
            Poll::Ready(state.status.clone())
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("scene", &self.scene.path())
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

//! Scene lifecycle events
//!
//! Key principles:
//! - Registration system (handlers only see the event kinds they asked for)
//! - Queuing: the registry sends events while committing a transition, then
//!   dispatches the whole batch in order (unloads, load, active change)
//! - Handlers cannot touch the registry; they queue [`SceneCommand`]s, which the
//!   registry runs after the dispatching operation has finished

use bitflags::bitflags;

use crate::scene::{CreateParams, LoadMode, SceneIdentity, SceneRecord};

bitflags! {
    /// Set of event kinds a handler subscribes to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u8 {
        /// A scene joined the loaded set
        const LOADED = 1 << 0;
        /// A scene left the loaded set
        const UNLOADED = 1 << 1;
        /// The active scene changed
        const ACTIVE_CHANGED = 1 << 2;
    }
}

/// Scene lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// Scene was loaded
    Loaded(SceneRecord),
    /// Scene was unloaded; the record is already invalid
    Unloaded(SceneRecord),
    /// Active scene changed
    ActiveChanged {
        /// Previously active scene
        previous: Option<SceneRecord>,
        /// Newly active scene
        next: Option<SceneRecord>,
    },
}

impl SceneEvent {
    /// Mask bit of this event
    pub fn kind(&self) -> EventMask {
        match self {
            Self::Loaded(_) => EventMask::LOADED,
            Self::Unloaded(_) => EventMask::UNLOADED,
            Self::ActiveChanged { .. } => EventMask::ACTIVE_CHANGED,
        }
    }
}

/// Mutation queued by an event handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneCommand {
    /// Create a scene
    Create {
        /// Requested name
        name: String,
        /// Creation parameters
        params: CreateParams,
    },
    /// Load a scene
    Load {
        /// Target
        scene: SceneIdentity,
        /// Load mode
        mode: LoadMode,
        /// Leave pending for `update` instead of blocking
        asynchronous: bool,
    },
    /// Unload a scene
    Unload {
        /// Target
        scene: SceneIdentity,
        /// Leave pending for `update` instead of blocking
        asynchronous: bool,
    },
    /// Make a loaded scene active
    SetActive(SceneIdentity),
}

/// Command queue handed to event handlers
#[derive(Debug, Default)]
pub struct SceneCommands {
    queue: Vec<SceneCommand>,
}

impl SceneCommands {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scene creation
    pub fn create(&mut self, name: impl Into<String>) {
        self.push(SceneCommand::Create {
            name: name.into(),
            params: CreateParams::default(),
        });
    }

    /// Queue a blocking load
    pub fn load(&mut self, scene: impl Into<SceneIdentity>, mode: LoadMode) {
        self.push(SceneCommand::Load {
            scene: scene.into(),
            mode,
            asynchronous: false,
        });
    }

    /// Queue a load that completes through `update`
    pub fn load_async(&mut self, scene: impl Into<SceneIdentity>, mode: LoadMode) {
        self.push(SceneCommand::Load {
            scene: scene.into(),
            mode,
            asynchronous: true,
        });
    }

    /// Queue a blocking unload
    pub fn unload(&mut self, scene: impl Into<SceneIdentity>) {
        self.push(SceneCommand::Unload {
            scene: scene.into(),
            asynchronous: false,
        });
    }

    /// Queue an unload that completes through `update`
    pub fn unload_async(&mut self, scene: impl Into<SceneIdentity>) {
        self.push(SceneCommand::Unload {
            scene: scene.into(),
            asynchronous: true,
        });
    }

    /// Queue an active-scene change
    pub fn set_active(&mut self, scene: impl Into<SceneIdentity>) {
        self.push(SceneCommand::SetActive(scene.into()));
    }

    /// Queue any command
    pub fn push(&mut self, command: SceneCommand) {
        self.queue.push(command);
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn take(&mut self) -> Vec<SceneCommand> {
        std::mem::take(&mut self.queue)
    }

    pub(crate) fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Event handler trait
///
/// Closures of the form `FnMut(&SceneEvent, &mut SceneCommands)` implement it.
pub trait SceneEventHandler: Send {
    /// Handle an event, optionally queueing follow-up commands
    fn on_event(&mut self, event: &SceneEvent, commands: &mut SceneCommands);
}

impl<F> SceneEventHandler for F
where
    F: FnMut(&SceneEvent, &mut SceneCommands) + Send,
{
    fn on_event(&mut self, event: &SceneEvent, commands: &mut SceneCommands) {
        self(event, commands);
    }
}

/// Identifies a subscription for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    mask: EventMask,
    handler: Box<dyn SceneEventHandler>,
}

/// Event bus with registration and queuing
pub struct EventBus {
    queue: Vec<SceneEvent>,
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    /// Create a new empty event bus
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a handler for the event kinds in `mask`
    ///
    /// Handlers run in registration order.
    pub fn subscribe(&mut self, mask: EventMask, handler: Box<dyn SceneEventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription { id, mask, handler });
        id
    }

    /// Remove a handler; false if the id is unknown
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Queue an event for the next dispatch
    pub fn send(&mut self, event: SceneEvent) {
        self.queue.push(event);
    }

    /// Number of queued events
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deliver queued events in send order
    pub fn dispatch(&mut self, commands: &mut SceneCommands) {
        let events = std::mem::take(&mut self.queue);
        for event in &events {
            let kind = event.kind();
            for subscription in &mut self.subscriptions {
                if subscription.mask.intersects(kind) {
                    subscription.handler.on_event(event, commands);
                }
            }
        }
    }

    /// Drop queued events without delivering them
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HandleMap;
    use std::sync::{Arc, Mutex};

    fn record(path: &str) -> SceneRecord {
        let mut keys: HandleMap<()> = HandleMap::with_key();
        SceneRecord::new(keys.insert(()), path, None, true)
    }

    #[test]
    fn test_mask_filters_events() {
        let mut bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(
            EventMask::UNLOADED,
            Box::new(move |event: &SceneEvent, _: &mut SceneCommands| {
                sink.lock().unwrap().push(event.kind());
            }),
        );

        bus.send(SceneEvent::Loaded(record("a.scene")));
        bus.send(SceneEvent::Unloaded(record("b.scene")));
        bus.dispatch(&mut SceneCommands::new());

        assert_eq!(*seen.lock().unwrap(), vec![EventMask::UNLOADED]);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let id = bus.subscribe(EventMask::all(), Box::new(|_: &SceneEvent, _: &mut SceneCommands| {}));

        assert_eq!(bus.handler_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_handlers_queue_commands() {
        let mut bus = EventBus::new();
        bus.subscribe(
            EventMask::LOADED,
            Box::new(|event: &SceneEvent, commands: &mut SceneCommands| {
                if let SceneEvent::Loaded(scene) = event {
                    commands.set_active(scene);
                }
            }),
        );

        let mut commands = SceneCommands::new();
        bus.send(SceneEvent::Loaded(record("a.scene")));
        bus.dispatch(&mut commands);

        assert_eq!(
            commands.take(),
            vec![SceneCommand::SetActive(SceneIdentity::path("a.scene"))]
        );
        assert!(commands.is_empty());
    }
}

//! Broadcast bus for notifications
//!
//! Built on a tokio broadcast channel. Emitting never blocks and never fails:
//! with no subscribers the event is dropped, and a lagging subscriber loses the
//! oldest events.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::NotifyEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

pub struct EventBus {
    tx: broadcast::Sender<NotifyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Fire-and-forget delivery to every current subscriber
    pub fn emit(&self, event: NotifyEvent) {
        debug!(event_type = event.event_type(), task_id = event.task_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receives everything emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NotifyEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one task
    pub fn emitter_for(&self, task_id: impl Into<String>) -> EventEmitter {
        let task_id = task_id.into();
        debug!(%task_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            task_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cheap handle that stamps every event with its task id
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<NotifyEvent>,
    task_id: String,
}

impl EventEmitter {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn emit(&self, event: NotifyEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    pub fn breakdown_ready(&self, title: &str, step_count: usize, total_minutes: u32, fallback: bool) {
        self.emit(NotifyEvent::BreakdownReady {
            task_id: self.task_id.clone(),
            title: title.to_string(),
            step_count,
            total_minutes,
            fallback,
        });
    }

    pub fn step_refined(&self, path: &[u32], child_count: usize) {
        self.emit(NotifyEvent::StepRefined {
            task_id: self.task_id.clone(),
            path: path.to_vec(),
            child_count,
        });
    }

    pub fn breakdown_approved(&self, step_count: usize) {
        self.emit(NotifyEvent::BreakdownApproved {
            task_id: self.task_id.clone(),
            step_count,
        });
    }
}

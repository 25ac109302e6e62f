//! Notifications for accepted pipeline output
//!
//! The pipeline itself never notifies anyone. Callers (the CLI, a server) emit
//! onto the bus once they accept a breakdown, attach refined children or approve
//! a draft. Whoever cares about that (a reminder scheduler, a push relay) subscribes.
//!
//! ```rust,ignore
//! use taskbreaker::events::{EventBus, NotifyEvent};
//!
//! let bus = EventBus::with_default_capacity();
//! let mut rx = bus.subscribe();
//!
//! bus.emitter_for(task.id.to_string()).breakdown_ready(&task.title, 5, 45, false);
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}", event.event_type());
//! }
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use types::NotifyEvent;

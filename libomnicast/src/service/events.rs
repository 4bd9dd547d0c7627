//! Event system for progress tracking
//!
//! In-process event bus over `tokio::sync::broadcast`. Services emit during
//! linking and dispatch; any number of subscribers (CLI output, daemon
//! logging) can listen. Emitting never blocks, and events are dropped when
//! nobody subscribes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus; `capacity` bounds the per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers. Lagging subscribers lose the
    /// oldest events first; an empty subscriber set drops the event.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    AccountLinked {
        user_id: String,
        platform: String,
        display_name: String,
    },
    AccountDisconnected {
        user_id: String,
        platform: String,
    },
    DispatchStarted {
        post_id: String,
        platforms: Vec<String>,
    },
    PlatformPublished {
        post_id: String,
        platform: String,
        platform_post_id: String,
    },
    PlatformFailed {
        post_id: String,
        platform: String,
        error: String,
    },
    DispatchCompleted {
        post_id: String,
        status: String,
    },
}

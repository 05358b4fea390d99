//! Shared service state
//!
//! Holds the event bus every component publishes to and SSE clients
//! subscribe to.

use clara_common::events::{ClaraEvent, EventBus};
use tokio::sync::broadcast;

/// Default event channel capacity
pub const EVENT_CAPACITY: usize = 256;

/// Shared state accessible by all components
pub struct SharedState {
    events: EventBus,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: EventBus::new(capacity),
            started_at: chrono::Utc::now(),
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: ClaraEvent) {
        // No receivers is OK
        self.events.emit_lossy(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClaraEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

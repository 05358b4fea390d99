//! Event types for the Claramente event system
//!
//! Provides shared event definitions and EventBus for narration observers.

mod narration_types;

pub use narration_types::{NarrationMode, NarrationState};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Claramente event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaraEvent {
    /// A narration session was created and its tasks launched
    NarrationStarted {
        session_id: Uuid,
        mode: NarrationMode,
        /// Number of segments the text was cut into
        segment_count: usize,
        /// Speed multiplier the session starts with
        speed: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session lifecycle transition
    ///
    /// Triggers:
    /// - SSE: Update play/stop controls
    NarrationStateChanged {
        session_id: Uuid,
        old_state: NarrationState,
        new_state: NarrationState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering indicator toggled
    ///
    /// Emitted only on change, so a UI spinner can follow it directly.
    BufferingChanged {
        session_id: Uuid,
        buffering: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A decoded buffer was placed on the output timeline
    SegmentScheduled {
        session_id: Uuid,
        segment_index: usize,
        /// Output clock time (seconds) the buffer starts at
        start_at: f64,
        /// Wall duration at the applied rate (seconds)
        duration_secs: f64,
        playback_rate: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment could not be synthesized or decoded and was skipped
    SegmentSkipped {
        session_id: Uuid,
        segment_index: usize,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Speed multiplier changed (applies to the next scheduled buffer)
    SpeedChanged {
        /// Active session, if any
        session_id: Option<Uuid>,
        speed: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached DONE
    NarrationCompleted {
        session_id: Uuid,
        scheduled_segments: usize,
        skipped_segments: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached FAILED, or could not start at all
    NarrationFailed {
        session_id: Option<Uuid>,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ClaraEvent {
    /// Variant name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            ClaraEvent::NarrationStarted { .. } => "NarrationStarted",
            ClaraEvent::NarrationStateChanged { .. } => "NarrationStateChanged",
            ClaraEvent::BufferingChanged { .. } => "BufferingChanged",
            ClaraEvent::SegmentScheduled { .. } => "SegmentScheduled",
            ClaraEvent::SegmentSkipped { .. } => "SegmentSkipped",
            ClaraEvent::SpeedChanged { .. } => "SpeedChanged",
            ClaraEvent::NarrationCompleted { .. } => "NarrationCompleted",
            ClaraEvent::NarrationFailed { .. } => "NarrationFailed",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use clara_common::events::{ClaraEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ClaraEvent::SpeedChanged {
///     session_id: None,
///     speed: 1.25,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(ClaraEvent::SpeedChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClaraEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ClaraEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClaraEvent,
    ) -> Result<usize, broadcast::error::SendError<ClaraEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ClaraEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_changed(session_id: Uuid) -> ClaraEvent {
        ClaraEvent::NarrationStateChanged {
            session_id,
            old_state: NarrationState::Buffering,
            new_state: NarrationState::Playing,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.emit(state_changed(Uuid::new_v4())).is_err());

        // Lossy variant never reports
        bus.emit_lossy(state_changed(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        assert_eq!(bus.emit(state_changed(id)).unwrap(), 1);
        bus.emit_lossy(ClaraEvent::BufferingChanged {
            session_id: id,
            buffering: false,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            ClaraEvent::NarrationStateChanged { session_id, new_state, .. } => {
                assert_eq!(session_id, id);
                assert_eq!(new_state, NarrationState::Playing);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClaraEvent::BufferingChanged { buffering: false, .. }
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ClaraEvent::SegmentSkipped {
            session_id: Uuid::new_v4(),
            segment_index: 1,
            reason: "quota exceeded".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "SegmentSkipped");
        assert_eq!(value["segment_index"], 1);
        assert_eq!(event.event_type(), "SegmentSkipped");
    }

    #[test]
    fn test_capacity_is_reported() {
        let bus = EventBus::new(42);
        assert_eq!(bus.capacity(), 42);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}

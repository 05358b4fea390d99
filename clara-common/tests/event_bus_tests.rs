//! EventBus behaviour as seen by SSE clients and other observers

use clara_common::events::{ClaraEvent, EventBus, NarrationMode, NarrationState};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

fn speed_changed(speed: f32) -> ClaraEvent {
    ClaraEvent::SpeedChanged {
        session_id: None,
        speed,
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_every_subscriber_sees_every_event() {
    let bus = EventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    assert_eq!(bus.emit(speed_changed(0.75)).unwrap(), 2);

    for rx in [&mut first, &mut second] {
        match rx.recv().await.unwrap() {
            ClaraEvent::SpeedChanged { speed, .. } => assert_eq!(speed, 0.75),
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_slow_subscriber_is_told_it_lagged() {
    let bus = EventBus::new(2);
    let mut rx = bus.subscribe();

    for speed in [0.5, 0.75, 1.0, 1.25] {
        bus.emit_lossy(speed_changed(speed));
    }

    assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
    // The newest events are still delivered after the lag notice
    assert!(matches!(rx.recv().await, Ok(ClaraEvent::SpeedChanged { speed, .. }) if speed == 1.0));
}

#[test]
fn test_events_decode_from_sse_payloads() {
    let session_id = Uuid::new_v4();
    let json = format!(
        r#"{{"type":"NarrationStarted","session_id":"{}","mode":"utterance","segment_count":1,"speed":1.5,"timestamp":"2026-01-05T10:00:00Z"}}"#,
        session_id
    );

    match serde_json::from_str::<ClaraEvent>(&json).unwrap() {
        ClaraEvent::NarrationStarted { session_id: id, mode, segment_count, .. } => {
            assert_eq!(id, session_id);
            assert_eq!(mode, NarrationMode::Utterance);
            assert_eq!(segment_count, 1);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let json = format!(
        r#"{{"type":"NarrationStateChanged","session_id":"{}","old_state":"PLAYING","new_state":"ABORTED","timestamp":"2026-01-05T10:00:01Z"}}"#,
        session_id
    );
    let event: ClaraEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(event.event_type(), "NarrationStateChanged");
    assert!(matches!(
        event,
        ClaraEvent::NarrationStateChanged { new_state: NarrationState::Aborted, .. }
    ));
}

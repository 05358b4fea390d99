//! Playback session state
//!
//! One session per "read it to me" request. The producer and scheduler
//! tasks share it through an `Arc`; the controller keeps its own handle to
//! abort it.

use crate::audio::output::{AudioOutput, ScheduledSource, SourceId};
use crate::error::Result;
use crate::narration::prefetch::PrefetchQueue;
use crate::narration::segmenter::TextSegment;
use clara_common::events::{ClaraEvent, EventBus, NarrationMode, NarrationState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recorded state change
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: NarrationState,
    pub new_state: NarrationState,
    pub transitioned_at: chrono::DateTime<chrono::Utc>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NarrationStatus {
    pub session_id: Option<Uuid>,
    pub state: NarrationState,
    pub mode: Option<NarrationMode>,
    pub segment_count: usize,
    pub fetch_index: usize,
    pub play_index: usize,
    pub queued: usize,
    pub buffering: bool,
    pub speed: f32,
    pub scheduled_segments: usize,
    pub skipped_segments: usize,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl NarrationStatus {
    /// Status reported before any session ran
    pub fn idle(speed: f32) -> Self {
        Self {
            session_id: None,
            state: NarrationState::Idle,
            mode: None,
            segment_count: 0,
            fetch_index: 0,
            play_index: 0,
            queued: 0,
            buffering: false,
            speed,
            scheduled_segments: 0,
            skipped_segments: 0,
            started_at: None,
            ended_at: None,
        }
    }
}

/// Shared state of one narration
pub struct PlaybackSession {
    id: Uuid,
    mode: NarrationMode,
    segments: Vec<TextSegment>,
    queue: PrefetchQueue,
    cancel: CancellationToken,
    speed: Mutex<f32>,
    state: watch::Sender<NarrationState>,
    buffering: AtomicBool,
    scheduled: AtomicUsize,
    skipped: AtomicUsize,
    /// Sources placed on the output, stopped on abort
    sources: Mutex<Vec<SourceId>>,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
    events: EventBus,
}

impl PlaybackSession {
    pub fn new(
        mode: NarrationMode,
        segments: Vec<TextSegment>,
        queue_capacity: usize,
        speed: f32,
        events: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(NarrationState::Idle);
        Self {
            id: Uuid::new_v4(),
            mode,
            segments,
            queue: PrefetchQueue::new(queue_capacity),
            cancel: CancellationToken::new(),
            speed: Mutex::new(speed),
            state,
            buffering: AtomicBool::new(false),
            scheduled: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
            started_at: chrono::Utc::now(),
            ended_at: Mutex::new(None),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> NarrationMode {
        self.mode
    }

    pub fn segments(&self) -> &[TextSegment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn queue(&self) -> &PrefetchQueue {
        &self.queue
    }

    pub fn state(&self) -> NarrationState {
        *self.state.borrow()
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is aborted or has failed
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn speed(&self) -> f32 {
        *self.speed.lock()
    }

    pub fn set_speed(&self, speed: f32) {
        *self.speed.lock() = speed;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.load(Ordering::SeqCst)
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.load(Ordering::SeqCst)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Move to `new_state` if the lifecycle allows it
    ///
    /// Returns None when the transition is not allowed, which includes any
    /// transition out of a terminal state.
    pub fn transition_to(&self, new_state: NarrationState) -> Option<StateTransition> {
        let mut old_state = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(new_state) {
                old_state = Some(*state);
                *state = new_state;
                true
            } else {
                false
            }
        });
        let old_state = old_state?;

        let now = chrono::Utc::now();
        if new_state.is_terminal() {
            *self.ended_at.lock() = Some(now);
        }
        debug!(session_id = %self.id, %old_state, %new_state, "Narration state changed");
        self.events.emit_lossy(ClaraEvent::NarrationStateChanged {
            session_id: self.id,
            old_state,
            new_state,
            timestamp: now,
        });

        Some(StateTransition {
            session_id: self.id,
            old_state,
            new_state,
            transitioned_at: now,
        })
    }

    /// Update the buffering flag; PLAYING and BUFFERING follow it
    ///
    /// Ignored once the session is aborted or has ended.
    pub fn set_buffering(&self, buffering: bool) {
        if self.is_aborted() || self.state().is_terminal() {
            return;
        }
        let was = self.buffering.swap(buffering, Ordering::SeqCst);
        if was != buffering {
            self.events.emit_lossy(ClaraEvent::BufferingChanged {
                session_id: self.id,
                buffering,
                timestamp: chrono::Utc::now(),
            });
        }
        let target = if buffering {
            NarrationState::Buffering
        } else {
            NarrationState::Playing
        };
        if self.state() != target {
            self.transition_to(target);
        }
    }

    /// Place a source on the output unless the session was aborted
    ///
    /// The abort check, the schedule call and the bookkeeping all run under
    /// the `sources` lock that `abort()` takes after cancelling. Either
    /// `abort()` gets the new source back or it is never scheduled.
    /// Returns `Ok(None)` for an aborted session.
    pub fn schedule_on(&self, output: &dyn AudioOutput, source: ScheduledSource) -> Result<Option<SourceId>> {
        let mut sources = self.sources.lock();
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let id = output.schedule(source)?;
        sources.push(id);
        Ok(Some(id))
    }

    pub fn record_scheduled(&self, segment_index: usize, start_at: f64, duration_secs: f64, playback_rate: f32) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.events.emit_lossy(ClaraEvent::SegmentScheduled {
            session_id: self.id,
            segment_index,
            start_at,
            duration_secs,
            playback_rate,
            timestamp: chrono::Utc::now(),
        });
    }

    pub fn record_skipped(&self, segment_index: usize, reason: String) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.events.emit_lossy(ClaraEvent::SegmentSkipped {
            session_id: self.id,
            segment_index,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Cancel the tasks, drop queued audio and hand back the sources to stop
    ///
    /// Idempotent: later calls return an empty list.
    pub fn abort(&self) -> Vec<SourceId> {
        self.cancel.cancel();
        self.queue.close();
        let sources = std::mem::take(&mut *self.sources.lock());
        if self.transition_to(NarrationState::Aborted).is_some() {
            info!(session_id = %self.id, "Narration aborted");
        }
        sources
    }

    /// End the session in FAILED and stop its tasks
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.transition_to(NarrationState::Failed).is_none() {
            return;
        }
        warn!(session_id = %self.id, "Narration failed: {}", reason);
        self.cancel.cancel();
        self.queue.close();
        self.events.emit_lossy(ClaraEvent::NarrationFailed {
            session_id: Some(self.id),
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Natural end of the scheduler loop
    ///
    /// DONE when something was audible, FAILED when every segment failed.
    pub fn finish(&self) {
        let scheduled = self.scheduled_count();
        if scheduled == 0 {
            self.fail("all segments failed to synthesize");
            return;
        }
        if self.transition_to(NarrationState::Done).is_some() {
            self.buffering.store(false, Ordering::SeqCst);
            info!(
                session_id = %self.id,
                scheduled,
                skipped = self.skipped_count(),
                "Narration completed"
            );
            self.events.emit_lossy(ClaraEvent::NarrationCompleted {
                session_id: self.id,
                scheduled_segments: scheduled,
                skipped_segments: self.skipped_count(),
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Wait for a terminal state
    pub async fn wait_finished(&self) -> NarrationState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        match result {
            Ok(state) => state,
            // Sender lives in self, so the channel cannot close while we borrow it
            Err(_) => self.state(),
        }
    }

    pub fn status(&self) -> NarrationStatus {
        let cursors = self.queue.cursors();
        NarrationStatus {
            session_id: Some(self.id),
            state: self.state(),
            mode: Some(self.mode),
            segment_count: self.segments.len(),
            fetch_index: cursors.fetch_index,
            play_index: cursors.play_index,
            queued: cursors.queued,
            buffering: self.is_buffering(),
            speed: self.speed(),
            scheduled_segments: self.scheduled_count(),
            skipped_segments: self.skipped_count(),
            started_at: Some(self.started_at),
            ended_at: *self.ended_at.lock(),
        }
    }
}

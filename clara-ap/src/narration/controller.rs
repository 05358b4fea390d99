//! Session controller
//!
//! Owns the output context and at most one active [`PlaybackSession`].
//! Starting a narration aborts the previous one and stops every source it
//! placed on the output before anything of the new session is scheduled.

use crate::audio::output::{AudioOutput, OutputContext, OutputStatus};
use crate::config::{clamp_speed, NarrationSettings};
use crate::error::{Error, Result};
use crate::narration::prefetch::run_producer;
use crate::narration::scheduler::{run_scheduler, SchedulerTiming};
use crate::narration::segmenter::{Segmenter, TextSegment};
use crate::narration::session::{NarrationStatus, PlaybackSession};
use crate::state::SharedState;
use crate::synthesis::SpeechSynthesizer;
use clara_common::events::{ClaraEvent, NarrationMode, NarrationState};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successful start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartedNarration {
    pub session_id: Uuid,
    pub segment_count: usize,
}

struct ActiveSession {
    session: Arc<PlaybackSession>,
    output: Arc<dyn AudioOutput>,
}

impl ActiveSession {
    /// Abort the session and stop whatever it already scheduled
    fn halt(&self) {
        for source in self.session.abort() {
            // Finished sources refuse to stop; nothing to do about them
            if let Err(e) = self.output.stop_source(source) {
                debug!(session_id = %self.session.id(), source = source.0, "Source already stopped: {}", e);
            }
        }
    }
}

pub struct SessionController {
    state: Arc<SharedState>,
    output: OutputContext,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: NarrationSettings,
    segmenter: Segmenter,
    speed: Mutex<f32>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionController {
    pub fn new(
        state: Arc<SharedState>,
        output: OutputContext,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        settings: NarrationSettings,
    ) -> Self {
        Self {
            state,
            output,
            synthesizer,
            segmenter: Segmenter::new(settings.min_segment_chars),
            speed: Mutex::new(clamp_speed(settings.default_speed)),
            settings,
            active: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &NarrationSettings {
        &self.settings
    }

    /// Narrate `text` continuously, sentence by sentence
    pub fn start(&self, text: &str) -> Result<StartedNarration> {
        self.start_with(text, NarrationMode::Continuous)
    }

    /// Start a new session, replacing any running one
    ///
    /// Invalid text is rejected before the running session is touched.
    pub fn start_with(&self, text: &str, mode: NarrationMode) -> Result<StartedNarration> {
        self.start_with_speed(text, mode, None)
    }

    /// Start a new session, optionally at a new speed
    ///
    /// The speed is stored only once the text is segmented and the output is
    /// ready. The output is opened before the session lock is taken.
    pub fn start_with_speed(&self, text: &str, mode: NarrationMode, speed: Option<f32>) -> Result<StartedNarration> {
        let segments: Vec<TextSegment> = match mode {
            NarrationMode::Continuous => self.segmenter.segments(text)?.collect(),
            NarrationMode::Utterance => self.segmenter.utterance(text)?.collect(),
        };
        if let Some(speed) = speed {
            if !speed.is_finite() {
                return Err(Error::BadRequest(format!("speed must be a finite number, got {}", speed)));
            }
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::InvalidState("narration requires a tokio runtime".to_string()))?;

        let output = self.ready_output()?;

        let mut active = self.active.lock();

        if let Some(previous) = active.take() {
            debug!(session_id = %previous.session.id(), "Replacing running narration");
            previous.halt();
        }

        let speed = {
            let mut current = self.speed.lock();
            if let Some(speed) = speed {
                *current = clamp_speed(speed);
            }
            *current
        };
        let session = Arc::new(PlaybackSession::new(
            mode,
            segments,
            self.settings.queue_capacity,
            speed,
            self.state.event_bus().clone(),
        ));
        let segment_count = session.segment_count();

        info!(session_id = %session.id(), %mode, segment_count, speed, "Starting narration");
        self.state.broadcast_event(ClaraEvent::NarrationStarted {
            session_id: session.id(),
            mode,
            segment_count,
            speed,
            timestamp: chrono::Utc::now(),
        });
        session.transition_to(NarrationState::Buffering);

        runtime.spawn(run_producer(
            Arc::clone(&session),
            Arc::clone(&self.synthesizer),
            self.settings.producer_poll,
        ));
        runtime.spawn(run_scheduler(
            Arc::clone(&session),
            Arc::clone(&output),
            SchedulerTiming {
                poll: self.settings.scheduler_poll,
                splice_overlap: self.settings.splice_overlap,
            },
        ));

        let started = StartedNarration {
            session_id: session.id(),
            segment_count,
        };
        *active = Some(ActiveSession { session, output });
        Ok(started)
    }

    /// Acquire the output and make sure it is running
    fn ready_output(&self) -> Result<Arc<dyn AudioOutput>> {
        let output = self.output.acquire().map_err(|e| self.output_failure(e))?;

        match output.status() {
            OutputStatus::Running => Ok(output),
            OutputStatus::Suspended => {
                debug!("Audio output suspended, resuming");
                output.resume().map_err(|e| {
                    self.output_failure(Error::OutputUnavailable(format!("resume failed: {}", e)))
                })?;
                Ok(output)
            }
            OutputStatus::Closed => Err(self.output_failure(Error::OutputUnavailable(
                "audio output closed".to_string(),
            ))),
        }
    }

    fn output_failure(&self, error: Error) -> Error {
        let error = match error {
            Error::OutputUnavailable(_) => error,
            other => Error::OutputUnavailable(other.to_string()),
        };
        warn!("Narration cannot start: {}", error);
        self.state.broadcast_event(ClaraEvent::NarrationFailed {
            session_id: None,
            reason: error.to_string(),
            timestamp: chrono::Utc::now(),
        });
        error
    }

    /// Abort the running session, if any; idempotent
    pub fn stop(&self) -> NarrationStatus {
        let active = self.active.lock();
        match active.as_ref() {
            Some(active) => {
                active.halt();
                active.session.status()
            }
            None => NarrationStatus::idle(*self.speed.lock()),
        }
    }

    /// Alias of [`stop`](Self::stop)
    pub fn abort(&self) -> NarrationStatus {
        self.stop()
    }

    /// Set the speed multiplier for the next scheduled buffer and for later
    /// sessions; returns the effective (clamped) value
    pub fn set_speed(&self, speed: f32) -> Result<f32> {
        if !speed.is_finite() {
            return Err(Error::BadRequest(format!("speed must be a finite number, got {}", speed)));
        }
        let speed = clamp_speed(speed);
        *self.speed.lock() = speed;

        let session_id = self.active.lock().as_ref().and_then(|active| {
            if active.session.state().is_terminal() {
                None
            } else {
                active.session.set_speed(speed);
                Some(active.session.id())
            }
        });

        debug!(speed, ?session_id, "Speed changed");
        self.state.broadcast_event(ClaraEvent::SpeedChanged {
            session_id,
            speed,
            timestamp: chrono::Utc::now(),
        });
        Ok(speed)
    }

    pub fn speed(&self) -> f32 {
        *self.speed.lock()
    }

    /// Snapshot of the current (or last) session
    pub fn status(&self) -> NarrationStatus {
        match self.active.lock().as_ref() {
            Some(active) => active.session.status(),
            None => NarrationStatus::idle(*self.speed.lock()),
        }
    }

    pub fn current_session_id(&self) -> Option<Uuid> {
        self.active.lock().as_ref().map(|active| active.session.id())
    }

    /// Terminal state of the current session; IDLE when none ever ran
    pub async fn wait_finished(&self) -> NarrationState {
        let session = self.active.lock().as_ref().map(|active| Arc::clone(&active.session));
        match session {
            Some(session) => session.wait_finished().await,
            None => NarrationState::Idle,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClaraEvent> {
        self.state.subscribe_events()
    }

    /// Stop narrating and release the output
    pub fn shutdown(&self) {
        self.stop();
        if let Err(e) = self.output.release() {
            warn!("Failed to release audio output: {}", e);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Shared test infrastructure for clara-ap integration tests
//!
//! - `ScriptedSynthesizer`: speech synthesizer with per-segment failures,
//!   delays and gates
//! - `payload`: PCM16 payload builder
//! - `TestNarrator`: controller wired to a `VirtualOutput`

#![allow(dead_code)]

use async_trait::async_trait;
use clara_ap::audio::{pcm, EncodedAudioPayload, OutputContext, VirtualOutput, SYNTHESIS_SAMPLE_RATE};
use clara_ap::config::NarrationSettings;
use clara_ap::narration::{SessionController, TextSegment};
use clara_ap::synthesis::{SpeechSynthesizer, SynthesisError};
use clara_ap::SharedState;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Payload holding `secs` seconds of a quiet constant tone at 24 kHz
pub fn payload(secs: f64) -> EncodedAudioPayload {
    let frames = (secs * SYNTHESIS_SAMPLE_RATE as f64).round() as usize;
    pcm::encode_samples(&vec![0.25f32; frames])
}

/// Synthesizer whose behaviour is scripted per segment index
pub struct ScriptedSynthesizer {
    segment_secs: f64,
    failures: HashSet<usize>,
    delays: HashMap<usize, Duration>,
    default_delay: Duration,
    gates: HashMap<usize, Arc<Notify>>,
    calls: Mutex<Vec<usize>>,
    completed: Mutex<Vec<usize>>,
}

impl ScriptedSynthesizer {
    /// Every segment succeeds instantly with `segment_secs` of audio
    pub fn new(segment_secs: f64) -> Self {
        Self {
            segment_secs,
            failures: HashSet::new(),
            delays: HashMap::new(),
            default_delay: Duration::ZERO,
            gates: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, index: usize) -> Self {
        self.failures.insert(index);
        self
    }

    pub fn failing_all(mut self, count: usize) -> Self {
        self.failures.extend(0..count);
        self
    }

    pub fn with_delay(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Hold the synthesis of `index` until the returned gate is notified
    pub fn gated(mut self, index: usize) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gates.insert(index, Arc::clone(&gate));
        (self, gate)
    }

    /// Segment indexes in the order synthesis was requested
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }

    /// Segment indexes whose synthesis call has returned
    pub fn completed(&self) -> Vec<usize> {
        self.completed.lock().clone()
    }

    /// Wait (in test time) until synthesis of `index` has been requested
    pub async fn wait_for_call(&self, index: usize) {
        while !self.calls.lock().contains(&index) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, segment: &TextSegment) -> Result<EncodedAudioPayload, SynthesisError> {
        self.calls.lock().push(segment.index);

        let delay = self.delays.get(&segment.index).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = self.gates.get(&segment.index) {
            gate.notified().await;
        }

        self.completed.lock().push(segment.index);
        if self.failures.contains(&segment.index) {
            return Err(SynthesisError::Service {
                status: 500,
                message: format!("scripted failure for segment {}", segment.index),
            });
        }
        Ok(payload(self.segment_secs))
    }
}

/// Controller over a virtual output, with handles to both ends
pub struct TestNarrator {
    pub state: Arc<SharedState>,
    pub output: Arc<VirtualOutput>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub controller: Arc<SessionController>,
}

impl TestNarrator {
    pub fn new(synthesizer: ScriptedSynthesizer) -> Self {
        Self::with_settings(synthesizer, NarrationSettings::default())
    }

    pub fn with_settings(synthesizer: ScriptedSynthesizer, settings: NarrationSettings) -> Self {
        let state = Arc::new(SharedState::new());
        let output = Arc::new(VirtualOutput::new());
        let synthesizer = Arc::new(synthesizer);
        let controller = Arc::new(SessionController::new(
            Arc::clone(&state),
            OutputContext::with_output(output.clone()),
            synthesizer.clone(),
            settings,
        ));
        Self {
            state,
            output,
            synthesizer,
            controller,
        }
    }
}

/// "Frase número N." sentences, each long enough to be its own segment
pub fn numbered_text(count: usize) -> String {
    (1..=count)
        .map(|n| format!("Frase número {}.", n))
        .collect::<Vec<_>>()
        .join(" ")
}

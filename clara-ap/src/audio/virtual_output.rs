//! Clock-only audio output
//!
//! Keeps a wall clock based on `tokio::time::Instant`, so paused-time tests
//! advance it deterministically. Every scheduled source is recorded; when a
//! WAV path is configured the recorded schedule is rendered to disk on
//! `close()`. Used headless (no sound card) and throughout the tests.

use crate::audio::output::{AudioOutput, OutputStatus, ScheduledSource, SourceId};
use crate::audio::timeline::Timeline;
use crate::audio::types::{DecodedAudioBuffer, SYNTHESIS_SAMPLE_RATE};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the virtual output knows about one scheduled source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: SourceId,
    pub segment_index: usize,
    /// Clock time the source starts at
    pub start_at: f64,
    pub playback_rate: f32,
    /// Wall duration at `playback_rate`
    pub duration_secs: f64,
    /// Clock time `schedule()` was called
    pub scheduled_at: f64,
    /// Clock time `stop_source()` cut it short
    pub stopped_at: Option<f64>,
}

impl SourceRecord {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration_secs
    }

    /// Still audible, or waiting to become audible, at `time`
    pub fn is_live_at(&self, time: f64) -> bool {
        self.stopped_at.is_none() && time < self.end_at()
    }
}

struct Clock {
    origin: Instant,
    /// Total time spent suspended before the current suspension
    frozen: Duration,
    suspended_since: Option<Instant>,
}

impl Clock {
    fn now(&self) -> f64 {
        let now = Instant::now();
        let mut frozen = self.frozen;
        if let Some(since) = self.suspended_since {
            frozen += now.saturating_duration_since(since);
        }
        now.saturating_duration_since(self.origin)
            .saturating_sub(frozen)
            .as_secs_f64()
    }
}

struct VirtualState {
    clock: Clock,
    status: OutputStatus,
    fail_resume: bool,
    records: Vec<SourceRecord>,
    /// Buffers kept for WAV export, parallel to `records`
    buffers: Vec<Option<DecodedAudioBuffer>>,
    next_id: u64,
}

/// Output that plays nothing and keeps time
pub struct VirtualOutput {
    state: Mutex<VirtualState>,
    sample_rate: u32,
    wav_out: Option<PathBuf>,
}

impl Default for VirtualOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualOutput {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                clock: Clock {
                    origin: Instant::now(),
                    frozen: Duration::ZERO,
                    suspended_since: None,
                },
                status: OutputStatus::Running,
                fail_resume: false,
                records: Vec::new(),
                buffers: Vec::new(),
                next_id: 0,
            }),
            sample_rate: SYNTHESIS_SAMPLE_RATE,
            wav_out: None,
        }
    }

    /// Render the schedule to a 16-bit mono WAV file when closed
    pub fn with_wav_export(path: impl Into<PathBuf>) -> Self {
        Self {
            wav_out: Some(path.into()),
            ..Self::new()
        }
    }

    /// Freeze the clock, as a browser does with an idle audio context
    pub fn suspend(&self) {
        let mut state = self.state.lock();
        if state.status == OutputStatus::Running {
            state.clock.suspended_since = Some(Instant::now());
            state.status = OutputStatus::Suspended;
            debug!("Virtual output suspended");
        }
    }

    /// Make subsequent `resume()` calls fail
    pub fn set_resume_fails(&self, fails: bool) {
        self.state.lock().fail_resume = fails;
    }

    /// Every source scheduled so far, in scheduling order
    pub fn records(&self) -> Vec<SourceRecord> {
        self.state.lock().records.clone()
    }

    /// Segment indexes in scheduling order
    pub fn scheduled_segments(&self) -> Vec<usize> {
        self.state.lock().records.iter().map(|r| r.segment_index).collect()
    }

    /// Sources not stopped and not yet finished
    pub fn live_sources(&self) -> usize {
        let state = self.state.lock();
        let now = state.clock.now();
        state.records.iter().filter(|r| r.is_live_at(now)).count()
    }

    fn export_wav(&self, path: &Path, records: &[SourceRecord], buffers: Vec<Option<DecodedAudioBuffer>>) -> Result<()> {
        let mut timeline = Timeline::new(self.sample_rate);
        let mut end = 0.0f64;

        for (record, buffer) in records.iter().zip(buffers) {
            let Some(buffer) = buffer else { continue };
            let stop = record.stopped_at.unwrap_or(f64::INFINITY).min(record.end_at());
            if stop <= record.start_at {
                continue;
            }
            // Keep only the part that was audible before a stop
            let audible = ((stop - record.start_at) * record.playback_rate as f64 * buffer.sample_rate() as f64)
                .ceil() as usize;
            let rate = buffer.sample_rate();
            let mut samples = buffer.into_samples();
            samples.truncate(audible);

            end = end.max(stop);
            timeline.add(ScheduledSource {
                segment_index: record.segment_index,
                buffer: DecodedAudioBuffer::new(samples, rate),
                start_at: record.start_at,
                playback_rate: record.playback_rate,
            });
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| Error::AudioOutput(format!("Failed to create {}: {}", path.display(), e)))?;

        let total_frames = (end * self.sample_rate as f64).ceil() as u64;
        let mut block = vec![0.0f32; 1024];
        let mut written = 0u64;
        while written < total_frames {
            let frames = (total_frames - written).min(block.len() as u64) as usize;
            timeline.render(&mut block[..frames], 1);
            for &sample in &block[..frames] {
                writer
                    .write_sample(crate::audio::types::quantize(sample))
                    .map_err(|e| Error::AudioOutput(format!("Failed to write WAV sample: {}", e)))?;
            }
            written += frames as u64;
        }

        writer
            .finalize()
            .map_err(|e| Error::AudioOutput(format!("Failed to finalize WAV: {}", e)))?;
        info!(path = %path.display(), seconds = end, "Narration exported to WAV");
        Ok(())
    }
}

impl AudioOutput for VirtualOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().clock.now()
    }

    fn status(&self) -> OutputStatus {
        self.state.lock().status
    }

    fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.status {
            OutputStatus::Running => Ok(()),
            OutputStatus::Closed => Err(Error::AudioOutput("Output is closed".to_string())),
            OutputStatus::Suspended if state.fail_resume => {
                warn!("Virtual output refused to resume");
                Err(Error::AudioOutput("Output could not be resumed".to_string()))
            }
            OutputStatus::Suspended => {
                if let Some(since) = state.clock.suspended_since.take() {
                    state.clock.frozen += Instant::now().saturating_duration_since(since);
                }
                state.status = OutputStatus::Running;
                debug!("Virtual output resumed");
                Ok(())
            }
        }
    }

    fn schedule(&self, source: ScheduledSource) -> Result<SourceId> {
        let mut state = self.state.lock();
        if state.status == OutputStatus::Closed {
            return Err(Error::AudioOutput("Output is closed".to_string()));
        }

        let id = SourceId(state.next_id);
        state.next_id += 1;
        let now = state.clock.now();
        state.records.push(SourceRecord {
            id,
            segment_index: source.segment_index,
            start_at: source.start_at.max(now),
            playback_rate: source.playback_rate,
            duration_secs: source.buffer.duration_at(source.playback_rate),
            scheduled_at: now,
            stopped_at: None,
        });
        let keep = self.wav_out.is_some().then_some(source.buffer);
        state.buffers.push(keep);
        Ok(id)
    }

    fn stop_source(&self, id: SourceId) -> Result<()> {
        let mut state = self.state.lock();
        let now = state.clock.now();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::AudioOutput(format!("Unknown source {:?}", id)))?;

        if !record.is_live_at(now) {
            return Err(Error::AudioOutput(format!("Source {:?} already finished", id)));
        }
        record.stopped_at = Some(now);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let (records, buffers) = {
            let mut state = self.state.lock();
            if state.status == OutputStatus::Closed {
                return Ok(());
            }
            state.status = OutputStatus::Closed;
            (state.records.clone(), std::mem::take(&mut state.buffers))
        };

        match &self.wav_out {
            Some(path) => self.export_wav(path, &records, buffers),
            None => Ok(()),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

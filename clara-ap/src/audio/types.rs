//! Audio data types
//!
//! Payloads as they arrive from the synthesis service and the decoded
//! buffers that travel through the prefetch queue to the output.

/// Sample rate of every synthesized speech payload (Hz)
pub const SYNTHESIS_SAMPLE_RATE: u32 = 24_000;

/// Sample rate of microphone PCM sent to the live voice service (Hz)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Base64 text carrying signed 16-bit little-endian mono PCM
///
/// The engine treats the content as opaque until it reaches the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioPayload(String);

impl EncodedAudioPayload {
    pub fn new(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for EncodedAudioPayload {
    fn from(data: String) -> Self {
        Self(data)
    }
}

/// Mono f32 samples in [-1.0, 1.0] plus their sample rate
///
/// Owned by exactly one pipeline stage at a time: the decoder creates it,
/// the prefetch queue holds it, the scheduler moves it into the output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedAudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration at normal speed, in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Wall duration when played at `playback_rate`
    pub fn duration_at(&self, playback_rate: f32) -> f64 {
        self.duration_secs() / playback_rate as f64
    }

    /// Re-quantize to signed 16-bit little-endian PCM
    pub fn to_pcm16_le(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &sample in &self.samples {
            bytes.extend_from_slice(&quantize(sample).to_le_bytes());
        }
        bytes
    }
}

/// Scale a normalized sample to i16, saturating at the positive edge
pub(crate) fn quantize(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

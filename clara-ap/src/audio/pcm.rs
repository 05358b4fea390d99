//! PCM16 payload decoding
//!
//! Synthesized speech arrives as base64 text holding signed 16-bit
//! little-endian mono samples at 24 kHz. Decoding is a pure transform:
//! base64 to bytes, bytes to i16, i16 to f32 by dividing by 32768.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::trace;

use super::types::{DecodedAudioBuffer, EncodedAudioPayload, SYNTHESIS_SAMPLE_RATE};

/// Payload decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),

    /// Fewer than two bytes after decoding
    #[error("payload contains no complete 16-bit samples")]
    Empty,
}

/// Decode a synthesized speech payload at the fixed synthesis rate
pub fn decode(payload: &EncodedAudioPayload) -> Result<DecodedAudioBuffer, DecodeError> {
    decode_with_rate(payload, SYNTHESIS_SAMPLE_RATE)
}

/// Decode a PCM16 payload recorded at `sample_rate`
///
/// Whitespace anywhere in the payload is ignored. An odd trailing byte is
/// an incomplete sample and is dropped.
pub fn decode_with_rate(
    payload: &EncodedAudioPayload,
    sample_rate: u32,
) -> Result<DecodedAudioBuffer, DecodeError> {
    let bytes = decode_base64(payload.as_str())?;

    if bytes.len() % 2 != 0 {
        trace!(bytes = bytes.len(), "Dropping incomplete trailing sample");
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedAudioBuffer::new(samples, sample_rate))
}

/// Re-encode a buffer as a base64 PCM16 payload
pub fn encode(buffer: &DecodedAudioBuffer) -> EncodedAudioPayload {
    EncodedAudioPayload::new(STANDARD.encode(buffer.to_pcm16_le()))
}

/// Encode raw capture samples (e.g. microphone input at 16 kHz) as a payload
pub fn encode_samples(samples: &[f32]) -> EncodedAudioPayload {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&super::types::quantize(sample).to_le_bytes());
    }
    EncodedAudioPayload::new(STANDARD.encode(bytes))
}

fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    let result = if text.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(text)
    };
    result.map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

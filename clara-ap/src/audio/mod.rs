//! Audio data, decoding and outputs
//!
//! - `types`: payloads and decoded buffers
//! - `pcm`: base64 PCM16 decoding and re-encoding
//! - `output`: the output trait and the lazily acquired output context
//! - `timeline`: mixing core shared by the outputs
//! - `device`: cpal sound card output
//! - `virtual_output`: clock-only output with optional WAV export

pub mod device;
pub mod output;
pub mod pcm;
pub mod timeline;
pub mod types;
pub mod virtual_output;

pub use output::{AudioOutput, OutputContext, OutputStatus, ScheduledSource, SourceId};
pub use types::{DecodedAudioBuffer, EncodedAudioPayload, CAPTURE_SAMPLE_RATE, SYNTHESIS_SAMPLE_RATE};
pub use virtual_output::VirtualOutput;

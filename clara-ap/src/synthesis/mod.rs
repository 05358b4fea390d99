//! Remote model collaborators
//!
//! The narration engine only depends on [`SpeechSynthesizer`]. Document
//! transcription sits behind [`TextExtractor`], and the reading helpers of
//! the other modes behind [`DocumentAssistant`]. [`gemini::GeminiClient`]
//! implements all three against the Gemini REST API.

pub mod gemini;

use crate::audio::types::EncodedAudioPayload;
use crate::narration::segmenter::TextSegment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;

/// Failures of a remote model call
///
/// Every variant is recoverable from the engine's point of view: a failed
/// segment is skipped and narration moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP 429
    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Service error {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response contained no audio")]
    EmptyAudio,

    #[error("No legible text could be extracted; try a clearer image or an unprotected PDF")]
    NoLegibleText,

    #[error("No API key configured")]
    MissingApiKey,
}

/// Turns one text segment into encoded speech
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, segment: &TextSegment) -> Result<EncodedAudioPayload, SynthesisError>;
}

/// Transcribes the text of an uploaded document
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, data: &[u8], mime_type: &str) -> Result<String, SynthesisError>;
}

/// One panel of the comic-strip view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicScene {
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Reading helpers built on a text model
///
/// One-shot calls without retries. Unusable model output degrades to a
/// friendly fallback where one exists.
#[async_trait]
pub trait DocumentAssistant: TextExtractor {
    async fn suggest_questions(&self, text: &str) -> Result<Vec<String>, SynthesisError>;

    async fn simple_summary(&self, text: &str) -> Result<Vec<String>, SynthesisError>;

    async fn comic_scenes(&self, text: &str) -> Result<Vec<ComicScene>, SynthesisError>;

    async fn chat(&self, document: &str, message: &str) -> Result<String, SynthesisError>;

    async fn video_prompt(&self, text: &str) -> Result<String, SynthesisError>;
}

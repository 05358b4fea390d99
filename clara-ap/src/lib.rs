//! # Claramente Audio Narration Library (clara-ap)
//!
//! Streaming narration engine for the Claramente reading companion.
//!
//! **Purpose:** Split text into sentences, synthesize them ahead of playback
//! through a remote speech model, and play the decoded audio gaplessly at an
//! adjustable speed. An HTTP/SSE surface exposes narration control and the
//! document helpers (transcription, questions, summaries, comic scenes).
//!
//! **Architecture:** producer/scheduler task pair per session over a bounded
//! prefetch queue, cpal or virtual output, Gemini REST client.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod narration;
pub mod state;
pub mod synthesis;

pub use error::{Error, Result};
pub use state::SharedState;

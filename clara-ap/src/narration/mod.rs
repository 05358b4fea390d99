//! Narration engine
//!
//! Text is split into segments, a producer task synthesizes and decodes
//! them ahead of playback into a bounded queue, and a scheduler task places
//! the decoded buffers back to back on the audio output. The
//! [`SessionController`] owns the lifecycle.

pub mod controller;
pub mod prefetch;
pub mod scheduler;
pub mod segmenter;
pub mod session;

pub use controller::{SessionController, StartedNarration};
pub use prefetch::{PrefetchQueue, Prefetched, QueueCursors};
pub use segmenter::{SegmentError, Segmenter, Segments, TextSegment};
pub use session::{NarrationStatus, PlaybackSession};

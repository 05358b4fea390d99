//! HTTP control surface
//!
//! Narration control, the document helpers and an SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};

//! # Claramente Common Library
//!
//! Shared code for the Claramente reading companion services:
//! - Event types (ClaraEvent enum) and the broadcast EventBus
//! - Narration session state shared by the engine and its observers
//! - Bootstrap configuration file resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};

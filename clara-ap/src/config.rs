//! Configuration for clara-ap
//!
//! Bootstrap configuration is a TOML file (see `clara_common::config` for
//! how the file is located). Every value has a built-in default, so the
//! service runs without any file at all.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --api-key, --output, --wav-out)
//! 2. Environment variables (CLARA_AP_PORT, GEMINI_API_KEY, ...)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Slowest allowed narration speed
pub const MIN_SPEED: f32 = 0.5;
/// Fastest allowed narration speed
pub const MAX_SPEED: f32 = 1.8;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub narration: NarrationConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            gemini: GeminiConfig::default(),
            audio: AudioConfig::default(),
            narration: NarrationConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Locate and load the bootstrap file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = clara_common::config::resolve_config_path(cli_path, "CLARA_CONFIG");
        let config: TomlConfig = clara_common::config::load_toml_config(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let n = &self.narration;
        if n.queue_capacity == 0 {
            return Err(Error::Config("narration.queue_capacity must be at least 1".into()));
        }
        if n.producer_poll_ms == 0 || n.scheduler_poll_ms == 0 {
            return Err(Error::Config("narration poll intervals must be positive".into()));
        }
        if n.min_segment_chars == 0 {
            return Err(Error::Config("narration.min_segment_chars must be at least 1".into()));
        }
        if !n.default_speed.is_finite() {
            return Err(Error::Config("narration.default_speed must be a number".into()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Remote model client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    /// API key (GEMINI_API_KEY overrides)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for speech synthesis
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Model used for transcription and text generation
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Prebuilt voice name
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Instruction prepended to every spoken segment
    #[serde(default = "default_speech_prompt")]
    pub speech_prompt: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            tts_model: default_tts_model(),
            text_model: default_text_model(),
            voice: default_voice(),
            speech_prompt: default_speech_prompt(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which output backend plays narration
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// Sound card via cpal
    #[default]
    Device,
    /// Clock-only output, optionally exported to WAV
    Virtual,
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AudioConfig {
    #[serde(default)]
    pub output: OutputBackend,

    /// Output device name (None = default device)
    #[serde(default)]
    pub device: Option<String>,

    /// Where the virtual output writes its rendering when released
    #[serde(default)]
    pub wav_out: Option<PathBuf>,
}

/// Narration engine tuning
#[derive(Debug, Clone, Deserialize)]
pub struct NarrationConfig {
    /// Decoded buffers held ahead of playback
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on a producer wait for queue space
    #[serde(default = "default_producer_poll_ms")]
    pub producer_poll_ms: u64,

    /// Upper bound on a scheduler wait for the next buffer
    #[serde(default = "default_scheduler_poll_ms")]
    pub scheduler_poll_ms: u64,

    /// How early the scheduler wakes before the current buffer ends
    #[serde(default = "default_splice_overlap_ms")]
    pub splice_overlap_ms: u64,

    /// Shortest segment worth synthesizing (characters, after trimming)
    #[serde(default = "default_min_segment_chars")]
    pub min_segment_chars: usize,

    #[serde(default = "default_speed")]
    pub default_speed: f32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            producer_poll_ms: default_producer_poll_ms(),
            scheduler_poll_ms: default_scheduler_poll_ms(),
            splice_overlap_ms: default_splice_overlap_ms(),
            min_segment_chars: default_min_segment_chars(),
            default_speed: default_speed(),
        }
    }
}

/// Narration engine settings in runtime form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NarrationSettings {
    pub queue_capacity: usize,
    pub producer_poll: Duration,
    pub scheduler_poll: Duration,
    pub splice_overlap: Duration,
    pub min_segment_chars: usize,
    pub default_speed: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        NarrationSettings::from(&NarrationConfig::default())
    }
}

impl From<&NarrationConfig> for NarrationSettings {
    fn from(config: &NarrationConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            producer_poll: Duration::from_millis(config.producer_poll_ms),
            scheduler_poll: Duration::from_millis(config.scheduler_poll_ms),
            splice_overlap: Duration::from_millis(config.splice_overlap_ms),
            min_segment_chars: config.min_segment_chars.max(1),
            default_speed: clamp_speed(config.default_speed),
        }
    }
}

/// Clamp a finite speed multiplier into the supported range
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

fn default_port() -> u16 {
    5810
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_text_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_voice() -> String {
    "Kore".to_string()
}

fn default_speech_prompt() -> String {
    "Lee con voz clara y amigable: ".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    3
}

fn default_producer_poll_ms() -> u64 {
    400
}

fn default_scheduler_poll_ms() -> u64 {
    200
}

fn default_splice_overlap_ms() -> u64 {
    30
}

fn default_min_segment_chars() -> usize {
    4
}

fn default_speed() -> f32 {
    1.0
}

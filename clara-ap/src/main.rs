//! Claramente narration service (clara-ap) - Main entry point
//!
//! Hosts the narration engine behind an HTTP/SSE control surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clara_ap::api::{self, AppContext};
use clara_ap::audio::device::DeviceOutput;
use clara_ap::audio::{AudioOutput, OutputContext, VirtualOutput};
use clara_ap::config::{NarrationSettings, OutputBackend, TomlConfig};
use clara_ap::narration::SessionController;
use clara_ap::synthesis::GeminiClient;
use clara_ap::SharedState;
use clara_common::config::resolve_setting;

/// Command-line arguments for clara-ap
#[derive(Parser, Debug)]
#[command(name = "clara-ap")]
#[command(about = "Audio narration service for Claramente")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "CLARA_AP_PORT")]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "CLARA_CONFIG")]
    config: Option<PathBuf>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Audio output backend
    #[arg(long, value_enum, env = "CLARA_OUTPUT")]
    output: Option<OutputBackend>,

    /// Output device name (device backend only)
    #[arg(long, env = "CLARA_AUDIO_DEVICE")]
    device: Option<String>,

    /// Write everything the virtual output played to this WAV file on shutdown
    #[arg(long)]
    wav_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let default_filter = format!("clara_ap={},tower_http={}", config.logging.level, config.logging.level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.unwrap_or(config.port);
    let backend = args.output.unwrap_or(config.audio.output);
    let device = args.device.or_else(|| config.audio.device.clone());
    let wav_out = args.wav_out.or_else(|| config.audio.wav_out.clone());
    // Blank values count as unset
    let api_key = resolve_setting(args.api_key.as_deref(), "GEMINI_API_KEY", config.gemini.api_key.as_deref());

    info!("Starting Claramente narration service on port {}", port);
    info!(
        "Build: {} ({}, {})",
        env!("CLARA_GIT_HASH"),
        env!("CLARA_BUILD_PROFILE"),
        env!("CLARA_BUILD_TIMESTAMP")
    );
    if api_key.is_none() {
        warn!("No Gemini API key configured; synthesis and document helpers will fail");
    }

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone(), api_key).context("Failed to build Gemini client")?);

    let output = match backend {
        OutputBackend::Device => {
            info!("Audio output: device {}", device.as_deref().unwrap_or("(default)"));
            OutputContext::new(move || {
                let output: Arc<dyn AudioOutput> = Arc::new(DeviceOutput::open(device.clone())?);
                Ok(output)
            })
        }
        OutputBackend::Virtual => {
            info!("Audio output: virtual");
            OutputContext::new(move || {
                let output = match &wav_out {
                    Some(path) => VirtualOutput::with_wav_export(path.clone()),
                    None => VirtualOutput::new(),
                };
                let output: Arc<dyn AudioOutput> = Arc::new(output);
                Ok(output)
            })
        }
    };

    let state = Arc::new(SharedState::new());
    let controller = Arc::new(SessionController::new(
        Arc::clone(&state),
        output,
        gemini.clone(),
        NarrationSettings::from(&config.narration),
    ));

    let ctx = AppContext {
        state,
        controller: Arc::clone(&controller),
        documents: gemini,
    };

    api::run(port, ctx, shutdown_signal()).await.context("HTTP server failed")?;

    controller.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

//! HTTP server setup and routing
//!
//! Sets up the Axum router for narration control, document helpers and SSE.

use crate::error::{Error, Result};
use crate::narration::SessionController;
use crate::state::SharedState;
use crate::synthesis::DocumentAssistant;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub controller: Arc<SessionController>,
    pub documents: Arc<dyn DocumentAssistant>,
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                .route("/audio/devices", get(super::handlers::list_audio_devices))
                // Narration control
                .route("/narration", post(super::handlers::start_narration))
                .route("/narration/stop", post(super::handlers::stop_narration))
                .route("/narration/speed", post(super::handlers::set_speed))
                .route("/narration/status", get(super::handlers::narration_status))
                // Document helpers
                .route("/documents/extract", post(super::handlers::extract_text))
                .route("/documents/questions", post(super::handlers::suggest_questions))
                .route("/documents/summary", post(super::handlers::simple_summary))
                .route("/documents/scenes", post(super::handlers::comic_scenes))
                .route("/documents/chat", post(super::handlers::chat))
                .route("/documents/video-prompt", post(super::handlers::video_prompt))
                // SSE event stream
                .route("/events", get(super::sse::event_stream)),
        )
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(port: u16, ctx: AppContext, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}

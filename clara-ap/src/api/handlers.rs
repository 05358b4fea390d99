//! HTTP request handlers

use crate::api::server::AppContext;
use crate::audio::device::DeviceOutput;
use crate::error::Error;
use crate::narration::NarrationStatus;
use crate::synthesis::{ComicScene, DocumentAssistant, SynthesisError, TextExtractor};
use axum::{extract::State, http::StatusCode, Json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clara_common::events::NarrationMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
    uptime_secs: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartNarrationRequest {
    text: String,
    #[serde(default)]
    mode: NarrationMode,
    #[serde(default)]
    speed: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct StartNarrationResponse {
    session_id: Uuid,
    segment_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    speed: f32,
}

#[derive(Debug, Serialize)]
pub struct SpeedResponse {
    speed: f32,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    data_base64: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    text: String,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    points: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ScenesResponse {
    scenes: Vec<ComicScene>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    reply: String,
}

#[derive(Debug, Serialize)]
pub struct VideoPromptResponse {
    prompt: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message.into() }))
}

fn synthesis_status(e: &SynthesisError) -> StatusCode {
    match e {
        SynthesisError::NoLegibleText => StatusCode::UNPROCESSABLE_ENTITY,
        SynthesisError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
        SynthesisError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// Map a service error to its HTTP status
fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::Segment(_) | Error::BadRequest(_) | Error::Decode(_) => StatusCode::BAD_REQUEST,
        Error::OutputUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::Synthesis(e) => synthesis_status(e),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for (StatusCode, Json<ErrorResponse>) {
    fn from(e: Error) -> Self {
        let status = error_status(&e);
        if status.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            warn!("Request rejected: {}", e);
        }
        (status, Json(ErrorResponse { error: e.to_string() }))
    }
}

fn require_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    Ok(())
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let uptime = chrono::Utc::now() - ctx.state.started_at();
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "clara-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("CLARA_GIT_HASH").to_string(),
        build_timestamp: env!("CLARA_BUILD_TIMESTAMP").to_string(),
        build_profile: env!("CLARA_BUILD_PROFILE").to_string(),
        uptime_secs: uptime.num_seconds(),
    })
}

// ============================================================================
// Audio Device Endpoints
// ============================================================================

/// GET /api/v1/audio/devices - List sound card outputs
pub async fn list_audio_devices() -> ApiResult<DeviceListResponse> {
    let devices = tokio::task::spawn_blocking(DeviceOutput::list_devices)
        .await
        .map_err(|e| Error::Internal(format!("device enumeration task failed: {}", e)))??;
    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse { devices }))
}

// ============================================================================
// Narration Endpoints
// ============================================================================

/// POST /api/v1/narration - Start narrating, replacing any running narration
pub async fn start_narration(
    State(ctx): State<AppContext>,
    Json(req): Json<StartNarrationRequest>,
) -> ApiResult<StartNarrationResponse> {
    // Opening the sound card blocks until the device thread answers
    let controller = Arc::clone(&ctx.controller);
    let started = tokio::task::spawn_blocking(move || controller.start_with_speed(&req.text, req.mode, req.speed))
        .await
        .map_err(|e| Error::Internal(format!("narration start task failed: {}", e)))??;
    info!(session_id = %started.session_id, segment_count = started.segment_count, "Narration requested");

    Ok(Json(StartNarrationResponse {
        session_id: started.session_id,
        segment_count: started.segment_count,
    }))
}

/// POST /api/v1/narration/stop
pub async fn stop_narration(State(ctx): State<AppContext>) -> Json<NarrationStatus> {
    Json(ctx.controller.stop())
}

/// POST /api/v1/narration/speed
pub async fn set_speed(State(ctx): State<AppContext>, Json(req): Json<SpeedRequest>) -> ApiResult<SpeedResponse> {
    let speed = ctx.controller.set_speed(req.speed)?;
    Ok(Json(SpeedResponse { speed }))
}

/// GET /api/v1/narration/status
pub async fn narration_status(State(ctx): State<AppContext>) -> Json<NarrationStatus> {
    Json(ctx.controller.status())
}

// ============================================================================
// Document Endpoints
// ============================================================================

/// POST /api/v1/documents/extract - Transcribe an uploaded image or PDF
pub async fn extract_text(State(ctx): State<AppContext>, Json(req): Json<ExtractRequest>) -> ApiResult<ExtractResponse> {
    let data = STANDARD
        .decode(req.data_base64.trim())
        .map_err(|e| bad_request(format!("data_base64 is not valid base64: {}", e)))?;
    if data.is_empty() {
        return Err(bad_request("uploaded file is empty"));
    }

    let text = ctx
        .documents
        .extract_text(&data, &req.mime_type)
        .await
        .map_err(Error::from)?;
    Ok(Json(ExtractResponse { text }))
}

/// POST /api/v1/documents/questions
pub async fn suggest_questions(
    State(ctx): State<AppContext>,
    Json(req): Json<DocumentRequest>,
) -> ApiResult<QuestionsResponse> {
    require_text(&req.text)?;
    let questions = ctx.documents.suggest_questions(&req.text).await.map_err(Error::from)?;
    Ok(Json(QuestionsResponse { questions }))
}

/// POST /api/v1/documents/summary
pub async fn simple_summary(State(ctx): State<AppContext>, Json(req): Json<DocumentRequest>) -> ApiResult<SummaryResponse> {
    require_text(&req.text)?;
    let points = ctx.documents.simple_summary(&req.text).await.map_err(Error::from)?;
    Ok(Json(SummaryResponse { points }))
}

/// POST /api/v1/documents/scenes
pub async fn comic_scenes(State(ctx): State<AppContext>, Json(req): Json<DocumentRequest>) -> ApiResult<ScenesResponse> {
    require_text(&req.text)?;
    let scenes = ctx.documents.comic_scenes(&req.text).await.map_err(Error::from)?;
    Ok(Json(ScenesResponse { scenes }))
}

/// POST /api/v1/documents/chat
pub async fn chat(State(ctx): State<AppContext>, Json(req): Json<ChatRequest>) -> ApiResult<ChatResponse> {
    require_text(&req.text)?;
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }
    let reply = ctx.documents.chat(&req.text, &req.message).await.map_err(Error::from)?;
    Ok(Json(ChatResponse { reply }))
}

/// POST /api/v1/documents/video-prompt
pub async fn video_prompt(State(ctx): State<AppContext>, Json(req): Json<DocumentRequest>) -> ApiResult<VideoPromptResponse> {
    require_text(&req.text)?;
    let prompt = ctx.documents.video_prompt(&req.text).await.map_err(Error::from)?;
    Ok(Json(VideoPromptResponse { prompt }))
}

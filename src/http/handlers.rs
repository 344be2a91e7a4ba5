use super::state::AppState;
use crate::recording::{
    CallMetadata, ChunkPayload, RecordingStatus, SessionState, StopReason, Track,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartRecordingRequest {
    /// Free-form call attributes copied into the metadata artifact
    #[serde(default)]
    pub metadata: CallMetadata,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub call_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioChunkRequest {
    pub track: Track,

    /// Base64 μ-law bytes, as delivered by the telephony media stream
    pub payload: String,

    /// Milliseconds; defaults to arrival time
    pub timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub provider: String,
    pub employee: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopRecordingRequest {
    /// Defaults to `call_ended`
    pub reason: Option<StopReason>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_found(call_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("No recording for call {}", call_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recordings/:call_id/start
/// Start recording a call
pub async fn start_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    if !state.manager.is_enabled() {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Recording is disabled".to_string(),
        );
    }

    if !state.manager.start_recording(&call_id, req.metadata).await {
        return error_response(
            StatusCode::CONFLICT,
            format!("Call {} is already recording", call_id),
        );
    }

    (
        StatusCode::OK,
        Json(StartRecordingResponse {
            call_id,
            status: "recording".to_string(),
        }),
    )
        .into_response()
}

/// POST /recordings/:call_id/audio
/// Feed one chunk of audio
pub async fn add_audio(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<AudioChunkRequest>,
) -> impl IntoResponse {
    let accepted = state
        .manager
        .add_audio_chunk(
            &call_id,
            ChunkPayload::Base64(req.payload),
            req.track,
            req.timestamp,
        )
        .await;

    if accepted {
        return StatusCode::ACCEPTED.into_response();
    }

    match state.manager.get_recording_status(&call_id).await {
        None => not_found(&call_id),
        Some(status) if status.state == SessionState::Stopped => error_response(
            StatusCode::CONFLICT,
            format!("Recording for call {} has stopped", call_id),
        ),
        Some(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Audio chunk for call {} was rejected", call_id),
        ),
    }
}

/// POST /recordings/:call_id/auth
/// Bind provider and employee to a call
pub async fn update_auth(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<AuthRequest>,
) -> impl IntoResponse {
    if state
        .manager
        .update_call_auth(&call_id, &req.provider, &req.employee)
        .await
    {
        match state.manager.get_recording_status(&call_id).await {
            Some(status) => (StatusCode::OK, Json(status)).into_response(),
            None => not_found(&call_id),
        }
    } else {
        not_found(&call_id)
    }
}

/// POST /recordings/:call_id/stop
/// Stop a recording and upload its artifacts
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    body: Option<Json<StopRecordingRequest>>,
) -> impl IntoResponse {
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or(StopReason::CallEnded);
    info!("Stop requested for call {} ({})", call_id, reason);

    match state
        .manager
        .stop_recording_with_report(&call_id, reason)
        .await
    {
        Some(report) => {
            let failed = report.failed_uploads().count();
            if failed > 0 {
                warn!("{} upload(s) failed for call {}", failed, call_id);
            }
            (StatusCode::OK, Json(report)).into_response()
        }
        None => match state.manager.get_recording_status(&call_id).await {
            Some(_) => error_response(
                StatusCode::CONFLICT,
                format!("Recording for call {} is already stopping", call_id),
            ),
            None => not_found(&call_id),
        },
    }
}

/// GET /recordings/:call_id/status
/// Get status of one recording
pub async fn get_recording_status(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.get_recording_status(&call_id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => not_found(&call_id),
    }
}

/// GET /recordings
/// List active recordings
pub async fn list_recordings(State(state): State<AppState>) -> impl IntoResponse {
    let recordings: Vec<RecordingStatus> = state.manager.get_active_recordings().await;
    (StatusCode::OK, Json(recordings))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

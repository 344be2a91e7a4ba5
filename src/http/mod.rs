//! HTTP API for the call-control layer
//!
//! This module exposes the recording manager over REST:
//! - GET /recordings - Active recordings
//! - POST /recordings/:call_id/start - Start recording a call
//! - POST /recordings/:call_id/audio - Feed one audio chunk
//! - POST /recordings/:call_id/auth - Bind provider/employee
//! - POST /recordings/:call_id/stop - Stop and upload
//! - GET /recordings/:call_id/status - Query one recording
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{AudioChunkRequest, AuthRequest, ErrorResponse, StopRecordingRequest};
pub use routes::create_router;
pub use state::AppState;

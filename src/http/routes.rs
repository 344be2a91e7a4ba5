use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/recordings", get(handlers::list_recordings))
        .route(
            "/recordings/:call_id/start",
            post(handlers::start_recording),
        )
        .route("/recordings/:call_id/audio", post(handlers::add_audio))
        .route("/recordings/:call_id/auth", post(handlers::update_auth))
        .route("/recordings/:call_id/stop", post(handlers::stop_recording))
        // Recording queries
        .route(
            "/recordings/:call_id/status",
            get(handlers::get_recording_status),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use crate::recording::RecordingManager;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Owns the active recordings (call_id → session)
    pub manager: RecordingManager,
}

impl AppState {
    pub fn new(manager: RecordingManager) -> Self {
        Self { manager }
    }
}

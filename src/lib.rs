pub mod audio;
pub mod config;
pub mod http;
pub mod recording;
pub mod storage;

pub use audio::{VadState, VoiceActivity};
pub use config::Config;
pub use http::{create_router, AppState};
pub use recording::{
    CallMetadata, ChunkPayload, RecordingConfig, RecordingManager, StopReason, Track,
};
pub use storage::{FsObjectStore, MemoryObjectStore, ObjectStore, OutputKeys};

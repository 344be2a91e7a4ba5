//! Per-call recording: buffering, track alignment, conversation analytics
//! and the session lifecycle that ends in an upload.
//!
//! Layout:
//! - `buffer`: byte-bounded segment buffer for one track
//! - `track`: inbound/outbound/mixed buffers of one call
//! - `conversation`: speaker turns, interruptions, dominant speaker
//! - `session`: one call from start to finalized artifacts
//! - `manager`: session table and concurrent uploads

pub mod buffer;
pub mod config;
pub mod conversation;
pub mod manager;
pub mod session;
pub mod stats;
pub mod track;

pub use buffer::{BufferConfig, ChunkPayload, Segment, StreamBuffer};
pub use config::RecordingConfig;
pub use conversation::{
    ConversationAnalyzer, ConversationConfig, ConversationSegment, DominantSpeaker, Speaker,
};
pub use manager::{RecordingManager, StopReport, UploadOutcome};
pub use session::{
    Artifact, AuthBinding, CallMetadata, ChunkOutcome, FinalRecording, RecordingSession,
    SessionState, StopReason,
};
pub use stats::{
    ConversationMetrics, RecordingMetadata, RecordingStatus, StreamBufferStats, TrackStats,
};
pub use track::{Track, TrackManager};

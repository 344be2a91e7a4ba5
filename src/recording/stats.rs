use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conversation::DominantSpeaker;
use super::session::{CallMetadata, SessionState, StopReason};
use super::track::Track;
use crate::audio::vad::VadState;

/// Counters for one track's stream buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamBufferStats {
    pub track: Track,

    /// Whether VAD runs on this track's chunks
    pub vad_enabled: bool,

    /// Bytes waiting in the accumulator
    pub buffered_bytes: usize,

    /// Bytes held in retained segments
    pub retained_bytes: usize,

    /// Retained segments
    pub segment_count: usize,

    /// Bytes ever accepted
    pub total_bytes: u64,

    /// Chunks ever accepted
    pub total_chunks: u64,

    pub flush_count: u64,

    /// Segments dropped by compaction
    pub compacted_segments: u64,

    /// Bytes dropped by compaction
    pub compacted_bytes: u64,

    /// Chunks refused (undecodable or buffer full)
    pub rejected_chunks: u64,

    pub vad: VadState,
}

/// Turn-taking summary for a call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetrics {
    pub total_segments: usize,
    pub caller_segments: usize,
    pub system_segments: usize,
    pub caller_speaking_time_ms: u64,
    pub system_speaking_time_ms: u64,
    pub total_speaking_time_ms: u64,
    pub caller_speaking_percentage: f64,
    pub system_speaking_percentage: f64,
    pub average_segment_duration_ms: f64,
    pub longest_segment_duration_ms: u64,
    pub interruptions: u64,
    /// Interruptions per minute of detected speech
    pub interruptions_per_minute: f64,
    pub dominant_speaker: DominantSpeaker,
}

/// Everything a track manager knows about its call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub tracks: Vec<StreamBufferStats>,

    /// Outbound first-frame timestamp minus inbound first-frame timestamp
    pub sync_offset_ms: Option<i64>,

    pub conversation: ConversationMetrics,
}

/// Read-only snapshot of a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub call_id: String,
    pub recording_id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_bytes: u64,
    pub chunk_count: u64,
    pub authenticated: bool,
    pub provider: Option<String>,
    pub employee: Option<String>,
    pub stop_reason: Option<StopReason>,
}

/// Document uploaded as `metadata.json` when a recording ends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub call_id: String,
    pub recording_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub provider: String,
    pub employee: String,
    pub authenticated: bool,
    pub sample_rate: u32,
    /// Size of the mixed recording container in bytes
    pub file_size: usize,
    pub total_bytes: u64,
    pub chunk_count: u64,
    pub stop_reason: StopReason,
    pub call_metadata: CallMetadata,
    pub track_stats: TrackStats,
    pub conversation_metrics: ConversationMetrics,
}

use serde::{Deserialize, Serialize};

use crate::audio::codec::DEFAULT_SAMPLE_RATE;

/// Configuration shared by every recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Master switch; when false `start_recording` refuses every call
    pub enabled: bool,

    /// Sample rate of the inbound telephony leg (μ-law, one byte per sample)
    pub sample_rate: u32,

    /// Hard ceiling per call; total received bytes beyond
    /// `max_duration_seconds * sample_rate` force-stop the recording
    pub max_duration_seconds: u64,

    /// Accumulator size that seals the current buffer into a segment
    pub flush_threshold_bytes: usize,

    /// Age of the accumulator that seals it into a segment regardless of size
    pub segment_duration_ms: u64,

    /// Segments kept in memory per track. Older segments are compacted
    /// (dropped) and counted in the track stats. Compacted audio is lost.
    /// 0 keeps every segment.
    pub segment_retention_count: usize,

    /// Upper bound for a single track's accumulator; chunks that would
    /// exceed it are rejected
    pub max_buffer_bytes: usize,

    /// Inbound/outbound first-frame drift that gets logged
    pub track_sync_tolerance_ms: u64,

    /// Mirror inbound and outbound chunks into a dedicated mixed track
    pub enable_mixdown: bool,

    /// Run dynamic range compression over each segment at flush time
    pub enable_compression: bool,

    /// How recently the other party must have spoken for a turn start to
    /// count as an interruption
    pub interruption_window_ms: u64,

    /// Largest gap that still extends a speaker's current conversation segment
    pub segment_merge_gap_ms: u64,

    /// Minimum samples needed to classify a chunk
    pub vad_window_size: usize,

    /// Conversation segments retained before pruning
    pub max_conversation_segments: usize,

    /// Conversation segments kept after pruning
    pub conversation_prune_to: usize,

    /// Peak level (fraction of full scale) for normalized WAV output
    pub normalize_level: f32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_duration_seconds: 3600, // 1 hour
            flush_threshold_bytes: 64 * 1024,
            segment_duration_ms: 30_000,
            segment_retention_count: 120,
            max_buffer_bytes: 1024 * 1024,
            track_sync_tolerance_ms: 100,
            enable_mixdown: false,
            enable_compression: false,
            interruption_window_ms: 500,
            segment_merge_gap_ms: 200,
            vad_window_size: 160, // 20ms at 8kHz
            max_conversation_segments: 1000,
            conversation_prune_to: 500,
            normalize_level: 0.9,
        }
    }
}

impl RecordingConfig {
    /// Byte budget for a whole call across all tracks
    pub fn max_call_bytes(&self) -> u64 {
        self.max_duration_seconds * self.sample_rate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecordingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.interruption_window_ms, 500);
        assert_eq!(config.segment_merge_gap_ms, 200);
        assert_eq!(config.max_call_bytes(), 3600 * 8000);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: RecordingConfig =
            serde_json::from_str(r#"{"max_duration_seconds": 5, "enable_mixdown": true}"#)
                .unwrap();
        assert_eq!(config.max_duration_seconds, 5);
        assert!(config.enable_mixdown);
        assert_eq!(config.flush_threshold_bytes, 64 * 1024);
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::buffer::ChunkPayload;
use super::config::RecordingConfig;
use super::stats::{RecordingMetadata, RecordingStatus};
use super::track::{Track, TrackManager};
use crate::storage::{ArtifactKind, OutputKeys, UNAUTHENTICATED_PROVIDER, UNKNOWN_EMPLOYEE};

/// Free-form call attributes supplied when recording starts (from/to, direction, ...)
pub type CallMetadata = BTreeMap<String, String>;

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Recording,
    Stopped,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Normal hang-up reported by call control
    CallEnded,
    /// Per-call byte ceiling exceeded
    BufferLimitReached,
    /// Process-wide drain
    ForceStop,
    /// Call control gave up on the call
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::CallEnded => "call_ended",
            StopReason::BufferLimitReached => "buffer_limit_reached",
            StopReason::ForceStop => "force_stop",
            StopReason::Error => "error",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call_ended" => Ok(StopReason::CallEnded),
            "buffer_limit_reached" => Ok(StopReason::BufferLimitReached),
            "force_stop" => Ok(StopReason::ForceStop),
            "error" => Ok(StopReason::Error),
            other => anyhow::bail!("Unknown stop reason: {}", other),
        }
    }
}

/// Provider and employee bound to a call once it authenticates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBinding {
    pub provider: String,
    pub employee: String,
}

/// Result of feeding one chunk to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Session not recording, or the chunk was refused by its track
    Rejected,
    Accepted,
    /// Accepted, and the call just crossed its byte ceiling; the session
    /// is now stopped and must be finalized
    LimitReached,
}

/// One artifact ready for upload
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub key: String,
    pub bytes: Vec<u8>,
}

/// Everything a stopped session hands over for upload
#[derive(Debug, Clone)]
pub struct FinalRecording {
    pub call_id: String,
    pub keys: OutputKeys,
    pub metadata: RecordingMetadata,
    pub artifacts: Vec<Artifact>,
}

/// Recording state for a single live call
pub struct RecordingSession {
    call_id: String,
    recording_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    state: SessionState,
    stop_reason: Option<StopReason>,

    total_bytes: u64,
    chunk_count: u64,
    max_call_bytes: u64,
    sample_rate: u32,

    auth: Option<AuthBinding>,
    keys: Option<OutputKeys>,
    call_metadata: CallMetadata,

    tracks: TrackManager,
}

impl RecordingSession {
    pub fn new(call_id: impl Into<String>, call_metadata: CallMetadata, config: &RecordingConfig) -> Self {
        let call_id = call_id.into();
        let tracks = TrackManager::new(call_id.clone(), config);

        Self {
            recording_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            state: SessionState::Recording,
            stop_reason: None,
            total_bytes: 0,
            chunk_count: 0,
            max_call_bytes: config.max_call_bytes(),
            sample_rate: config.sample_rate,
            auth: None,
            keys: None,
            call_metadata,
            tracks,
            call_id,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn keys(&self) -> Option<&OutputKeys> {
        self.keys.as_ref()
    }

    pub fn tracks(&self) -> &TrackManager {
        &self.tracks
    }

    /// Feed one chunk to the call's tracks and enforce the byte ceiling
    pub fn add_chunk(
        &mut self,
        payload: ChunkPayload,
        track: Track,
        timestamp_ms: Option<u64>,
    ) -> ChunkOutcome {
        if !self.is_recording() {
            debug!("Ignoring {} chunk for stopped call {}", track, self.call_id);
            return ChunkOutcome::Rejected;
        }

        let bytes = match payload.into_bytes() {
            Some(bytes) => bytes,
            None => {
                warn!("Dropping undecodable {} chunk for {}", track, self.call_id);
                return ChunkOutcome::Rejected;
            }
        };
        let len = bytes.len() as u64;

        if !self.tracks.add_audio_data(ChunkPayload::Raw(bytes), track, timestamp_ms) {
            return ChunkOutcome::Rejected;
        }

        self.total_bytes += len;
        self.chunk_count += 1;

        if self.total_bytes > self.max_call_bytes {
            warn!(
                "Call {} exceeded {} bytes ({} received), stopping recording",
                self.call_id, self.max_call_bytes, self.total_bytes
            );
            self.begin_stop(StopReason::BufferLimitReached);
            return ChunkOutcome::LimitReached;
        }

        ChunkOutcome::Accepted
    }

    /// Bind authentication and compute the output keys
    pub fn update_auth(&mut self, provider: &str, employee: &str) {
        let keys = OutputKeys::new(provider, employee, &self.call_id);
        info!("Call {} authenticated; artifacts go to {}", self.call_id, keys.prefix);

        self.auth = Some(AuthBinding {
            provider: provider.to_string(),
            employee: employee.to_string(),
        });
        self.keys = Some(keys);
    }

    /// Leave the `recording` state
    ///
    /// Returns false if the session was already stopped, so exactly one
    /// caller gets to finalize it.
    pub fn begin_stop(&mut self, reason: StopReason) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }

        self.state = SessionState::Stopped;
        self.ended_at = Some(Utc::now());
        self.stop_reason = Some(reason);

        info!(
            "Recording stopped for {} ({}): {:.1}s, {} chunks, {} bytes",
            self.call_id,
            reason,
            self.duration_secs(),
            self.chunk_count,
            self.total_bytes
        );
        true
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn status(&self) -> RecordingStatus {
        RecordingStatus {
            call_id: self.call_id.clone(),
            recording_id: self.recording_id,
            state: self.state,
            started_at: self.started_at,
            duration_secs: self.duration_secs(),
            total_bytes: self.total_bytes,
            chunk_count: self.chunk_count,
            authenticated: self.auth.is_some(),
            provider: self.auth.as_ref().map(|a| a.provider.clone()),
            employee: self.auth.as_ref().map(|a| a.employee.clone()),
            stop_reason: self.stop_reason,
        }
    }

    /// Produce the artifacts of a stopped session and release its buffers
    ///
    /// Returns `None` while the session is still recording.
    pub fn finalize(&mut self) -> Option<FinalRecording> {
        if self.is_recording() {
            warn!("Refusing to finalize {} while still recording", self.call_id);
            return None;
        }

        let keys = match &self.keys {
            Some(keys) => keys.clone(),
            None => {
                warn!(
                    "Call {} ended without authentication, using placeholder paths",
                    self.call_id
                );
                OutputKeys::unauthenticated(&self.call_id)
            }
        };

        let track_stats = self.tracks.get_track_stats();
        let mixed = self.tracks.get_mixed_audio(1.0, 1.0);
        let inbound = self.tracks.get_track_container(Track::Inbound);
        let outbound = self.tracks.get_track_container(Track::Outbound);

        let (provider, employee) = match &self.auth {
            Some(auth) => (auth.provider.clone(), auth.employee.clone()),
            None => (
                UNAUTHENTICATED_PROVIDER.to_string(),
                UNKNOWN_EMPLOYEE.to_string(),
            ),
        };

        let metadata = RecordingMetadata {
            call_id: self.call_id.clone(),
            recording_id: self.recording_id,
            started_at: self.started_at,
            ended_at: self.ended_at.unwrap_or_else(Utc::now),
            duration_secs: self.duration_secs(),
            provider,
            employee,
            authenticated: self.auth.is_some(),
            sample_rate: self.sample_rate,
            file_size: mixed.as_ref().map(|m| m.len()).unwrap_or(0),
            total_bytes: self.total_bytes,
            chunk_count: self.chunk_count,
            stop_reason: self.stop_reason.unwrap_or(StopReason::CallEnded),
            call_metadata: self.call_metadata.clone(),
            conversation_metrics: track_stats.conversation.clone(),
            track_stats,
        };

        let mut artifacts = Vec::with_capacity(4);
        for (kind, bytes) in [
            (ArtifactKind::Recording, mixed),
            (ArtifactKind::Inbound, inbound),
            (ArtifactKind::Outbound, outbound),
        ] {
            match bytes {
                Some(bytes) if !bytes.is_empty() => artifacts.push(Artifact {
                    kind,
                    key: keys.key_for(kind).to_string(),
                    bytes,
                }),
                _ => debug!("No {} audio for {}, skipping upload", kind, self.call_id),
            }
        }

        match serde_json::to_vec_pretty(&metadata) {
            Ok(bytes) => artifacts.push(Artifact {
                kind: ArtifactKind::Metadata,
                key: keys.key_for(ArtifactKind::Metadata).to_string(),
                bytes,
            }),
            Err(e) => warn!("Failed to serialize metadata for {}: {}", self.call_id, e),
        }

        self.tracks.cleanup();

        Some(FinalRecording {
            call_id: self.call_id.clone(),
            keys,
            metadata,
            artifacts,
        })
    }
}

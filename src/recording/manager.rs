use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::buffer::ChunkPayload;
use super::config::RecordingConfig;
use super::session::{
    Artifact, CallMetadata, ChunkOutcome, FinalRecording, RecordingSession, StopReason,
};
use super::stats::RecordingStatus;
use super::track::Track;
use crate::storage::{ArtifactKind, ObjectStore};

type SessionHandle = Arc<Mutex<RecordingSession>>;

/// Outcome of one artifact upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub kind: ArtifactKind,
    pub key: String,
    pub bytes: usize,
    /// Error message when the upload failed
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What happened when a recording was stopped
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    pub call_id: String,
    pub reason: StopReason,
    pub duration_secs: f64,
    pub uploads: Vec<UploadOutcome>,
}

impl StopReport {
    pub fn failed_uploads(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.uploads.iter().filter(|u| !u.succeeded())
    }
}

struct ManagerInner {
    config: RecordingConfig,
    store: Arc<dyn ObjectStore>,
    /// Active sessions (call_id → session). The table lock only guards
    /// lookup/insert/remove; per-call work happens under the session mutex.
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

/// Entry point for the call-control layer
///
/// Cheap to clone; every clone shares the same session table.
#[derive(Clone)]
pub struct RecordingManager {
    inner: Arc<ManagerInner>,
}

impl RecordingManager {
    pub fn new(config: RecordingConfig, store: Arc<dyn ObjectStore>) -> Self {
        info!(
            "Recording manager initialized: enabled={}, {}Hz, max {}s per call, store={}",
            config.enabled,
            config.sample_rate,
            config.max_duration_seconds,
            store.name()
        );

        Self {
            inner: Arc::new(ManagerInner {
                config,
                store,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    async fn session(&self, call_id: &str) -> Option<SessionHandle> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(call_id).cloned()
    }

    /// Begin capturing a call
    ///
    /// Refuses when recording is disabled or the call already has a session.
    pub async fn start_recording(&self, call_id: &str, metadata: CallMetadata) -> bool {
        if !self.inner.config.enabled {
            debug!("Recording disabled, not recording {}", call_id);
            return false;
        }

        let mut sessions = self.inner.sessions.write().await;
        if sessions.contains_key(call_id) {
            warn!("Recording already active for {}", call_id);
            return false;
        }

        let session = RecordingSession::new(call_id, metadata, &self.inner.config);
        sessions.insert(call_id.to_string(), Arc::new(Mutex::new(session)));

        info!(
            "Recording started for {} ({} active)",
            call_id,
            sessions.len()
        );
        true
    }

    /// Feed one chunk of a call's audio
    ///
    /// Returns false when the call has no session, is no longer recording or
    /// the chunk was refused. Crossing the per-call byte ceiling stops the
    /// recording and finalizes it in the background.
    pub async fn add_audio_chunk(
        &self,
        call_id: &str,
        payload: ChunkPayload,
        track: Track,
        timestamp_ms: Option<u64>,
    ) -> bool {
        let Some(session) = self.session(call_id).await else {
            debug!("No active recording for {}, dropping {} chunk", call_id, track);
            return false;
        };

        let outcome = {
            let mut session = session.lock().await;
            session.add_chunk(payload, track, timestamp_ms)
        };

        match outcome {
            ChunkOutcome::Rejected => false,
            ChunkOutcome::Accepted => true,
            ChunkOutcome::LimitReached => {
                let manager = self.clone();
                let call_id = call_id.to_string();
                tokio::spawn(async move {
                    let report = manager.finish(&call_id, session).await;
                    info!(
                        "Recording for {} finalized after buffer limit ({} uploads)",
                        call_id,
                        report.uploads.len()
                    );
                });
                true
            }
        }
    }

    /// Attach authentication to a call; may arrive any time after start
    pub async fn update_call_auth(&self, call_id: &str, provider: &str, employee: &str) -> bool {
        let Some(session) = self.session(call_id).await else {
            warn!("Auth for unknown call {}", call_id);
            return false;
        };

        let mut session = session.lock().await;
        session.update_auth(provider, employee);
        true
    }

    /// Stop a call's recording and upload its artifacts
    ///
    /// Returns false when the call has no session or is already stopping.
    pub async fn stop_recording(&self, call_id: &str, reason: StopReason) -> bool {
        self.stop_recording_with_report(call_id, reason).await.is_some()
    }

    /// Like [`stop_recording`](Self::stop_recording), returning the
    /// per-artifact upload outcomes
    pub async fn stop_recording_with_report(
        &self,
        call_id: &str,
        reason: StopReason,
    ) -> Option<StopReport> {
        let Some(session) = self.session(call_id).await else {
            warn!("Stop requested for unknown call {}", call_id);
            return None;
        };

        {
            let mut guard = session.lock().await;
            if !guard.begin_stop(reason) {
                warn!("Recording for {} is already stopping", call_id);
                return None;
            }
        }

        Some(self.finish(call_id, session).await)
    }

    /// Collect artifacts from a stopped session, upload them and drop the session
    async fn finish(&self, call_id: &str, session: SessionHandle) -> StopReport {
        let (recording, reason, duration_secs) = {
            let mut guard = session.lock().await;
            let status = guard.status();
            (
                guard.finalize(),
                status.stop_reason.unwrap_or(StopReason::CallEnded),
                status.duration_secs,
            )
        };

        let uploads = match recording {
            Some(recording) => self.upload(recording).await,
            None => {
                error!("Session {} was not stopped before finalizing", call_id);
                Vec::new()
            }
        };

        {
            let mut sessions = self.inner.sessions.write().await;
            if sessions
                .get(call_id)
                .map(|current| Arc::ptr_eq(current, &session))
                .unwrap_or(false)
            {
                sessions.remove(call_id);
            }
        }

        let failed = uploads.iter().filter(|u| !u.succeeded()).count();
        if failed > 0 {
            warn!(
                "Recording for {} closed with {} of {} uploads failed",
                call_id,
                failed,
                uploads.len()
            );
        } else {
            info!(
                "Recording for {} closed: {} artifacts uploaded",
                call_id,
                uploads.len()
            );
        }

        StopReport {
            call_id: call_id.to_string(),
            reason,
            duration_secs,
            uploads,
        }
    }

    /// Upload every artifact concurrently; one failure never cancels the others
    async fn upload(&self, recording: FinalRecording) -> Vec<UploadOutcome> {
        let FinalRecording {
            call_id, artifacts, ..
        } = recording;

        let mut pending = Vec::with_capacity(artifacts.len());
        let mut handles = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let Artifact { kind, key, bytes } = artifact;
            pending.push((kind, key.clone(), bytes.len()));

            let mut attributes = HashMap::new();
            attributes.insert("content-type".to_string(), kind.content_type().to_string());
            attributes.insert("call-id".to_string(), call_id.clone());
            attributes.insert("artifact".to_string(), kind.as_str().to_string());

            let store = Arc::clone(&self.inner.store);
            handles.push(tokio::spawn(async move {
                store.put(&key, bytes, attributes).await
            }));
        }

        let results = join_all(handles).await;

        pending
            .into_iter()
            .zip(results)
            .map(|((kind, key, size), result)| {
                let error = match result {
                    Ok(Ok(())) => {
                        debug!("Uploaded {} for {} to {} ({} bytes)", kind, call_id, key, size);
                        None
                    }
                    Ok(Err(e)) => {
                        error!("Failed to upload {} for {} to {}: {:#}", kind, call_id, key, e);
                        Some(format!("{:#}", e))
                    }
                    Err(e) => {
                        error!("Upload task for {} of {} panicked: {}", kind, call_id, e);
                        Some(format!("upload task failed: {}", e))
                    }
                };

                UploadOutcome {
                    kind,
                    key,
                    bytes: size,
                    error,
                }
            })
            .collect()
    }

    /// Snapshot of one call's recording
    pub async fn get_recording_status(&self, call_id: &str) -> Option<RecordingStatus> {
        let session = self.session(call_id).await?;
        let session = session.lock().await;
        Some(session.status())
    }

    /// Snapshots of every session in the table
    pub async fn get_active_recordings(&self) -> Vec<RecordingStatus> {
        let handles: Vec<SessionHandle> = {
            let sessions = self.inner.sessions.read().await;
            sessions.values().cloned().collect()
        };

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            statuses.push(handle.lock().await.status());
        }
        statuses.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        statuses
    }

    pub async fn active_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Stop every active recording concurrently (process drain)
    ///
    /// Returns how many recordings this call stopped.
    pub async fn stop_all_recordings(&self) -> usize {
        let call_ids: Vec<String> = {
            let sessions = self.inner.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        if call_ids.is_empty() {
            return 0;
        }

        info!("Force-stopping {} active recordings", call_ids.len());

        let stops = call_ids
            .iter()
            .map(|call_id| self.stop_recording(call_id, StopReason::ForceStop));
        let stopped = join_all(stops).await.into_iter().filter(|&ok| ok).count();

        info!("Force-stopped {} of {} recordings", stopped, call_ids.len());
        stopped
    }
}

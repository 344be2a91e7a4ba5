use base64::Engine;
use std::collections::VecDeque;
use std::mem;
use tracing::{debug, info, warn};

use super::config::RecordingConfig;
use super::stats::StreamBufferStats;
use super::track::Track;
use crate::audio::codec;
use crate::audio::vad::VadState;

/// Gain applied to the excess above threshold when segment compression is on
const SEGMENT_COMPRESSION_RATIO: f32 = 0.5;

/// Raw chunk as delivered by the media stream
#[derive(Debug, Clone)]
pub enum ChunkPayload {
    /// Base64-encoded μ-law bytes (Twilio-style media message)
    Base64(String),
    /// Already-decoded μ-law bytes
    Raw(Vec<u8>),
}

impl ChunkPayload {
    /// Decode into μ-law bytes, `None` if the base64 is malformed
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            ChunkPayload::Raw(bytes) => Some(bytes),
            ChunkPayload::Base64(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .ok(),
        }
    }
}

impl From<Vec<u8>> for ChunkPayload {
    fn from(bytes: Vec<u8>) -> Self {
        ChunkPayload::Raw(bytes)
    }
}

/// Sealed slice of one track's audio
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in the track, counting compacted segments
    pub index: u64,
    /// Timestamp of the first chunk in the segment
    pub start_ms: u64,
    /// Timestamp of the last chunk in the segment
    pub end_ms: u64,
    /// μ-law bytes
    pub data: Vec<u8>,
    pub chunk_count: usize,
    /// VAD counters at flush time
    pub vad: VadState,
    /// Whether `data` went through dynamic range compression
    pub compressed: bool,
}

impl Segment {
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }
}

/// Flush and retention knobs for a single track
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub sample_rate: u32,
    pub flush_threshold_bytes: usize,
    pub segment_duration_ms: u64,
    /// 0 disables compaction
    pub segment_retention_count: usize,
    pub max_buffer_bytes: usize,
    pub enable_compression: bool,
    pub vad_window_size: usize,
    pub normalize_level: f32,
}

impl From<&RecordingConfig> for BufferConfig {
    fn from(cfg: &RecordingConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            flush_threshold_bytes: cfg.flush_threshold_bytes,
            segment_duration_ms: cfg.segment_duration_ms,
            segment_retention_count: cfg.segment_retention_count,
            max_buffer_bytes: cfg.max_buffer_bytes,
            enable_compression: cfg.enable_compression,
            vad_window_size: cfg.vad_window_size,
            normalize_level: cfg.normalize_level,
        }
    }
}

/// Per-track byte accumulator
///
/// Chunks are appended to an in-memory accumulator which is sealed into a
/// [`Segment`] once it crosses the byte threshold or has been open for
/// `segment_duration_ms`. Only the newest `segment_retention_count`
/// segments are kept; older ones are compacted away and counted.
pub struct StreamBuffer {
    track: Track,
    config: BufferConfig,
    vad_enabled: bool,

    accumulator: Vec<u8>,
    pending_chunks: usize,
    pending_start_ms: Option<u64>,
    last_chunk_ms: u64,
    last_flush_ms: Option<u64>,

    segments: VecDeque<Segment>,
    next_index: u64,
    vad: VadState,

    total_bytes: u64,
    total_chunks: u64,
    flush_count: u64,
    compacted_segments: u64,
    compacted_bytes: u64,
    rejected_chunks: u64,
}

impl StreamBuffer {
    pub fn new(track: Track, config: BufferConfig) -> Self {
        let vad_enabled = track.vad_enabled();
        Self::with_vad(track, config, vad_enabled)
    }

    pub fn with_vad(track: Track, config: BufferConfig, vad_enabled: bool) -> Self {
        debug!(
            "Stream buffer for {} track: flush at {} bytes / {}ms, retain {} segments",
            track, config.flush_threshold_bytes, config.segment_duration_ms,
            config.segment_retention_count
        );

        Self {
            track,
            config,
            vad_enabled,
            accumulator: Vec::new(),
            pending_chunks: 0,
            pending_start_ms: None,
            last_chunk_ms: 0,
            last_flush_ms: None,
            segments: VecDeque::new(),
            next_index: 0,
            vad: VadState::new(),
            total_bytes: 0,
            total_chunks: 0,
            flush_count: 0,
            compacted_segments: 0,
            compacted_bytes: 0,
            rejected_chunks: 0,
        }
    }

    /// Decode and append a chunk
    ///
    /// Returns false when the payload is not valid base64, is empty, or
    /// would push the accumulator past `max_buffer_bytes`.
    pub fn add_chunk(&mut self, payload: ChunkPayload, timestamp_ms: u64) -> bool {
        match payload.into_bytes() {
            Some(bytes) => self.append(&bytes, timestamp_ms),
            None => {
                warn!("Dropping undecodable {} chunk at {}ms", self.track, timestamp_ms);
                self.rejected_chunks += 1;
                false
            }
        }
    }

    /// Append already-decoded μ-law bytes
    pub fn append(&mut self, bytes: &[u8], timestamp_ms: u64) -> bool {
        if bytes.is_empty() {
            debug!("Ignoring empty {} chunk at {}ms", self.track, timestamp_ms);
            return false;
        }

        if self.accumulator.len() + bytes.len() > self.config.max_buffer_bytes {
            warn!(
                "{} buffer full ({} + {} > {} bytes), rejecting chunk",
                self.track,
                self.accumulator.len(),
                bytes.len(),
                self.config.max_buffer_bytes
            );
            self.rejected_chunks += 1;
            return false;
        }

        if self.last_flush_ms.is_none() {
            self.last_flush_ms = Some(timestamp_ms);
        }
        if self.accumulator.is_empty() {
            self.pending_start_ms = Some(timestamp_ms);
        }

        self.accumulator.extend_from_slice(bytes);
        self.pending_chunks += 1;
        self.last_chunk_ms = timestamp_ms;
        self.total_bytes += bytes.len() as u64;
        self.total_chunks += 1;

        if self.vad_enabled {
            let samples = codec::decode_bytes(bytes);
            self.vad.process(&samples, self.config.vad_window_size);
        }

        if self.should_flush(timestamp_ms) {
            self.flush_to_segment();
        }

        true
    }

    /// Whether the accumulator is due to be sealed at `now_ms`
    pub fn should_flush(&self, now_ms: u64) -> bool {
        if self.accumulator.is_empty() {
            return false;
        }

        if self.accumulator.len() >= self.config.flush_threshold_bytes {
            return true;
        }

        let since = self.last_flush_ms.unwrap_or(now_ms);
        now_ms.saturating_sub(since) >= self.config.segment_duration_ms
    }

    /// Seal the accumulator into a new segment
    ///
    /// Returns false when there was nothing to flush.
    pub fn flush_to_segment(&mut self) -> bool {
        if self.accumulator.is_empty() {
            return false;
        }

        let raw = mem::take(&mut self.accumulator);
        let (data, compressed) = if self.config.enable_compression {
            let samples = codec::decode_bytes(&raw);
            let squashed = codec::compress_dynamic_range(&samples, SEGMENT_COMPRESSION_RATIO);
            (codec::encode_samples(&squashed), true)
        } else {
            (raw, false)
        };

        let segment = Segment {
            index: self.next_index,
            start_ms: self.pending_start_ms.unwrap_or(self.last_chunk_ms),
            end_ms: self.last_chunk_ms,
            data,
            chunk_count: self.pending_chunks,
            vad: self.vad,
            compressed,
        };

        debug!(
            "{} segment {} sealed: {}ms - {}ms ({} bytes, {} chunks)",
            self.track,
            segment.index,
            segment.start_ms,
            segment.end_ms,
            segment.byte_count(),
            segment.chunk_count
        );

        self.segments.push_back(segment);
        self.next_index += 1;
        self.flush_count += 1;
        self.pending_chunks = 0;
        self.pending_start_ms = None;
        self.last_flush_ms = Some(self.last_chunk_ms);

        self.compact();
        true
    }

    /// Drop the oldest segments beyond the retention count
    fn compact(&mut self) {
        let retention = self.config.segment_retention_count;
        if retention == 0 || self.segments.len() <= retention {
            return;
        }

        let excess = self.segments.len() - retention;
        let mut dropped_bytes = 0u64;
        for segment in self.segments.drain(..excess) {
            dropped_bytes += segment.byte_count() as u64;
        }

        self.compacted_segments += excess as u64;
        self.compacted_bytes += dropped_bytes;

        warn!(
            "Compacted {} {} segment(s) ({} bytes discarded, {} segments compacted so far)",
            excess, self.track, dropped_bytes, self.compacted_segments
        );
    }

    /// Flush any pending bytes and concatenate every retained segment
    pub fn get_all_audio_data(&mut self) -> Vec<u8> {
        self.flush_to_segment();

        let total: usize = self.segments.iter().map(|s| s.byte_count()).sum();
        let mut out = Vec::with_capacity(total);
        for segment in &self.segments {
            out.extend_from_slice(&segment.data);
        }
        out
    }

    /// All retained audio as linear samples
    pub fn decoded_samples(&mut self) -> Vec<i16> {
        codec::decode_bytes(&self.get_all_audio_data())
    }

    /// All retained audio as a normalized WAV container, `None` if empty
    pub fn get_container_data(&mut self) -> Option<Vec<u8>> {
        let samples = self.decoded_samples();
        if samples.is_empty() {
            return None;
        }

        let normalized = codec::normalize(&samples, self.config.normalize_level);
        let container = codec::to_container(&normalized, self.config.sample_rate)?;

        info!(
            "{} track container ready: {} samples, {} bytes",
            self.track,
            samples.len(),
            container.len()
        );

        Some(container)
    }

    pub fn has_data(&self) -> bool {
        !self.accumulator.is_empty() || self.segments.iter().any(|s| !s.data.is_empty())
    }

    pub fn track(&self) -> Track {
        self.track
    }

    pub fn vad_state(&self) -> VadState {
        self.vad
    }

    pub fn buffered_bytes(&self) -> usize {
        self.accumulator.len()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn stats(&self) -> StreamBufferStats {
        StreamBufferStats {
            track: self.track,
            vad_enabled: self.vad_enabled,
            buffered_bytes: self.accumulator.len(),
            retained_bytes: self.segments.iter().map(|s| s.byte_count()).sum(),
            segment_count: self.segments.len(),
            total_bytes: self.total_bytes,
            total_chunks: self.total_chunks,
            flush_count: self.flush_count,
            compacted_segments: self.compacted_segments,
            compacted_bytes: self.compacted_bytes,
            rejected_chunks: self.rejected_chunks,
            vad: self.vad,
        }
    }

    /// Release buffered audio; lifetime counters are kept for stats
    pub fn clear(&mut self) {
        self.accumulator = Vec::new();
        self.segments = VecDeque::new();
        self.pending_chunks = 0;
        self.pending_start_ms = None;
        self.last_flush_ms = None;
        self.vad.reset();
    }
}

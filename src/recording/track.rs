use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::buffer::{BufferConfig, ChunkPayload, StreamBuffer};
use super::config::RecordingConfig;
use super::conversation::{ConversationAnalyzer, ConversationConfig, Speaker};
use super::stats::TrackStats;
use crate::audio::codec;

/// Logical audio track of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Caller audio
    Inbound,
    /// System (synthesized) audio
    Outbound,
    /// Consolidated feed of both sides
    Mixed,
}

impl Track {
    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Inbound => "inbound",
            Track::Outbound => "outbound",
            Track::Mixed => "mixed",
        }
    }

    /// Party whose speech this track carries
    pub fn speaker(&self) -> Option<Speaker> {
        match self {
            Track::Inbound => Some(Speaker::Caller),
            Track::Outbound => Some(Speaker::System),
            Track::Mixed => None,
        }
    }

    /// Only caller audio gets per-chunk VAD in its stream buffer
    pub fn vad_enabled(&self) -> bool {
        match self {
            Track::Inbound => true,
            Track::Outbound | Track::Mixed => false,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Track {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbound" => Ok(Track::Inbound),
            "outbound" => Ok(Track::Outbound),
            "mixed" => Ok(Track::Mixed),
            other => anyhow::bail!("Unknown track: {}", other),
        }
    }
}

/// Owns the stream buffers of one call and analyzes the conversation
pub struct TrackManager {
    call_id: String,
    sample_rate: u32,
    normalize_level: f32,
    sync_tolerance_ms: u64,

    inbound: StreamBuffer,
    outbound: StreamBuffer,
    mixed: Option<StreamBuffer>,

    /// First timestamp seen per track
    first_seen_ms: HashMap<Track, u64>,
    /// Where the next chunk of each track starts (last timestamp + chunk duration)
    next_ms: HashMap<Track, u64>,
    sync_offset_ms: Option<i64>,

    conversation: ConversationAnalyzer,
}

impl TrackManager {
    pub fn new(call_id: impl Into<String>, config: &RecordingConfig) -> Self {
        let call_id = call_id.into();
        let buffer_config = BufferConfig::from(config);

        let mixed = config
            .enable_mixdown
            .then(|| StreamBuffer::new(Track::Mixed, buffer_config.clone()));

        info!(
            "Track manager for {}: {}Hz, mixdown {}",
            call_id,
            config.sample_rate,
            if mixed.is_some() { "on" } else { "off" }
        );

        Self {
            call_id,
            sample_rate: config.sample_rate,
            normalize_level: config.normalize_level,
            sync_tolerance_ms: config.track_sync_tolerance_ms,
            inbound: StreamBuffer::new(Track::Inbound, buffer_config.clone()),
            outbound: StreamBuffer::new(Track::Outbound, buffer_config),
            mixed,
            first_seen_ms: HashMap::new(),
            next_ms: HashMap::new(),
            sync_offset_ms: None,
            conversation: ConversationAnalyzer::new(ConversationConfig::from(config)),
        }
    }

    fn buffer_mut(&mut self, track: Track) -> Option<&mut StreamBuffer> {
        match track {
            Track::Inbound => Some(&mut self.inbound),
            Track::Outbound => Some(&mut self.outbound),
            Track::Mixed => self.mixed.as_mut(),
        }
    }

    /// Route a chunk to its track, mirror it into the mixed track and feed
    /// conversation analysis
    ///
    /// Timestamps are stream milliseconds. A chunk without one continues
    /// its track where the previous chunk ended; the first untimed chunk of
    /// a track starts at the call's latest stream position (0 for a new call).
    pub fn add_audio_data(
        &mut self,
        payload: ChunkPayload,
        track: Track,
        timestamp_ms: Option<u64>,
    ) -> bool {
        let bytes = match payload.into_bytes() {
            Some(bytes) if !bytes.is_empty() => bytes,
            Some(_) => {
                debug!("Ignoring empty {} chunk for {}", track, self.call_id);
                return false;
            }
            None => {
                warn!("Dropping undecodable {} chunk for {}", track, self.call_id);
                return false;
            }
        };

        let timestamp_ms = timestamp_ms.unwrap_or_else(|| self.stream_position(track));
        let chunk_ms = codec::duration_ms(bytes.len(), self.sample_rate);

        let accepted = match track {
            Track::Inbound => self.inbound.append(&bytes, timestamp_ms),
            Track::Outbound => self.outbound.append(&bytes, timestamp_ms),
            Track::Mixed => match self.mixed.as_mut() {
                Some(mixed) => mixed.append(&bytes, timestamp_ms),
                None => {
                    warn!(
                        "Mixed track chunk for {} but mixdown is disabled, dropping",
                        self.call_id
                    );
                    false
                }
            },
        };

        if !accepted {
            return false;
        }

        self.next_ms.insert(track, timestamp_ms.saturating_add(chunk_ms));

        if !self.first_seen_ms.contains_key(&track) {
            self.first_seen_ms.insert(track, timestamp_ms);
            self.check_sync();
        }

        match track {
            Track::Inbound | Track::Outbound => {
                if let Some(mixed) = self.mixed.as_mut() {
                    mixed.append(&bytes, timestamp_ms);
                }
            }
            Track::Mixed => {}
        }

        if let Some(speaker) = track.speaker() {
            let samples = codec::decode_bytes(&bytes);
            self.conversation.analyze(speaker, &samples, timestamp_ms);
        }

        true
    }

    /// Stream position an untimed chunk of `track` starts at
    fn stream_position(&self, track: Track) -> u64 {
        self.next_ms
            .get(&track)
            .copied()
            .or_else(|| self.next_ms.values().copied().max())
            .unwrap_or(0)
    }

    /// Compare first-seen timestamps once both directions have started
    fn check_sync(&mut self) {
        if self.sync_offset_ms.is_some() {
            return;
        }

        let (Some(&inbound), Some(&outbound)) = (
            self.first_seen_ms.get(&Track::Inbound),
            self.first_seen_ms.get(&Track::Outbound),
        ) else {
            return;
        };

        // Timestamps come from the client; keep the difference within i64
        let offset = (outbound as i128 - inbound as i128)
            .clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        self.sync_offset_ms = Some(offset);

        if offset.unsigned_abs() > self.sync_tolerance_ms {
            warn!(
                "Track drift for {}: outbound started {}ms after inbound (tolerance {}ms)",
                self.call_id, offset, self.sync_tolerance_ms
            );
        } else {
            debug!("Tracks for {} aligned within {}ms", self.call_id, offset);
        }
    }

    pub fn first_seen_ms(&self, track: Track) -> Option<u64> {
        self.first_seen_ms.get(&track).copied()
    }

    pub fn sync_offset_ms(&self) -> Option<i64> {
        self.sync_offset_ms
    }

    /// Mixed WAV container for the call
    ///
    /// Uses the dedicated mixed track when it holds audio, otherwise mixes
    /// inbound and outbound on demand. `None` when neither side has audio.
    pub fn get_mixed_audio(&mut self, inbound_weight: f32, outbound_weight: f32) -> Option<Vec<u8>> {
        if let Some(mixed) = self.mixed.as_mut() {
            if mixed.has_data() {
                return mixed.get_container_data();
            }
        }

        let inbound = self.inbound.decoded_samples();
        let outbound = self.outbound.decoded_samples();

        let mut tracks: Vec<&[i16]> = Vec::with_capacity(2);
        let mut weights = Vec::with_capacity(2);
        if !inbound.is_empty() {
            tracks.push(inbound.as_slice());
            weights.push(inbound_weight);
        }
        if !outbound.is_empty() {
            tracks.push(outbound.as_slice());
            weights.push(outbound_weight);
        }

        let mixed = codec::mix(&tracks, Some(weights.as_slice()))?;
        let normalized = codec::normalize(&mixed, self.normalize_level);
        let container = codec::to_container(&normalized, self.sample_rate)?;

        info!(
            "Mixed {} track(s) for {}: {} samples",
            tracks.len(),
            self.call_id,
            mixed.len()
        );

        Some(container)
    }

    /// WAV container for a single track
    pub fn get_track_container(&mut self, track: Track) -> Option<Vec<u8>> {
        self.buffer_mut(track)?.get_container_data()
    }

    pub fn get_track_stats(&self) -> TrackStats {
        let mut tracks = vec![self.inbound.stats(), self.outbound.stats()];
        if let Some(mixed) = &self.mixed {
            tracks.push(mixed.stats());
        }

        TrackStats {
            tracks,
            sync_offset_ms: self.sync_offset_ms,
            conversation: self.conversation.metrics(),
        }
    }

    pub fn conversation(&self) -> &ConversationAnalyzer {
        &self.conversation
    }

    /// Release buffered audio and conversation state; safe to call twice
    pub fn cleanup(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        if let Some(mixed) = self.mixed.as_mut() {
            mixed.clear();
        }
        self.first_seen_ms.clear();
        self.next_ms.clear();
        self.sync_offset_ms = None;
        self.conversation.reset();

        debug!("Track manager for {} cleaned up", self.call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SILENCE: u8 = 0xFF;

    #[test]
    fn test_track_from_str() {
        assert_eq!("inbound".parse::<Track>().unwrap(), Track::Inbound);
        assert_eq!("Outbound".parse::<Track>().unwrap(), Track::Outbound);
        assert_eq!("MIXED".parse::<Track>().unwrap(), Track::Mixed);
        assert!("both".parse::<Track>().is_err());
    }

    #[test]
    fn test_sync_offset_recorded_once() {
        let mut tracks = TrackManager::new("CA1", &RecordingConfig::default());

        assert!(tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Inbound, Some(1_000)));
        assert!(tracks.sync_offset_ms().is_none());

        assert!(tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Outbound, Some(1_250)));
        assert_eq!(tracks.sync_offset_ms(), Some(250));

        // Later chunks never move the first-seen timestamps
        assert!(tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Inbound, Some(900)));
        assert_eq!(tracks.first_seen_ms(Track::Inbound), Some(1_000));
        assert_eq!(tracks.sync_offset_ms(), Some(250));
    }

    #[test]
    fn test_mixed_chunk_without_mixdown_rejected() {
        let mut tracks = TrackManager::new("CA1", &RecordingConfig::default());
        assert!(!tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Mixed, Some(0)));
        assert!(tracks.first_seen_ms(Track::Mixed).is_none());
        assert_eq!(tracks.get_track_stats().tracks.len(), 2);
    }

    #[test]
    fn test_mixdown_mirrors_both_sides() {
        let config = RecordingConfig {
            enable_mixdown: true,
            ..RecordingConfig::default()
        };
        let mut tracks = TrackManager::new("CA1", &config);

        tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Inbound, Some(0));
        tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Outbound, Some(0));

        let stats = tracks.get_track_stats();
        assert_eq!(stats.tracks.len(), 3);
        assert_eq!(stats.tracks[2].track, Track::Mixed);
        assert_eq!(stats.tracks[2].total_bytes, 320);

        let mixed = tracks.get_mixed_audio(1.0, 1.0).unwrap();
        assert_eq!(mixed.len(), codec::WAV_HEADER_LEN + 320 * 2);
    }

    #[test]
    fn test_mixed_audio_on_demand() {
        let mut tracks = TrackManager::new("CA1", &RecordingConfig::default());
        assert!(tracks.get_mixed_audio(1.0, 1.0).is_none());

        tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Inbound, Some(0));
        tracks.add_audio_data(vec![SILENCE; 80].into(), Track::Outbound, Some(0));

        // Mixed length follows the longest track
        let mixed = tracks.get_mixed_audio(1.0, 1.0).unwrap();
        assert_eq!(mixed.len(), codec::WAV_HEADER_LEN + 160 * 2);
    }

    #[test]
    fn test_cleanup() {
        let mut tracks = TrackManager::new("CA1", &RecordingConfig::default());
        tracks.add_audio_data(vec![SILENCE; 160].into(), Track::Inbound, Some(0));
        tracks.cleanup();
        tracks.cleanup();

        assert!(tracks.get_track_container(Track::Inbound).is_none());
        assert!(tracks.first_seen_ms(Track::Inbound).is_none());
    }

    #[test]
    fn test_empty_chunk_rejected() {
        let mut tracks = TrackManager::new("CA1", &RecordingConfig::default());
        assert!(!tracks.add_audio_data(Vec::new().into(), Track::Inbound, Some(0)));
    }
}

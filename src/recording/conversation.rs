// Conversation analysis over the caller and system tracks
//
// Every voiced chunk either extends the speaker's current turn or opens a
// new one. A turn that opens while the other party spoke within the
// interruption window counts as one interruption.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::config::RecordingConfig;
use super::stats::ConversationMetrics;
use crate::audio::codec::{self, VoiceActivity};

/// Share of speaking time above which a party is considered dominant
const DOMINANCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Caller,
    System,
}

impl Speaker {
    pub fn other(self) -> Self {
        match self {
            Speaker::Caller => Speaker::System,
            Speaker::System => Speaker::Caller,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Caller => f.write_str("caller"),
            Speaker::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantSpeaker {
    /// No speech observed yet
    #[default]
    Unknown,
    Caller,
    System,
    /// Speech observed but neither side above the threshold
    Balanced,
}

/// Contiguous span of speech from one party
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSegment {
    pub speaker: Speaker,
    pub start_ms: u64,
    pub end_ms: u64,
    pub peak_confidence: f32,
    pub peak_energy: f32,
}

impl ConversationSegment {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub sample_rate: u32,
    pub vad_window_size: usize,
    pub interruption_window_ms: u64,
    pub merge_gap_ms: u64,
    pub max_segments: usize,
    pub prune_to: usize,
}

impl From<&RecordingConfig> for ConversationConfig {
    fn from(cfg: &RecordingConfig) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            vad_window_size: cfg.vad_window_size,
            interruption_window_ms: cfg.interruption_window_ms,
            merge_gap_ms: cfg.segment_merge_gap_ms,
            max_segments: cfg.max_conversation_segments,
            prune_to: cfg.conversation_prune_to.min(cfg.max_conversation_segments),
        }
    }
}

/// Turn-taking tracker for one call
pub struct ConversationAnalyzer {
    config: ConversationConfig,
    segments: Vec<ConversationSegment>,
    caller_last_voice_ms: Option<u64>,
    system_last_voice_ms: Option<u64>,
    caller_speaking_ms: u64,
    system_speaking_ms: u64,
    interruptions: u64,
    dominant: DominantSpeaker,
}

impl ConversationAnalyzer {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
            caller_last_voice_ms: None,
            system_last_voice_ms: None,
            caller_speaking_ms: 0,
            system_speaking_ms: 0,
            interruptions: 0,
            dominant: DominantSpeaker::Unknown,
        }
    }

    /// Classify a decoded chunk and fold it into the conversation
    pub fn analyze(&mut self, speaker: Speaker, samples: &[i16], timestamp_ms: u64) -> VoiceActivity {
        let activity = codec::detect_voice_activity(samples, self.config.vad_window_size);
        if activity.has_voice {
            let duration_ms = codec::duration_ms(samples.len(), self.config.sample_rate);
            self.observe(speaker, &activity, timestamp_ms, duration_ms);
        }
        activity
    }

    /// Record a voiced span of `duration_ms` starting at `timestamp_ms`
    pub fn observe(
        &mut self,
        speaker: Speaker,
        activity: &VoiceActivity,
        timestamp_ms: u64,
        duration_ms: u64,
    ) {
        if !activity.has_voice {
            return;
        }

        let end_ms = timestamp_ms.saturating_add(duration_ms);
        let merge_gap_ms = self.config.merge_gap_ms;

        let current = self
            .segments
            .iter()
            .rposition(|s| s.speaker == speaker)
            .filter(|&i| timestamp_ms.saturating_sub(self.segments[i].end_ms) < merge_gap_ms);

        let added_ms = match current {
            Some(i) => {
                let segment = &mut self.segments[i];
                let previous_end = segment.end_ms;
                segment.end_ms = segment.end_ms.max(end_ms);
                segment.peak_confidence = segment.peak_confidence.max(activity.confidence);
                segment.peak_energy = segment.peak_energy.max(activity.energy);
                segment.end_ms - previous_end
            }
            None => {
                if self.interrupts_other(speaker, timestamp_ms) {
                    self.interruptions += 1;
                    debug!(
                        "Interruption #{}: {} started at {}ms while {} was speaking",
                        self.interruptions,
                        speaker,
                        timestamp_ms,
                        speaker.other()
                    );
                }

                self.segments.push(ConversationSegment {
                    speaker,
                    start_ms: timestamp_ms,
                    end_ms,
                    peak_confidence: activity.confidence,
                    peak_energy: activity.energy,
                });
                self.prune();
                duration_ms
            }
        };

        match speaker {
            Speaker::Caller => {
                self.caller_speaking_ms = self.caller_speaking_ms.saturating_add(added_ms);
                self.caller_last_voice_ms = Some(end_ms.max(self.caller_last_voice_ms.unwrap_or(0)));
            }
            Speaker::System => {
                self.system_speaking_ms = self.system_speaking_ms.saturating_add(added_ms);
                self.system_last_voice_ms = Some(end_ms.max(self.system_last_voice_ms.unwrap_or(0)));
            }
        }

        self.dominant = self.compute_dominant();
    }

    fn interrupts_other(&self, speaker: Speaker, timestamp_ms: u64) -> bool {
        let other_last = match speaker.other() {
            Speaker::Caller => self.caller_last_voice_ms,
            Speaker::System => self.system_last_voice_ms,
        };

        other_last
            .map(|last| timestamp_ms.saturating_sub(last) <= self.config.interruption_window_ms)
            .unwrap_or(false)
    }

    fn prune(&mut self) {
        if self.segments.len() <= self.config.max_segments {
            return;
        }

        let drop = self.segments.len() - self.config.prune_to;
        self.segments.drain(..drop);
        debug!(
            "Pruned {} conversation segments, {} retained",
            drop,
            self.segments.len()
        );
    }

    fn compute_dominant(&self) -> DominantSpeaker {
        let total = self.caller_speaking_ms.saturating_add(self.system_speaking_ms);
        if total == 0 {
            return DominantSpeaker::Unknown;
        }

        let caller_share = self.caller_speaking_ms as f64 / total as f64;
        let system_share = self.system_speaking_ms as f64 / total as f64;

        if caller_share > DOMINANCE_THRESHOLD {
            DominantSpeaker::Caller
        } else if system_share > DOMINANCE_THRESHOLD {
            DominantSpeaker::System
        } else {
            DominantSpeaker::Balanced
        }
    }

    pub fn segments(&self) -> &[ConversationSegment] {
        &self.segments
    }

    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    pub fn dominant_speaker(&self) -> DominantSpeaker {
        self.dominant
    }

    pub fn metrics(&self) -> ConversationMetrics {
        let total_ms = self.caller_speaking_ms.saturating_add(self.system_speaking_ms);
        let percentage = |ms: u64| {
            if total_ms == 0 {
                0.0
            } else {
                ms as f64 * 100.0 / total_ms as f64
            }
        };

        let durations = self.segments.iter().map(|s| s.duration_ms());
        let longest = durations.clone().max().unwrap_or(0);
        let average = if self.segments.is_empty() {
            0.0
        } else {
            durations.fold(0u64, |acc, d| acc.saturating_add(d)) as f64 / self.segments.len() as f64
        };

        let interruptions_per_minute = if total_ms == 0 {
            0.0
        } else {
            self.interruptions as f64 / (total_ms as f64 / 60_000.0)
        };

        ConversationMetrics {
            total_segments: self.segments.len(),
            caller_segments: self.segments.iter().filter(|s| s.speaker == Speaker::Caller).count(),
            system_segments: self.segments.iter().filter(|s| s.speaker == Speaker::System).count(),
            caller_speaking_time_ms: self.caller_speaking_ms,
            system_speaking_time_ms: self.system_speaking_ms,
            total_speaking_time_ms: total_ms,
            caller_speaking_percentage: percentage(self.caller_speaking_ms),
            system_speaking_percentage: percentage(self.system_speaking_ms),
            average_segment_duration_ms: average,
            longest_segment_duration_ms: longest,
            interruptions: self.interruptions,
            interruptions_per_minute,
            dominant_speaker: self.dominant,
        }
    }

    pub fn reset(&mut self) {
        self.segments = Vec::new();
        self.caller_last_voice_ms = None;
        self.system_last_voice_ms = None;
        self.caller_speaking_ms = 0;
        self.system_speaking_ms = 0;
        self.interruptions = 0;
        self.dominant = DominantSpeaker::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ConversationAnalyzer {
        ConversationAnalyzer::new(ConversationConfig::from(&RecordingConfig::default()))
    }

    fn voiced() -> VoiceActivity {
        VoiceActivity {
            has_voice: true,
            energy: 0.05,
            peak: 0.3,
            zero_crossing_rate: 0.1,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_adjacent_chunks_merge() {
        let mut conv = analyzer();
        for i in 0..10 {
            conv.observe(Speaker::Caller, &voiced(), i * 20, 20);
        }

        assert_eq!(conv.segments().len(), 1);
        assert_eq!(conv.segments()[0].duration_ms(), 200);
        assert_eq!(conv.metrics().caller_speaking_time_ms, 200);
    }

    #[test]
    fn test_gap_opens_new_segment() {
        let mut conv = analyzer();
        conv.observe(Speaker::Caller, &voiced(), 0, 20);
        conv.observe(Speaker::Caller, &voiced(), 20 + 250, 20);

        assert_eq!(conv.segments().len(), 2);
        assert_eq!(conv.metrics().caller_speaking_time_ms, 40);
    }

    #[test]
    fn test_silence_is_ignored() {
        let mut conv = analyzer();
        conv.observe(Speaker::System, &VoiceActivity::default(), 0, 20);
        assert!(conv.segments().is_empty());
        assert_eq!(conv.dominant_speaker(), DominantSpeaker::Unknown);
    }

    #[test]
    fn test_interruption_counted_once_per_turn() {
        let mut conv = analyzer();
        for i in 0..5 {
            conv.observe(Speaker::Caller, &voiced(), i * 20, 20);
        }
        for i in 0..5 {
            conv.observe(Speaker::System, &voiced(), 150 + i * 20, 20);
        }

        assert_eq!(conv.interruptions(), 1);
    }

    #[test]
    fn test_no_interruption_after_window() {
        let mut conv = analyzer();
        conv.observe(Speaker::Caller, &voiced(), 0, 20);
        conv.observe(Speaker::System, &voiced(), 1000, 20);

        assert_eq!(conv.interruptions(), 0);
    }

    #[test]
    fn test_dominant_speaker() {
        let mut conv = analyzer();
        conv.observe(Speaker::Caller, &voiced(), 0, 700);
        conv.observe(Speaker::System, &voiced(), 2000, 300);
        assert_eq!(conv.dominant_speaker(), DominantSpeaker::Caller);

        conv.observe(Speaker::System, &voiced(), 3000, 500);
        assert_eq!(conv.dominant_speaker(), DominantSpeaker::Balanced);

        conv.observe(Speaker::System, &voiced(), 4000, 1000);
        assert_eq!(conv.dominant_speaker(), DominantSpeaker::System);
    }

    #[test]
    fn test_segment_list_is_pruned() {
        let mut conv = analyzer();
        for i in 0..1001u64 {
            conv.observe(Speaker::Caller, &voiced(), i * 1000, 20);
        }

        assert_eq!(conv.segments().len(), 500);
        // Totals survive pruning
        assert_eq!(conv.metrics().caller_speaking_time_ms, 1001 * 20);
        assert_eq!(conv.segments().last().unwrap().start_ms, 1_000_000);
    }

    #[test]
    fn test_metrics() {
        let mut conv = analyzer();
        conv.observe(Speaker::Caller, &voiced(), 0, 400);
        conv.observe(Speaker::System, &voiced(), 500, 200);

        let metrics = conv.metrics();
        assert_eq!(metrics.total_segments, 2);
        assert_eq!(metrics.longest_segment_duration_ms, 400);
        assert_eq!(metrics.average_segment_duration_ms, 300.0);
        assert!((metrics.caller_speaking_percentage - 66.666).abs() < 0.01);
        // 1 interruption over 0.6s of speech
        assert_eq!(metrics.interruptions, 1);
        assert!((metrics.interruptions_per_minute - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut conv = analyzer();
        conv.observe(Speaker::Caller, &voiced(), 0, 400);
        conv.reset();
        assert_eq!(conv.metrics().total_segments, 0);
        assert_eq!(conv.dominant_speaker(), DominantSpeaker::Unknown);
    }
}

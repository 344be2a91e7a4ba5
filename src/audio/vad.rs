// Per-track voice activity tracking
//
// Wraps the stateless window classifier in `codec` with running counters.
// One `VadState` belongs to exactly one track of one call.

use serde::{Deserialize, Serialize};

use super::codec::{self, VoiceActivity};

/// Running voice activity counters for a single track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadState {
    /// Silent frames since the last voiced frame
    pub consecutive_silent_frames: u64,
    /// Every classified frame, voiced or not
    pub total_frames: u64,
    /// Whether any voiced frame has been seen in this episode
    pub has_detected_voice: bool,
}

impl VadState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classified frame into the counters
    pub fn update(&mut self, activity: &VoiceActivity) {
        self.total_frames += 1;

        if activity.has_voice {
            self.consecutive_silent_frames = 0;
            self.has_detected_voice = true;
        } else {
            self.consecutive_silent_frames += 1;
        }
    }

    /// Classify `samples` and fold the result in, returning the classification
    pub fn process(&mut self, samples: &[i16], window_size: usize) -> VoiceActivity {
        let activity = codec::detect_voice_activity(samples, window_size);
        self.update(&activity);
        activity
    }

    /// Start a new collection episode
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced() -> VoiceActivity {
        VoiceActivity {
            has_voice: true,
            energy: 0.1,
            peak: 0.5,
            zero_crossing_rate: 0.1,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_silent_frames_accumulate() {
        let mut state = VadState::new();
        state.update(&VoiceActivity::default());
        state.update(&VoiceActivity::default());

        assert_eq!(state.total_frames, 2);
        assert_eq!(state.consecutive_silent_frames, 2);
        assert!(!state.has_detected_voice);
    }

    #[test]
    fn test_voiced_frame_resets_silence() {
        let mut state = VadState::new();
        state.update(&VoiceActivity::default());
        state.update(&voiced());
        state.update(&VoiceActivity::default());

        assert_eq!(state.total_frames, 3);
        assert_eq!(state.consecutive_silent_frames, 1);
        assert!(state.has_detected_voice);
    }

    #[test]
    fn test_reset() {
        let mut state = VadState::new();
        state.update(&voiced());
        state.reset();
        assert_eq!(state, VadState::default());
    }

    #[test]
    fn test_process_silence() {
        let mut state = VadState::new();
        let activity = state.process(&[0; 160], 160);
        assert!(!activity.has_voice);
        assert_eq!(state.total_frames, 1);
    }
}

// Telephony audio codec helpers
//
// Stateless conversions used on the ingestion hot path and at finalization:
// - G.711 μ-law <-> 16-bit linear PCM
// - WAV container framing (mono, 16-bit PCM)
// - mixing, normalization, dynamic range compression, noise gating
// - energy / zero-crossing voice activity classification
//
// None of these functions panic or return errors. Empty input yields `None`
// or an unchanged copy and callers decide what to do with it.

use serde::{Deserialize, Serialize};

/// Default telephony sample rate (Twilio-style media streams)
pub const DEFAULT_SAMPLE_RATE: u32 = 8000;

/// Size of the canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// Mean squared energy (normalized samples) a window must exceed to count as speech
pub const ENERGY_THRESHOLD: f32 = 0.002;

/// Zero crossings per sample a window must exceed to count as speech
pub const ZCR_THRESHOLD: f32 = 0.01;

/// Normalized peak magnitude a window must exceed to count as speech
pub const PEAK_THRESHOLD: f32 = 0.05;

/// Magnitude above which `compress_dynamic_range` starts scaling
pub const COMPRESSION_THRESHOLD: i32 = 16_384;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32_635;

const fn expand(byte: u8) -> i16 {
    let u = !byte;
    let sign = u & 0x80;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantissa = (u & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = expand(i as u8);
        i += 1;
    }
    table
}

/// μ-law expansion table, computed once at compile time
static MULAW_DECODE_TABLE: [i16; 256] = build_decode_table();

/// Expand one μ-law byte to a 16-bit linear sample
#[inline]
pub fn decode(byte: u8) -> i16 {
    MULAW_DECODE_TABLE[byte as usize]
}

/// Compress one 16-bit linear sample to μ-law
pub fn encode(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while magnitude & mask == 0 && exponent > 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Expand a μ-law byte buffer to linear samples
pub fn decode_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes.iter().map(|&b| decode(b)).collect()
}

/// Compress linear samples to a μ-law byte buffer
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&s| encode(s)).collect()
}

/// Playback length of `samples` mono samples (one μ-law byte each) in milliseconds
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u64).saturating_mul(1000) / sample_rate as u64
}

/// Zero every sample whose magnitude is below `threshold`
pub fn apply_noise_gate(samples: &[i16], threshold: i16) -> Vec<i16> {
    let threshold = (threshold as i32).abs();
    samples
        .iter()
        .map(|&s| if (s as i32).abs() < threshold { 0 } else { s })
        .collect()
}

/// Result of classifying one analysis window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceActivity {
    pub has_voice: bool,
    /// Mean squared energy of normalized samples
    pub energy: f32,
    /// Peak normalized magnitude (0.0 to 1.0)
    pub peak: f32,
    /// Zero crossings per sample
    pub zero_crossing_rate: f32,
    /// Energy relative to twice the threshold, capped at 1.0
    pub confidence: f32,
}

/// Classify a window of samples as speech or silence
///
/// Speech requires energy, zero-crossing rate and peak all above their
/// thresholds. Windows shorter than `window_size` are reported as silent.
pub fn detect_voice_activity(samples: &[i16], window_size: usize) -> VoiceActivity {
    if samples.is_empty() || samples.len() < window_size {
        return VoiceActivity::default();
    }

    let scale = i16::MAX as f32;
    let mut energy = 0.0f32;
    let mut peak = 0.0f32;
    let mut crossings = 0usize;
    let mut previous: Option<i16> = None;

    for &sample in samples {
        let value = sample as f32 / scale;
        energy += value * value;
        peak = peak.max(value.abs());

        if let Some(prev) = previous {
            if (prev >= 0) != (sample >= 0) {
                crossings += 1;
            }
        }
        previous = Some(sample);
    }

    let count = samples.len() as f32;
    let energy = energy / count;
    let zero_crossing_rate = crossings as f32 / count;

    let has_voice =
        energy > ENERGY_THRESHOLD && zero_crossing_rate > ZCR_THRESHOLD && peak > PEAK_THRESHOLD;
    let confidence = (energy / (ENERGY_THRESHOLD * 2.0)).min(1.0);

    VoiceActivity {
        has_voice,
        energy,
        peak,
        zero_crossing_rate,
        confidence,
    }
}

/// Build the 44-byte RIFF/WAVE header for mono 16-bit PCM
pub fn build_container_header(data_size: u32, sample_rate: u32) -> [u8; WAV_HEADER_LEN] {
    const CHANNELS: u16 = 1;
    const BITS_PER_SAMPLE: u16 = 16;

    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&data_size.saturating_add(36).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Frame linear samples as a playable WAV file
pub fn to_container(samples: &[i16], sample_rate: u32) -> Option<Vec<u8>> {
    if samples.is_empty() {
        return None;
    }

    let data_size = u32::try_from(samples.len() * 2).ok()?;
    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);
    out.extend_from_slice(&build_container_header(data_size, sample_rate));
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }

    Some(out)
}

/// Mix tracks of possibly different lengths into one
///
/// Shorter tracks contribute silence past their end and every output sample
/// is clipped to the 16-bit range. Without weights each track gets `1/n`.
pub fn mix(tracks: &[&[i16]], weights: Option<&[f32]>) -> Option<Vec<i16>> {
    match tracks.len() {
        0 => return None,
        1 => return Some(tracks[0].to_vec()),
        _ => {}
    }

    let equal = 1.0 / tracks.len() as f32;
    let weight_for = |index: usize| -> f32 {
        weights
            .and_then(|w| w.get(index).copied())
            .unwrap_or(equal)
    };

    let max_len = tracks.iter().map(|t| t.len()).max().unwrap_or(0);
    if max_len == 0 {
        return None;
    }

    let mut mixed = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let mut sum = 0.0f32;
        for (index, track) in tracks.iter().enumerate() {
            if let Some(&sample) = track.get(i) {
                sum += sample as f32 * weight_for(index);
            }
        }
        mixed.push(clamp_sample(sum));
    }

    Some(mixed)
}

/// Scale samples so the peak lands at `target_level` of full scale
pub fn normalize(samples: &[i16], target_level: f32) -> Vec<i16> {
    let peak = samples
        .iter()
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0);

    if peak == 0 {
        return samples.to_vec();
    }

    let gain = target_level * i16::MAX as f32 / peak as f32;
    samples.iter().map(|&s| clamp_sample(s as f32 * gain)).collect()
}

/// Above-threshold compression: the excess over `COMPRESSION_THRESHOLD`
/// is multiplied by `ratio` (0.25 behaves like a 4:1 compressor)
pub fn compress_dynamic_range(samples: &[i16], ratio: f32) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let magnitude = (s as i32).abs();
            if magnitude <= COMPRESSION_THRESHOLD {
                return s;
            }

            let excess = (magnitude - COMPRESSION_THRESHOLD) as f32 * ratio;
            let compressed = COMPRESSION_THRESHOLD as f32 + excess;
            if s < 0 {
                clamp_sample(-compressed)
            } else {
                clamp_sample(compressed)
            }
        })
        .collect()
}

fn clamp_sample(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_silence_bytes() {
        assert_eq!(decode(0xFF), 0);
        assert_eq!(decode(0x7F), 0);
    }

    #[test]
    fn test_decode_extremes() {
        assert_eq!(decode(0x00), -32124);
        assert_eq!(decode(0x80), 32124);
    }

    #[test]
    fn test_encode_decode_round_trip_all_codes() {
        for byte in 0..=255u8 {
            let linear = decode(byte);
            assert_eq!(decode(encode(linear)), linear, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn test_encode_quantization_error_is_bounded() {
        for sample in (i16::MIN as i32 + 1..=i16::MAX as i32).step_by(97) {
            let sample = sample as i16;
            let restored = decode(encode(sample)) as i32;
            let error = (restored - sample as i32).abs();
            // Largest step in the top segment is 1024
            assert!(error <= 1024 || (sample as i32).abs() > MULAW_CLIP, "sample {}", sample);
        }
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(160, 8000), 20);
        assert_eq!(duration_ms(8000, 8000), 1000);
        assert_eq!(duration_ms(160, 0), 0);
    }

    #[test]
    fn test_noise_gate() {
        let gated = apply_noise_gate(&[10, -10, 500, -500, 99], 100);
        assert_eq!(gated, vec![0, 0, 500, -500, 0]);
        assert!(apply_noise_gate(&[], 100).is_empty());
    }

    #[test]
    fn test_vad_all_zero_window() {
        let activity = detect_voice_activity(&[0; 320], 160);
        assert!(!activity.has_voice);
        assert_eq!(activity.energy, 0.0);
        assert_eq!(activity.confidence, 0.0);
    }

    #[test]
    fn test_vad_short_input() {
        let activity = detect_voice_activity(&[8000; 10], 160);
        assert_eq!(activity, VoiceActivity::default());
    }

    #[test]
    fn test_vad_tone_is_voice() {
        let tone: Vec<i16> = (0..320)
            .map(|i| {
                let t = i as f32 / 8000.0;
                (8000.0 * (2.0 * std::f32::consts::PI * 400.0 * t).sin()) as i16
            })
            .collect();

        let activity = detect_voice_activity(&tone, 160);
        assert!(activity.has_voice);
        assert_eq!(activity.confidence, 1.0);
    }

    #[test]
    fn test_vad_rejects_dc_offset() {
        // Loud but never crosses zero
        let activity = detect_voice_activity(&[12000; 320], 160);
        assert!(activity.energy > ENERGY_THRESHOLD);
        assert!(!activity.has_voice);
    }

    #[test]
    fn test_container_header_fields() {
        let header = build_container_header(16000, 8000);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(header[4..8].try_into().unwrap()), 16036);
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(u32::from_le_bytes(header[24..28].try_into().unwrap()), 8000);
        assert_eq!(u32::from_le_bytes(header[28..32].try_into().unwrap()), 16000);
        assert_eq!(&header[36..40], b"data");
        assert_eq!(u32::from_le_bytes(header[40..44].try_into().unwrap()), 16000);
    }

    #[test]
    fn test_to_container_empty() {
        assert!(to_container(&[], 8000).is_none());
    }

    #[test]
    fn test_to_container_layout() {
        let wav = to_container(&[1, -2], 8000).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN + 4);
        assert_eq!(&wav[44..], &[1, 0, 0xFE, 0xFF]);
    }

    #[test]
    fn test_mix_single_track_unchanged() {
        let track = [100i16, -200, 300];
        assert_eq!(mix(&[&track[..]], None).unwrap(), track.to_vec());
    }

    #[test]
    fn test_mix_different_lengths() {
        let a = [100i16, 200];
        let b = [50i16, 100, 150, 200];
        let mixed = mix(&[&a[..], &b[..]], Some(&[1.0f32, 1.0][..])).unwrap();

        assert_eq!(mixed, vec![150, 300, 150, 200]);
    }

    #[test]
    fn test_mix_default_equal_weights() {
        let a = [100i16, 200];
        let b = [300i16, 400];
        assert_eq!(mix(&[&a[..], &b[..]], None).unwrap(), vec![200, 300]);
    }

    #[test]
    fn test_mix_with_clipping() {
        let a = [i16::MAX - 100];
        let b = [200i16];
        let mixed = mix(&[&a[..], &b[..]], Some(&[1.0f32, 1.0][..])).unwrap();
        assert_eq!(mixed[0], i16::MAX);
    }

    #[test]
    fn test_mix_empty() {
        assert!(mix(&[], None).is_none());
    }

    #[test]
    fn test_normalize_peak() {
        let normalized = normalize(&[1000, -2000, 500], 0.5);
        let peak = normalized.iter().map(|&s| (s as i32).abs()).max().unwrap();
        assert!((peak - 16384).abs() <= 1, "peak {}", peak);
        assert!(normalized[1] < 0);
    }

    #[test]
    fn test_normalize_silence_noop() {
        assert_eq!(normalize(&[0, 0, 0], 0.9), vec![0, 0, 0]);
    }

    #[test]
    fn test_compress_dynamic_range() {
        let compressed = compress_dynamic_range(&[1000, 20384, -20384], 0.5);
        assert_eq!(compressed, vec![1000, 18384, -18384]);
    }
}

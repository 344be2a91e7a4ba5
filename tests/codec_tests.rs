// Integration tests for the μ-law codec and WAV containers
//
// Containers are parsed back with hound to check they are valid 16-bit
// mono PCM at the telephony rate.

use anyhow::Result;
use call_recorder::audio::codec;
use std::io::Cursor;

fn tone(samples: usize, amplitude: f32) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / 8000.0;
            (amplitude * (2.0 * std::f32::consts::PI * 400.0 * t).sin()) as i16
        })
        .collect()
}

#[test]
fn test_container_parses_as_pcm_wav() -> Result<()> {
    let samples = tone(8000, 8000.0);
    let wav = codec::to_container(&samples, 8000).expect("non-empty container");

    assert_eq!(wav.len(), codec::WAV_HEADER_LEN + 16_000);

    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(reader.len(), 8000);

    let decoded: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(decoded, samples);
    Ok(())
}

#[test]
fn test_mulaw_stream_to_container() -> Result<()> {
    let original = tone(1600, 8000.0);
    let encoded = codec::encode_samples(&original);
    assert_eq!(encoded.len(), 1600);

    let decoded = codec::decode_bytes(&encoded);
    let wav = codec::to_container(&decoded, 8000).expect("non-empty container");
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    assert_eq!(reader.duration(), 1600);

    // Companding error stays small relative to the signal
    for (a, b) in original.iter().zip(&decoded) {
        assert!((*a as i32 - *b as i32).abs() < 300, "{} vs {}", a, b);
    }
    Ok(())
}

#[test]
fn test_mixed_and_normalized_container() -> Result<()> {
    let caller = tone(800, 8000.0);
    let system = tone(1600, 4000.0);

    let mixed = codec::mix(&[&caller[..], &system[..]], Some(&[1.0f32, 1.0][..]))
        .expect("two tracks");
    assert_eq!(mixed.len(), 1600);

    let normalized = codec::normalize(&mixed, 0.9);
    let peak = normalized.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0);
    let target = (0.9 * i16::MAX as f32) as i32;
    assert!((peak - target).abs() <= 1, "peak {} target {}", peak, target);

    let wav = codec::to_container(&normalized, 8000).expect("non-empty container");
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    assert_eq!(reader.len(), 1600);
    Ok(())
}

#[test]
fn test_silence_bytes_are_not_voice() {
    let silence = codec::decode_bytes(&[0xFF; 160]);
    assert!(silence.iter().all(|&s| s == 0));
    assert!(!codec::detect_voice_activity(&silence, 160).has_voice);

    let speech = codec::decode_bytes(&codec::encode_samples(&tone(160, 8000.0)));
    assert!(codec::detect_voice_activity(&speech, 160).has_voice);
}

use tempfile::tempdir;

use crate::audio::format::{decode_audio_file, decode_wav_file, duration_in_seconds, encode_wav, peak_amplitude};
use crate::audio::FileAudioMeter;
use crate::services::AudioMeter;

fn sine(freq: f32, seconds: f32, sample_rate: u32, amplitude: f32) -> Vec<f32> {
    (0..(seconds * sample_rate as f32) as usize)
        .map(|i| (i as f32 / sample_rate as f32 * freq * 2.0 * std::f32::consts::PI).sin() * amplitude)
        .collect()
}

#[test]
fn test_duration_calculation() {
    assert_eq!(duration_in_seconds(44100, 44100), 1.0);
    assert_eq!(duration_in_seconds(22050, 44100), 0.5);
    assert_eq!(duration_in_seconds(0, 44100), 0.0);
    assert_eq!(duration_in_seconds(100, 0), 0.0);
}

#[test]
fn test_peak_amplitude() {
    assert_eq!(peak_amplitude(&[0.1, -0.7, 0.3]), 0.7);
    assert_eq!(peak_amplitude(&[]), 0.0);
}

#[test]
fn test_wav_encode_decode() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let samples = sine(440.0, 0.5, 16000, 0.5);

    encode_wav(&samples, 16000, &path).unwrap();
    let (decoded, rate) = decode_wav_file(&path).unwrap();

    assert_eq!(rate, 16000);
    assert_eq!(decoded.len(), samples.len());
    let max_diff = samples
        .iter()
        .zip(&decoded)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);
    assert!(max_diff < 0.001, "16-битное квантование дает малую ошибку, получено {}", max_diff);
}

#[test]
fn test_stereo_wav_is_downmixed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..800 {
        writer.write_sample(16384i16).unwrap();
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let (mono, rate) = decode_audio_file(&path).unwrap();
    assert_eq!(rate, 8000);
    assert_eq!(mono.len(), 800);
    assert!((mono[0] - 0.25).abs() < 0.001);
}

#[test]
fn test_unknown_format_is_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("noise.mp3");
    std::fs::write(&path, b"definitely not audio").unwrap();
    assert!(decode_audio_file(&path).is_err());
}

#[tokio::test]
async fn test_file_meter_reports_duration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    encode_wav(&sine(220.0, 1.5, 22050, 0.4), 22050, &path).unwrap();

    let info = FileAudioMeter.measure(&path).await.unwrap();
    assert!((info.duration - 1.5).abs() < 0.001);
    assert_eq!(info.sample_rate, 22050);
}

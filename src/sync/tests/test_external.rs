use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioInfo;
use crate::config::SyncConfig;
use crate::errors::{AppError, Result};
use crate::services::AlignmentService;
use crate::sync::external::{apply_onset_correction, fill_missing, parse_alignment_response};
use crate::sync::{
    validate_timeline, ExternalAlignment, ProportionalAlignment, SyncAudio, Synchronizer, TimestampsSource,
};

const RATE: u32 = 16000;

const RESPONSE: &str = r#"분석 결과입니다:
```json
{"audio_duration": 5.0, "voice_start": 0.3, "voice_end": 5.0, "segments": [
  {"index": 2, "start": 2.0, "end": 3.5},
  {"index": 1, "start": 0.3, "end": 1.9},
  {"index": 3, "start": null, "end": 4.0},
  {"index": 3, "start": 4.0, "end": 4.02},
  {"index": 9, "start": 4.1, "end": 4.5},
  {"index": 2, "start": 3.6, "end": 4.4},
  {"index": 3, "start": 4.5, "end": 6.0}
]}
```"#;

struct FixedAlignment(String);

#[async_trait]
impl AlignmentService for FixedAlignment {
    async fn align(&self, _audio: &Path, _texts: &[String]) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct BusyAlignment;

#[async_trait]
impl AlignmentService for BusyAlignment {
    async fn align(&self, _audio: &Path, _texts: &[String]) -> Result<String> {
        Err(AppError::ServerOverloaded("model is overloaded".to_string()))
    }
}

fn clip(lead: f64, voiced: f64) -> AudioInfo {
    let mut samples = vec![0.0f32; (lead * RATE as f64) as usize];
    samples.extend(
        (0..(voiced * RATE as f64) as usize)
            .map(|i| (i as f32 / RATE as f32 * 220.0 * 2.0 * std::f32::consts::PI).sin() * 0.6),
    );
    AudioInfo::from_samples(samples, RATE)
}

fn texts() -> Vec<String> {
    vec!["첫 번째 자막".to_string(), "두 번째 자막".to_string(), "세 번째".to_string()]
}

#[test]
fn test_parse_filters_sorts_and_dedups() {
    let parsed = parse_alignment_response(RESPONSE, 3, 5.0).unwrap();

    assert_eq!(parsed.voice_start, 0.3);
    assert_eq!(parsed.audio_duration, Some(5.0));
    assert_eq!(parsed.entries, vec![(0, 0.3, 1.9), (1, 2.0, 3.5), (2, 4.5, 5.0)]);
}

#[test]
fn test_parse_discards_negative_start() {
    let raw = r#"{"segments": [
        {"index": 1, "start": -0.4, "end": 1.0},
        {"index": 2, "start": 1.2, "end": 2.0}
    ]}"#;
    let parsed = parse_alignment_response(raw, 2, 3.0).unwrap();
    assert_eq!(parsed.entries, vec![(1, 1.2, 2.0)]);
}

#[test]
fn test_parse_without_json_fails() {
    assert!(parse_alignment_response("모르겠습니다", 3, 5.0).is_err());
}

#[test]
fn test_onset_mismatch_shifts_everything() {
    let mut entries = vec![(0, 1.0, 2.0), (1, 0.2, 0.25)];
    apply_onset_correction(&mut entries, 0.5, 0.2, 0.1);

    assert!((entries[0].1 - 0.7).abs() < 1e-9);
    assert!((entries[0].2 - 1.7).abs() < 1e-9);
    assert_eq!(entries[1].1, 0.0);
    assert!((entries[1].2 - 0.1).abs() < 1e-9);
}

#[test]
fn test_onset_within_tolerance_is_kept() {
    let mut entries = vec![(0, 1.0, 2.0)];
    apply_onset_correction(&mut entries, 0.35, 0.3, 0.1);
    assert_eq!(entries, vec![(0, 1.0, 2.0)]);
}

#[test]
fn test_missing_segments_fill_their_gap() {
    let texts = vec!["가나".to_string(), "다라마바".to_string(), "사아".to_string()];

    let segments = fill_missing(&texts, &[(0, 0.0, 1.0), (2, 3.0, 4.0)], 0.0, 5.0, 0.005);
    assert_eq!(segments.len(), 3);
    assert!((segments[1].start - 1.0).abs() < 1e-9);
    assert!((segments[1].end - 3.0).abs() < 1e-9);

    let segments = fill_missing(&texts, &[(0, 0.0, 1.0)], 0.0, 5.0, 0.005);
    assert!((segments[1].end - (1.0 + 4.0 * 4.0 / 6.0)).abs() < 1e-9);
    assert!(segments[2].end <= 5.0);
    assert!(validate_timeline(&segments, 5.0, 0.01, 0.05).is_ok());
}

#[tokio::test]
async fn test_external_strategy_wins_when_available() {
    let info = clip(0.3, 4.7);
    let audio = SyncAudio {
        path: Path::new("narration.wav"),
        info: &info,
    };
    let config = SyncConfig::default();
    let sync = Synchronizer::new(config.clone())
        .with_strategy(Box::new(ExternalAlignment::new(
            Arc::new(FixedAlignment(RESPONSE.to_string())),
            config.clone(),
        )))
        .with_strategy(Box::new(ProportionalAlignment::new(config)));

    let (segments, metadata) = sync.align(&texts(), audio, 1.2, &CancellationToken::new()).await.unwrap();

    assert_eq!(metadata.timestamps_source, TimestampsSource::ExternalAlignment);
    assert_eq!(segments.len(), 3);
    assert!((segments[0].start - 0.3).abs() < 0.02);
    assert!((segments[2].start - 4.5).abs() < 0.02);
}

#[tokio::test]
async fn test_falls_back_to_proportional() {
    let info = clip(0.3, 2.7);
    let audio = SyncAudio {
        path: Path::new("narration.wav"),
        info: &info,
    };
    let config = SyncConfig::default();
    let sync = Synchronizer::new(config.clone())
        .with_strategy(Box::new(ExternalAlignment::new(Arc::new(BusyAlignment), config.clone())))
        .with_strategy(Box::new(ProportionalAlignment::new(config)));

    let (segments, metadata) = sync.align(&texts(), audio, 1.2, &CancellationToken::new()).await.unwrap();

    assert_eq!(metadata.timestamps_source, TimestampsSource::ProportionalFallback);
    assert_eq!(metadata.speed_ratio, 1.2);
    assert!((metadata.start_offset - 0.3).abs() < 0.02);
    assert_eq!(segments.len(), 3);
    assert!(validate_timeline(&segments, info.duration, 0.01, 0.05).is_ok());
}

#[tokio::test]
async fn test_no_texts_gives_empty_timeline() {
    let info = clip(0.0, 1.0);
    let audio = SyncAudio {
        path: Path::new("narration.wav"),
        info: &info,
    };
    let sync = Synchronizer::with_services(SyncConfig::default(), None, None);
    let (segments, _) = sync.align(&[], audio, 1.0, &CancellationToken::new()).await.unwrap();
    assert!(segments.is_empty());
}

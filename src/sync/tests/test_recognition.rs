use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioInfo;
use crate::config::SyncConfig;
use crate::errors::Result;
use crate::services::{SpeechRecognizer, WordTiming};
use crate::sync::recognition::{map_words, normalize};
use crate::sync::{validate_timeline, AlignmentStrategy, RecognitionAlignment, SubtitleSegment, SyncAudio};

fn word(w: &str, start: f64, end: f64) -> WordTiming {
    WordTiming {
        word: w.to_string(),
        start,
        end,
    }
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct FixedWords(Vec<WordTiming>);

#[async_trait]
impl SpeechRecognizer for FixedWords {
    async fn transcribe(&self, _audio: &Path, _cancel: &CancellationToken) -> Result<Vec<WordTiming>> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_words_consumed_by_character_budget() {
    let words = vec![
        word("안녕하세요", 0.1, 0.6),
        word("여러분", 0.65, 1.0),
        word("오늘은", 1.2, 1.5),
        word("라면입니다.", 1.55, 2.2),
    ];
    let segments = map_words(&texts(&["안녕하세요 여러분", "오늘은 라면입니다."]), &words, 3.0);

    assert_eq!(segments.len(), 2);
    assert_eq!((segments[0].start, segments[0].end), (0.1, 1.0));
    assert_eq!((segments[1].start, segments[1].end), (1.2, 2.2));
}

#[test]
fn test_unmatched_segment_gets_proportional_slot() {
    let words = vec![word("하나", 0.0, 0.5), word(",", 0.5, 0.6)];
    let segments = map_words(&texts(&["하나", "둘", "셋"]), &words, 3.0);

    assert_eq!((segments[0].start, segments[0].end), (0.0, 0.5));
    assert!((segments[1].start - 1.0).abs() < 1e-9);
    assert!((segments[1].end - 2.0).abs() < 1e-9);
    assert!((segments[2].end - 3.0).abs() < 1e-9);
}

#[test]
fn test_overlap_is_nudged_keeping_duration() {
    let mut segments = vec![
        SubtitleSegment::new(1, "가나다", 0.0, 1.0),
        SubtitleSegment::new(2, "라마바", 0.8, 1.5),
    ];
    normalize(&mut segments, 3.0, 0.005, 0.05);

    assert!((segments[1].start - 1.005).abs() < 1e-9);
    assert!((segments[1].end - 1.705).abs() < 1e-9);
}

#[test]
fn test_large_overshoot_scales_timeline() {
    let mut segments = vec![
        SubtitleSegment::new(1, "가나", 0.0, 1.0),
        SubtitleSegment::new(2, "다라", 1.0, 2.5),
    ];
    normalize(&mut segments, 2.0, 0.005, 0.05);

    assert!((segments[1].end - 1.995).abs() < 1e-6);
    assert!(validate_timeline(&segments, 2.0, 0.01, 0.05).is_ok());
}

#[test]
fn test_small_overshoot_clamps_last_end() {
    let mut segments = vec![
        SubtitleSegment::new(1, "가나", 0.0, 1.0),
        SubtitleSegment::new(2, "다라", 1.0, 2.03),
    ];
    normalize(&mut segments, 2.0, 0.005, 0.05);

    assert_eq!(segments[0].end, 1.0);
    assert!((segments[1].end - 1.995).abs() < 1e-9);
}

#[test]
fn test_non_positive_duration_gets_fallback() {
    let mut segments = vec![SubtitleSegment::new(1, "가나", 0.5, 0.5)];
    normalize(&mut segments, 2.0, 0.005, 0.05);
    assert!((segments[0].end - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_strategy_requires_words() {
    let info = AudioInfo::from_samples(vec![0.0; 16000], 16000);
    let audio = SyncAudio {
        path: Path::new("narration.wav"),
        info: &info,
    };
    let empty = RecognitionAlignment::new(Arc::new(FixedWords(Vec::new())), SyncConfig::default());
    assert!(empty.align(&texts(&["하나"]), audio, &CancellationToken::new()).await.is_err());

    let recognizer = FixedWords(vec![word("하나", 0.1, 0.4), word("둘", 0.5, 0.9)]);
    let strategy = RecognitionAlignment::new(Arc::new(recognizer), SyncConfig::default());
    let segments = strategy.align(&texts(&["하나", "둘"]), audio, &CancellationToken::new()).await.unwrap();
    assert_eq!(segments.len(), 2);
    assert!(validate_timeline(&segments, 1.0, 0.01, 0.05).is_ok());
}

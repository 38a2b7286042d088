//! Выравнивание по распознанным словам
//!
//! Слова распознавателя последовательно распределяются по сегментам: каждый
//! сегмент забирает слова, пока не наберет столько же произносимых символов,
//! сколько в его тексте.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use super::timeline::{fix_overlaps, settle, spoken_chars};
use super::{AlignmentStrategy, SubtitleSegment, SyncAudio, TimestampsSource};
use crate::config::SyncConfig;
use crate::errors::{AppError, Result};
use crate::services::{SpeechRecognizer, WordTiming};

const FALLBACK_DURATION: f64 = 0.3;

pub struct RecognitionAlignment {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: SyncConfig,
}

impl RecognitionAlignment {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: SyncConfig) -> Self {
        Self { recognizer, config }
    }
}

#[async_trait]
impl AlignmentStrategy for RecognitionAlignment {
    fn source(&self) -> TimestampsSource {
        TimestampsSource::LocalRecognition
    }

    async fn align(
        &self,
        texts: &[String],
        audio: SyncAudio<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubtitleSegment>> {
        let words = self.recognizer.transcribe(audio.path, cancel).await?;
        if words.is_empty() {
            return Err(AppError::Sync("recognizer returned no words".to_string()));
        }
        info!("[sync] recognized {} word(s)", words.len());

        let mut segments = map_words(texts, &words, audio.info.duration);
        normalize(
            &mut segments,
            audio.info.duration,
            self.config.min_gap,
            self.config.end_tolerance,
        );
        Ok(segments)
    }
}

/// Привязывает слова к сегментам по бюджету символов. Сегменты без слов
/// получают равную долю всего аудио.
pub fn map_words(texts: &[String], words: &[WordTiming], audio_duration: f64) -> Vec<SubtitleSegment> {
    let total = texts.len();
    let mut word_idx = 0;

    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let budget = spoken_chars(text);
            let mut matched = 0;
            let mut first: Option<&WordTiming> = None;
            let mut last: Option<&WordTiming> = None;

            while word_idx < words.len() && matched < budget {
                let word = &words[word_idx];
                word_idx += 1;
                let len = spoken_chars(&word.word);
                if len == 0 {
                    continue;
                }
                if first.is_none() {
                    first = Some(word);
                }
                last = Some(word);
                matched += len;
            }

            let (start, end) = match (first, last) {
                (Some(first), Some(last)) => (first.start, last.end),
                _ => {
                    debug!("[sync] no words for segment {}, using proportional slot", i + 1);
                    (
                        i as f64 / total as f64 * audio_duration,
                        (i + 1) as f64 / total as f64 * audio_duration,
                    )
                }
            };
            SubtitleSegment::new(i + 1, text.clone(), start, end)
        })
        .collect()
}

fn min_duration(text: &str, floor: f64, per_char: f64) -> f64 {
    floor.max(spoken_chars(text) as f64 * per_char)
}

/// Нормализация меток распознавания
///
/// - непозитивная длительность заменяется на 0.3 с
/// - перекрытие сдвигает сегмент на `prev_end + gap` с сохранением длительности
/// - выход за конец больше `tolerance` масштабирует всю шкалу, меньший
///   обрезает последний сегмент
pub fn normalize(segments: &mut [SubtitleSegment], audio_duration: f64, gap: f64, tolerance: f64) {
    if segments.is_empty() {
        return;
    }

    for seg in segments.iter_mut() {
        if seg.end - seg.start <= 0.0 {
            seg.end = seg.start + FALLBACK_DURATION;
        }
    }

    for i in 1..segments.len() {
        let prev_end = segments[i - 1].end;
        let seg = &mut segments[i];
        if seg.start >= prev_end {
            continue;
        }
        let duration = seg.end - seg.start;
        let start = prev_end + gap;
        let mut end = start + duration;
        if end > audio_duration {
            end = audio_duration - gap;
            if end <= start {
                end = start + min_duration(&seg.text, 0.2, 0.08);
            }
        }
        seg.start = start;
        seg.end = end;
    }

    let last_end = segments[segments.len() - 1].end;
    let overshoot = last_end - audio_duration;
    if overshoot > tolerance {
        let scale = if last_end > 0.0 { (audio_duration - gap) / last_end } else { 1.0 };
        debug!("[sync] scaling timeline by {:.4} (overshoot {:.3}s)", scale, overshoot);
        for seg in segments.iter_mut() {
            seg.start *= scale;
            seg.end *= scale;
            let min = min_duration(&seg.text, 0.15, 0.06);
            if seg.end - seg.start < min {
                seg.end = seg.start + min;
            }
        }
        fix_overlaps(segments, gap);
    } else if overshoot > 0.0 {
        if let Some(last) = segments.last_mut() {
            last.end = audio_duration - gap;
        }
    }

    settle(segments, audio_duration, gap);
}

//! Пропорциональное распределение: озвученное окно делится между сегментами
//! по количеству букв и цифр

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::timeline::{fix_overlaps, settle, weight};
use super::{AlignmentStrategy, SubtitleSegment, SyncAudio, TimestampsSource};
use crate::audio::voiced_window;
use crate::config::SyncConfig;
use crate::errors::{AppError, Result};

const MIN_DURATION: f64 = 0.15;

pub struct ProportionalAlignment {
    config: SyncConfig,
}

impl ProportionalAlignment {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AlignmentStrategy for ProportionalAlignment {
    fn source(&self) -> TimestampsSource {
        TimestampsSource::ProportionalFallback
    }

    async fn align(
        &self,
        texts: &[String],
        audio: SyncAudio<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SubtitleSegment>> {
        if texts.is_empty() {
            return Err(AppError::Sync("nothing to align".to_string()));
        }
        let window = voiced_window(
            &audio.info.samples,
            audio.info.sample_rate,
            self.config.silence_threshold_ratio,
            self.config.max_leading_silence,
        );
        debug!(
            "[sync] voiced window {:.3}..{:.3} of {:.3}s",
            window.start, window.end, audio.info.duration
        );
        Ok(distribute(
            texts,
            window.start,
            window.end,
            audio.info.duration,
            self.config.min_gap,
        ))
    }
}

/// Делит `[voice_start, voice_end]` между текстами пропорционально их весу
pub fn distribute(
    texts: &[String],
    voice_start: f64,
    voice_end: f64,
    audio_duration: f64,
    gap: f64,
) -> Vec<SubtitleSegment> {
    let audio_duration = audio_duration.max(0.0);
    let voice_start = if (0.0..audio_duration).contains(&voice_start) { voice_start } else { 0.0 };
    let voice_end = voice_end.clamp(voice_start, audio_duration);

    let weights: Vec<usize> = texts.iter().map(|t| weight(t)).collect();
    let total: usize = weights.iter().sum();
    let available = (voice_end - voice_start).max(0.0);

    let mut segments = Vec::with_capacity(texts.len());
    let mut t = voice_start;
    for (i, (text, w)) in texts.iter().zip(&weights).enumerate() {
        let duration = (available * *w as f64 / total as f64).max(MIN_DURATION);
        segments.push(SubtitleSegment::new(i + 1, text.clone(), t, t + duration));
        t += duration;
    }

    // Минимальные длительности могли вывести за окно: сжатие важнее минимума
    let target_end = (voice_end.min(audio_duration - gap)).max(voice_start + MIN_DURATION);
    let last_end = segments.last().map(|s| s.end).unwrap_or(voice_start);
    if last_end > target_end && last_end > voice_start {
        let scale = (target_end - voice_start) / (last_end - voice_start);
        for seg in &mut segments {
            seg.start = voice_start + (seg.start - voice_start) * scale;
            seg.end = voice_start + (seg.end - voice_start) * scale;
        }
    }

    fix_overlaps(&mut segments, gap);
    settle(&mut segments, audio_duration, gap);
    segments
}

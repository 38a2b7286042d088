//! Выравнивание внешним сервисом
//!
//! Сервис возвращает JSON (возможно, окруженный текстом) вида
//! `{"audio_duration": .., "voice_start": .., "segments": [{"index": 1, "start": .., "end": ..}]}`.
//! Индексы начинаются с 1.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::timeline::{settle, weight};
use super::{AlignmentStrategy, SubtitleSegment, SyncAudio, TimestampsSource};
use crate::audio::detect_leading_silence;
use crate::config::SyncConfig;
use crate::errors::{AppError, Result};
use crate::services::AlignmentService;

const MIN_SEGMENT: f64 = 0.05;
const MIN_SHIFTED_DURATION: f64 = 0.1;

lazy_static! {
    static ref JSON_BLOCK: Regex = Regex::new(r"\{[\s\S]*\}").unwrap();
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    index: Option<i64>,
    start: Option<f64>,
    end: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    audio_duration: Option<f64>,
    #[serde(default)]
    voice_start: Option<f64>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

/// Разобранный ответ сервиса
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAlignment {
    pub audio_duration: Option<f64>,
    pub voice_start: f64,
    /// (индекс с 0, начало, конец), отсортировано по началу
    pub entries: Vec<(usize, f64, f64)>,
}

/// Извлекает и проверяет метки из ответа сервиса
pub fn parse_alignment_response(raw: &str, segment_count: usize, audio_duration: f64) -> Result<ParsedAlignment> {
    let block = JSON_BLOCK
        .find(raw)
        .ok_or_else(|| AppError::Sync("alignment response has no JSON object".to_string()))?;
    let response: RawResponse = serde_json::from_str(block.as_str())?;

    let mut entries: Vec<(usize, f64, f64)> = Vec::new();
    for seg in response.segments {
        let (Some(index), Some(start), Some(end)) = (seg.index, seg.start, seg.end) else {
            debug!("[sync] alignment entry without bounds skipped");
            continue;
        };
        if start < 0.0 || end <= start || end - start < MIN_SEGMENT {
            debug!("[sync] alignment entry {} has unusable window {:.3}..{:.3}", index, start, end);
            continue;
        }
        if index < 1 || index as usize > segment_count {
            warn!("[sync] alignment index {} out of range 1..={}", index, segment_count);
            continue;
        }
        entries.push((index as usize - 1, start, end.min(audio_duration)));
    }

    entries.sort_by(|a, b| a.1.total_cmp(&b.1));
    let mut seen = vec![false; segment_count];
    entries.retain(|(idx, _, _)| !std::mem::replace(&mut seen[*idx], true));

    Ok(ParsedAlignment {
        audio_duration: response.audio_duration,
        voice_start: response.voice_start.unwrap_or(0.0),
        entries,
    })
}

/// Сдвигает все метки на `diff`, если начало речи по сервису отличается от
/// измеренного больше чем на `tolerance`
pub fn apply_onset_correction(entries: &mut [(usize, f64, f64)], voice_start: f64, detected: f64, tolerance: f64) {
    if voice_start <= 0.0 {
        return;
    }
    let diff = voice_start - detected;
    if diff.abs() <= tolerance {
        return;
    }
    info!("[sync] onset mismatch {:+.3}s, shifting all segments", diff);
    for (_, start, end) in entries.iter_mut() {
        *start = (*start - diff).max(0.0);
        *end = (*end - diff).max(*start + MIN_SHIFTED_DURATION);
    }
}

/// Собирает шкалу по индексам, заполняя пропуски пропорционально внутри
/// промежутка между соседними известными сегментами
pub fn fill_missing(
    texts: &[String],
    entries: &[(usize, f64, f64)],
    voice_start: f64,
    audio_duration: f64,
    gap: f64,
) -> Vec<SubtitleSegment> {
    let mut known: Vec<Option<(f64, f64)>> = vec![None; texts.len()];
    for &(idx, start, end) in entries {
        known[idx] = Some((start, end));
    }

    let mut segments = Vec::with_capacity(texts.len());
    let mut i = 0;
    while i < texts.len() {
        if let Some((start, end)) = known[i] {
            segments.push(SubtitleSegment::new(i + 1, texts[i].clone(), start, end));
            i += 1;
            continue;
        }

        let run_end = (i..texts.len()).find(|&j| known[j].is_some()).unwrap_or(texts.len());
        let from = segments.last().map(|s: &SubtitleSegment| s.end).unwrap_or(voice_start);
        let to = known
            .get(run_end)
            .copied()
            .flatten()
            .map(|(start, _)| start)
            .unwrap_or(audio_duration)
            .max(from);

        let total: usize = texts[i..run_end].iter().map(|t| weight(t)).sum();
        let mut t = from;
        for j in i..run_end {
            let duration = (to - from) * weight(&texts[j]) as f64 / total as f64;
            segments.push(SubtitleSegment::new(j + 1, texts[j].clone(), t, t + duration));
            t += duration;
        }
        debug!("[sync] filled {} missing segment(s) in {:.3}..{:.3}", run_end - i, from, to);
        i = run_end;
    }

    settle(&mut segments, audio_duration, gap);
    segments
}

pub struct ExternalAlignment {
    service: Arc<dyn AlignmentService>,
    config: SyncConfig,
}

impl ExternalAlignment {
    pub fn new(service: Arc<dyn AlignmentService>, config: SyncConfig) -> Self {
        Self { service, config }
    }
}

#[async_trait]
impl AlignmentStrategy for ExternalAlignment {
    fn source(&self) -> TimestampsSource {
        TimestampsSource::ExternalAlignment
    }

    async fn align(
        &self,
        texts: &[String],
        audio: SyncAudio<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SubtitleSegment>> {
        let raw = self.service.align(audio.path, texts).await?;
        let duration = audio.info.duration;
        let mut parsed = parse_alignment_response(&raw, texts.len(), duration)?;
        if parsed.entries.is_empty() {
            return Err(AppError::Sync("alignment service matched no segments".to_string()));
        }
        info!(
            "[sync] alignment service matched {}/{} segment(s)",
            parsed.entries.len(),
            texts.len()
        );

        let detected = detect_leading_silence(
            &audio.info.samples,
            audio.info.sample_rate,
            self.config.silence_threshold_ratio,
            self.config.max_leading_silence,
        );
        apply_onset_correction(
            &mut parsed.entries,
            parsed.voice_start,
            detected,
            self.config.onset_tolerance,
        );

        Ok(fill_missing(texts, &parsed.entries, detected, duration, self.config.min_gap))
    }
}

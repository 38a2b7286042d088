//! Проверка и выравнивание временной шкалы сегментов

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use super::SubtitleSegment;
use crate::errors::{AppError, Result};

/// Минимальная длительность сегмента на выходной шкале, секунды
pub const MIN_SEGMENT_DURATION: f64 = 0.02;
const DURATION_SLACK: f64 = 1e-9;

lazy_static! {
    static ref SPOKEN_NOISE: Regex = Regex::new(r"[\s,.!?~·\-]").unwrap();
    static ref NON_WORD: Regex = Regex::new(r"[^0-9A-Za-z가-힣]").unwrap();
}

/// Количество произносимых символов (без пробелов и пунктуации)
pub fn spoken_chars(text: &str) -> usize {
    SPOKEN_NOISE.replace_all(text, "").chars().count()
}

/// Вес сегмента для пропорционального распределения, не меньше 1
pub fn weight(text: &str) -> usize {
    NON_WORD.replace_all(text, "").chars().count().max(1)
}

/// Сдвигает начало сегмента, пересекающегося с предыдущим, на `prev_end + gap`
pub fn fix_overlaps(segments: &mut [SubtitleSegment], gap: f64) {
    for i in 1..segments.len() {
        let prev_end = segments[i - 1].end;
        if segments[i].start < prev_end {
            segments[i].start = prev_end + gap;
        }
    }
}

/// Финальная проверка: неотрицательные метки, начало не раньше конца
/// предыдущего, длительность не меньше `MIN_SEGMENT_DURATION`, конец в
/// пределах аудио. Сегмент, упершийся в конец аудио, начинается раньше, но
/// не раньше конца предыдущего.
pub fn settle(segments: &mut [SubtitleSegment], audio_duration: f64, gap: f64) {
    let limit = audio_duration.max(0.0);
    let mut prev_end: Option<f64> = None;
    let mut too_short = 0;

    for seg in segments.iter_mut() {
        let mut start = seg.start.max(0.0);
        if let Some(prev) = prev_end {
            if start < prev {
                start = prev + gap;
            }
        }
        start = start.min(limit);
        let end = seg.end.max(start + MIN_SEGMENT_DURATION).min(limit);
        if end - start < MIN_SEGMENT_DURATION {
            start = (end - MIN_SEGMENT_DURATION).max(prev_end.unwrap_or(0.0)).max(0.0);
            if end - start < MIN_SEGMENT_DURATION - DURATION_SLACK {
                too_short += 1;
            }
        }
        seg.start = start;
        seg.end = end;
        prev_end = Some(end);
    }

    if too_short > 0 {
        warn!(
            "[sync] {} segment(s) shorter than {:.2}s: {:.3}s of audio is not enough",
            too_short, MIN_SEGMENT_DURATION, audio_duration
        );
    }
}

/// Проверяет инварианты выходной шкалы: порядок по индексу и началу,
/// длительность не меньше `MIN_SEGMENT_DURATION`, отсутствие перекрытий
/// (с допуском `epsilon`) и конец не позже `audio_duration + end_tolerance`
pub fn validate_timeline(
    segments: &[SubtitleSegment],
    audio_duration: f64,
    epsilon: f64,
    end_tolerance: f64,
) -> Result<()> {
    for seg in segments {
        if !seg.start.is_finite() || !seg.end.is_finite() {
            return Err(AppError::Sync(format!("segment {} has non-finite bounds", seg.idx)));
        }
        if seg.start < 0.0 || seg.end < seg.start {
            return Err(AppError::Sync(format!(
                "segment {} has invalid window {:.3}..{:.3}",
                seg.idx, seg.start, seg.end
            )));
        }
        if seg.end - seg.start < MIN_SEGMENT_DURATION - DURATION_SLACK {
            return Err(AppError::Sync(format!(
                "segment {} lasts {:.3}s, shorter than {:.2}s",
                seg.idx,
                seg.end - seg.start,
                MIN_SEGMENT_DURATION
            )));
        }
    }

    for pair in segments.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if b.idx <= a.idx || b.start < a.start {
            return Err(AppError::Sync(format!(
                "segments {} and {} are out of order",
                a.idx, b.idx
            )));
        }
        if b.start < a.end - epsilon {
            return Err(AppError::Sync(format!(
                "segment {} starts at {:.3} before {} ends at {:.3}",
                b.idx, b.start, a.idx, a.end
            )));
        }
    }

    if let Some(last) = segments.last() {
        if last.end > audio_duration + end_tolerance {
            return Err(AppError::Sync(format!(
                "last segment ends at {:.3}, audio is {:.3}s",
                last.end, audio_duration
            )));
        }
    }
    Ok(())
}

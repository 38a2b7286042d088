//! Amplitude-threshold silence scan.
//!
//! A sample counts as voiced when its absolute amplitude exceeds
//! `threshold_ratio` of the clip's peak amplitude.

use log::warn;

use super::format::peak_amplitude;

/// Voiced region of a clip, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicedWindow {
    pub start: f64,
    pub end: f64,
}

fn threshold(samples: &[f32], threshold_ratio: f32) -> Option<f32> {
    let peak = peak_amplitude(samples);
    if peak <= f32::EPSILON {
        None
    } else {
        Some(peak * threshold_ratio)
    }
}

/// Offset of the first voiced sample.
///
/// Offsets above `max_offset` are treated as detector error and reported as 0.
pub fn detect_leading_silence(
    samples: &[f32],
    sample_rate: u32,
    threshold_ratio: f32,
    max_offset: f64,
) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    let Some(limit) = threshold(samples, threshold_ratio) else {
        return 0.0;
    };

    let offset = samples
        .iter()
        .position(|s| s.abs() > limit)
        .map(|idx| idx as f64 / sample_rate as f64)
        .unwrap_or(0.0);

    if offset > max_offset {
        warn!(
            "Leading silence {:.3}s exceeds {:.2}s, treating as detector error",
            offset, max_offset
        );
        return 0.0;
    }
    offset
}

/// End of the last voiced sample; the full duration when nothing is voiced.
pub fn detect_trailing_silence(samples: &[f32], sample_rate: u32, threshold_ratio: f32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    let duration = samples.len() as f64 / sample_rate as f64;
    let Some(limit) = threshold(samples, threshold_ratio) else {
        return duration;
    };

    samples
        .iter()
        .rposition(|s| s.abs() > limit)
        .map(|idx| (idx + 1) as f64 / sample_rate as f64)
        .unwrap_or(duration)
}

/// Leading and trailing bounds of speech in one pass over the clip.
pub fn voiced_window(
    samples: &[f32],
    sample_rate: u32,
    threshold_ratio: f32,
    max_leading: f64,
) -> VoicedWindow {
    let start = detect_leading_silence(samples, sample_rate, threshold_ratio, max_leading);
    let end = detect_trailing_silence(samples, sample_rate, threshold_ratio);
    VoicedWindow {
        start,
        end: end.max(start),
    }
}

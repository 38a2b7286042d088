use super::SubtitleSegment;

/// Линейно переносит шкалу сегментов в окно `[offset, offset + new_span]`.
///
/// `new = offset + (old - old_min) * new_span / old_span`; при нулевом
/// исходном диапазоне сегменты только сдвигаются.
pub fn rescale_to_duration(segments: &[SubtitleSegment], offset: f64, new_span: f64) -> Vec<SubtitleSegment> {
    let Some(old_min) = segments.iter().map(|s| s.start).reduce(f64::min) else {
        return Vec::new();
    };
    let old_max = segments.iter().map(|s| s.end).fold(old_min, f64::max);
    let old_span = old_max - old_min;

    let map = |t: f64| {
        if old_span <= f64::EPSILON {
            offset + (t - old_min)
        } else {
            offset + (t - old_min) * new_span / old_span
        }
    };

    segments
        .iter()
        .map(|seg| {
            let start = map(seg.start);
            SubtitleSegment {
                start,
                end: map(seg.end).max(start),
                ..seg.clone()
            }
        })
        .collect()
}

use crate::sync::{rescale_to_duration, SubtitleSegment};

fn seg(idx: usize, start: f64, end: f64) -> SubtitleSegment {
    SubtitleSegment::new(idx, "자막", start, end)
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

#[test]
fn test_same_window_is_noop() {
    let segments = vec![seg(1, 0.5, 1.0), seg(2, 1.2, 2.0)];
    let rescaled = rescale_to_duration(&segments, 0.5, 1.5);

    for (a, b) in segments.iter().zip(&rescaled) {
        assert_close(a.start, b.start);
        assert_close(a.end, b.end);
        assert_eq!(a.text, b.text);
    }
}

#[test]
fn test_uniform_scaling() {
    let segments = vec![seg(1, 0.0, 1.0), seg(2, 1.0, 2.0)];
    let rescaled = rescale_to_duration(&segments, 0.0, 1.0);

    assert_close(rescaled[0].end, 0.5);
    assert_close(rescaled[1].start, 0.5);
    assert_close(rescaled[1].end, 1.0);
}

#[test]
fn test_offset_and_span() {
    let segments = vec![seg(1, 1.0, 2.0), seg(2, 2.0, 5.0)];
    let rescaled = rescale_to_duration(&segments, 0.2, 2.0);

    assert_close(rescaled[0].start, 0.2);
    assert_close(rescaled[1].end, 2.2);
    assert!(rescaled.iter().all(|s| s.end >= s.start));
}

#[test]
fn test_zero_span_shifts_only() {
    let segments = vec![seg(1, 1.0, 1.0)];
    let rescaled = rescale_to_duration(&segments, 2.0, 4.0);
    assert_close(rescaled[0].start, 2.0);
    assert_close(rescaled[0].end, 2.0);
}

#[test]
fn test_empty_input() {
    assert!(rescale_to_duration(&[], 0.0, 1.0).is_empty());
}

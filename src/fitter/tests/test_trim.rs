use crate::fitter::trim::{estimate_duration, shrink_by_rate, trim_script_by_chars};

const SCRIPT: &str = "첫 문장입니다. 두 번째 문장입니다. 세 번째 문장입니다.";

#[test]
fn test_keeps_whole_sentences() {
    assert_eq!(trim_script_by_chars(SCRIPT, 20, &[]), "첫 문장입니다. 두 번째 문장입니다.");
    assert_eq!(trim_script_by_chars(SCRIPT, 100, &[]), SCRIPT);
}

#[test]
fn test_prefix_cut_when_first_sentence_is_too_long() {
    assert_eq!(trim_script_by_chars("아주아주아주긴문장입니다", 5, &[]), "아주아주아");
}

#[test]
fn test_prefix_cut_stops_at_word_boundary() {
    let sentence = "첫번째 문장은 아주 길어요";
    assert_eq!(trim_script_by_chars(sentence, 9, &[]), "첫번째 문장은");
    assert_eq!(trim_script_by_chars(sentence, 10, &[]), "첫번째 문장은 아주");
}

#[test]
fn test_protected_text_survives() {
    let protected = vec!["구독 부탁드려요".to_string()];
    let script = format!("{} 구독 부탁드려요", "첫 문장입니다. 두 번째 문장입니다.");

    assert_eq!(trim_script_by_chars(&script, 20, &protected), "첫 문장입니다. 구독 부탁드려요");
    assert_eq!(trim_script_by_chars(&script, 6, &protected), "구독 부탁드려요");
}

#[test]
fn test_shrink_by_rate() {
    assert_eq!(shrink_by_rate(SCRIPT, 0.5, &[]), "첫 문장입니다.");

    let protected = vec!["구독 부탁드려요".to_string()];
    let script = format!("{} 구독 부탁드려요", SCRIPT);
    let shrunk = shrink_by_rate(&script, 0.5, &protected);
    assert!(shrunk.ends_with("구독 부탁드려요"));
    assert!(shrunk.starts_with("첫 문장입니다."));
}

#[test]
fn test_estimate_ignores_whitespace() {
    assert!((estimate_duration("가나다 라마바사", 7.0, 1.0) - 1.0).abs() < 1e-9);
    assert!((estimate_duration("가나다 라마바사", 7.0, 1.2) - 1.0 / 1.2).abs() < 1e-9);
}

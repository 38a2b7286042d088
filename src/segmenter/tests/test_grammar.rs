use crate::segmenter::grammar::{final_consonant, is_bad_split_point, violated_rule};

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

#[test]
fn test_final_consonant() {
    assert_eq!(final_consonant('가'), Some(0));
    assert_eq!(final_consonant('갈'), Some(8));
    assert_eq!(final_consonant('간'), Some(4));
    assert_eq!(final_consonant('a'), None);
}

#[test]
fn test_numeral_and_counter_stay_together() {
    let text = chars("사과 세 개를 샀다");
    assert_eq!(violated_rule(&text, 5), Some("numeral+counter"));
}

#[test]
fn test_modal_constructions_are_guarded() {
    let text = chars("갈 수 있다");
    // перед "수" и перед "있다"
    assert_eq!(violated_rule(&text, 2), Some("ability ~ㄹ 수"));
    assert_eq!(violated_rule(&text, 4), Some("ability 수 있다"));

    let text = chars("먹고 싶다");
    assert_eq!(violated_rule(&text, 3), Some("desire/progressive ~고"));
}

#[test]
fn test_determiner_keeps_its_noun() {
    let text = chars("그 사람");
    assert_eq!(violated_rule(&text, 2), Some("determiner"));
}

#[test]
fn test_particle_boundary_is_allowed() {
    let text = chars("저는 학교에 갑니다");
    assert!(!is_bad_split_point(&text, 7));
}

#[test]
fn test_edges_are_never_bad() {
    let text = chars("갈 수 있다");
    assert!(!is_bad_split_point(&text, 0));
    assert!(!is_bad_split_point(&text, text.len()));
}

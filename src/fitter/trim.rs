//! Сокращение сценария до заданного числа символов
//!
//! Сохраняются целые предложения; если даже первое предложение длиннее
//! лимита, берется его начало до последнего целого слова. Защищенные
//! фразы не сокращаются и добавляются в конец.

use lazy_static::lazy_static;
use regex::Regex;

use crate::segmenter::protected::extract_protected;
use crate::segmenter::splitter::char_len;

lazy_static! {
    static ref SENTENCE_BREAK: Regex = Regex::new(r"[.!?。！？]\s*").unwrap();
}

/// Предложения с их конечным знаком
fn sentences(text: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        out.push((text[last..m.start()].trim(), m.as_str().trim()));
        last = m.end();
    }
    if last < text.len() {
        out.push((text[last..].trim(), ""));
    }
    out
}

fn with_protected(body: &str, protected: &str) -> String {
    match (body.is_empty(), protected.is_empty()) {
        (_, true) => body.to_string(),
        (true, false) => protected.to_string(),
        (false, false) => format!("{} {}", body, protected),
    }
}

/// Начало предложения не длиннее `budget` символов, обрезанное по последнему
/// пробелу. Без пробелов режется посимвольно.
fn word_prefix(sentence: &str, budget: usize) -> String {
    let prefix: String = sentence.chars().take(budget).collect();
    let at_boundary = sentence.chars().nth(budget).map_or(true, char::is_whitespace);
    if at_boundary {
        return prefix.trim_end().to_string();
    }
    match prefix.rsplit_once(char::is_whitespace) {
        Some((head, _)) if !head.trim().is_empty() => head.trim_end().to_string(),
        _ => prefix,
    }
}

/// Сокращает сценарий до `target_chars` символов (с пробелами)
pub fn trim_script_by_chars(script: &str, target_chars: usize, protected: &[String]) -> String {
    if char_len(script) <= target_chars {
        return script.to_string();
    }

    let (main, kept) = extract_protected(script, protected);
    let cta = kept.join(" ");
    let budget = if cta.is_empty() {
        target_chars
    } else {
        match target_chars.checked_sub(char_len(&cta) + 1) {
            Some(budget) if budget > 0 => budget,
            _ => return cta,
        }
    };

    let mut reduced = String::new();
    for (sentence, end) in sentences(&main) {
        if sentence.is_empty() {
            continue;
        }
        let candidate = if reduced.is_empty() {
            format!("{}{}", sentence, end)
        } else {
            format!("{} {}{}", reduced, sentence, end)
        };

        if char_len(&candidate) <= budget {
            reduced = candidate;
        } else {
            if reduced.is_empty() {
                reduced = word_prefix(sentence, budget);
            }
            break;
        }
    }

    with_protected(reduced.trim(), &cta)
}

/// Сокращает основной текст до доли `rate` его длины, защищенные фразы
/// сохраняются целиком
pub fn shrink_by_rate(script: &str, rate: f64, protected: &[String]) -> String {
    let (main, kept) = extract_protected(script, protected);
    let target = (char_len(&main) as f64 * rate).floor() as usize;
    let reduced = trim_script_by_chars(&main, target, &[]);
    with_protected(&reduced, &kept.join(" "))
}

/// Оценка длительности озвучки после ускорения
pub fn estimate_duration(script: &str, chars_per_second: f64, speed_ratio: f64) -> f64 {
    let chars = script.chars().filter(|c| !c.is_whitespace()).count();
    chars as f64 / chars_per_second / speed_ratio
}

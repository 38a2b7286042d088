//! Разбиение текста на сегменты субтитров
//!
//! 1. Разделение по конечной пунктуации (знак остается в предложении)
//! 2. Длинные предложения режутся в естественных местах: запятые, союзы,
//!    соединительные окончания, частицы, пробелы
//! 3. Короткие сегменты присоединяются к соседним

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::grammar::is_bad_split_point;

const SEPARATORS: [char; 5] = [',', '，', 'ㆍ', '·', ';'];
const CONJUNCTIONS: [&str; 8] = [
    "그리고", "하지만", "그래서", "그런데", "또한", "그러나", "그러면", "만약",
];
const TERMINALS: [char; 6] = ['.', '!', '?', '。', '？', '！'];

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?。？！]+").unwrap();
    static ref CONNECTIVE_ENDING: Regex =
        Regex::new(r"(고|며|서|면|니|지만|는데|지요|네요|어요|아요|죠|거든요|잖아요) ").unwrap();
    static ref PARTICLE_SPACE: Regex =
        Regex::new(r"(은|는|이|가|을|를|에|로|와|과|의|도|만|까지|에서|으로|라서|하고) ").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Границы длины сегмента для целевой длины
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub target: usize,
    pub min: usize,
    pub hard_max: usize,
}

impl Limits {
    pub fn for_target(target: usize) -> Self {
        let target = target.max(1);
        Self {
            target,
            min: 4.max(target.saturating_sub(3)),
            hard_max: target + 2,
        }
    }
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn ends_with_terminal(s: &str) -> bool {
    s.trim_end().chars().last().is_some_and(|c| TERMINALS.contains(&c))
}

/// Делит текст на предложения, оставляя пунктуацию в конце предложения
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(text) {
        let sentence = text[last..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = m.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn byte_to_char_offset(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// Позиция разреза (в символах) для слишком длинного фрагмента
fn find_cut(chars: &[char], limits: Limits) -> usize {
    let Limits { target, min, hard_max } = limits;
    let len = chars.len();

    // 1. Запятые и подобные разделители, ближайшие к максимуму
    let sep_end = hard_max.min(len);
    for sep in SEPARATORS {
        if let Some(idx) = (min + 1..sep_end).rev().find(|&i| chars[i] == sep) {
            return idx + 1;
        }
    }

    // 2. Перед союзом
    for conj in CONJUNCTIONS {
        let conj_chars: Vec<char> = conj.chars().collect();
        let search_end = (hard_max + conj_chars.len()).min(len);
        if search_end < conj_chars.len() {
            continue;
        }
        let found = (min..=search_end - conj_chars.len())
            .find(|&i| chars[i..i + conj_chars.len()] == conj_chars[..]);
        if let Some(idx) = found.filter(|&idx| idx > 0) {
            return idx;
        }
    }

    let region: String = chars[..hard_max.min(len)].iter().collect();

    // 3. После соединительного окончания
    let mut best = None;
    for m in CONNECTIVE_ENDING.find_iter(&region) {
        let pos = byte_to_char_offset(&region, m.end());
        if pos >= min && !is_bad_split_point(chars, pos) {
            best = Some(pos);
            if pos + 2 >= target {
                break;
            }
        }
    }
    if let Some(pos) = best {
        return pos;
    }

    // 4. После падежной частицы, ближе к целевой длине
    let particle_cut = PARTICLE_SPACE
        .find_iter(&region)
        .map(|m| byte_to_char_offset(&region, m.end()))
        .filter(|&pos| pos >= min && !is_bad_split_point(chars, pos))
        .min_by_key(|&pos| pos.abs_diff(target));
    if let Some(pos) = particle_cut {
        return pos;
    }

    // 5. Пробел около целевой длины, не разрывающий грамматическую единицу
    let search_start = min.max(target.saturating_sub(3));
    let search_end = len.min(hard_max);
    let space_cut = (search_start..search_end)
        .filter(|&i| chars[i] == ' ')
        .map(|i| i + 1)
        .filter(|&pos| !is_bad_split_point(chars, pos))
        .min_by_key(|&pos| pos.abs_diff(target));
    if let Some(pos) = space_cut {
        return pos;
    }
    if let Some(i) = (min..len.min(hard_max + 1)).find(|&i| chars[i] == ' ') {
        return i + 1;
    }

    // 6. Жесткий разрез
    target.min(len)
}

/// Режет фрагмент длиннее `hard_max` на части не длиннее `hard_max`
pub fn cut_long(sentence: &str, limits: Limits) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining: Vec<char> = sentence.trim().chars().collect();

    while !remaining.is_empty() {
        if remaining.len() <= limits.hard_max {
            pieces.push(remaining.iter().collect::<String>());
            break;
        }

        let cut = find_cut(&remaining, limits).clamp(1, remaining.len());
        let left: String = remaining[..cut].iter().collect();
        let left = left.trim();
        if !left.is_empty() {
            pieces.push(left.to_string());
        }
        remaining = remaining[cut..]
            .iter()
            .copied()
            .skip_while(|c| c.is_whitespace())
            .collect();
    }

    pieces
}

/// Присоединяет короткие сегменты к соседям, не пересекая конец предложения
/// и не превышая `hard_max`
pub fn merge_short(segments: Vec<String>, limits: Limits) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(segments.len());

    for seg in segments {
        let seg = seg.trim().to_string();
        if seg.is_empty() {
            continue;
        }
        let seg_len = char_len(&seg);
        if let Some(prev) = merged.last_mut() {
            if seg_len < limits.min
                && !ends_with_terminal(prev)
                && char_len(prev) + 1 + seg_len <= limits.hard_max
            {
                prev.push(' ');
                prev.push_str(&seg);
                continue;
            }
        }
        merged.push(seg);
    }

    // Короткий сегмент, который не удалось присоединить назад, пробуем присоединить вперед
    let mut i = 0;
    while i + 1 < merged.len() {
        let seg_len = char_len(&merged[i]);
        if seg_len < limits.min
            && !ends_with_terminal(&merged[i])
            && seg_len + 1 + char_len(&merged[i + 1]) <= limits.hard_max
        {
            let short = merged.remove(i);
            merged[i] = format!("{} {}", short, merged[i]);
            continue;
        }
        i += 1;
    }

    merged
}

/// Разбивает текст без защищенных фраз
pub fn split_text(text: &str, limits: Limits) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(&normalized);
    debug!("Sentence split: {} sentence(s)", sentences.len());

    let mut segments = Vec::new();
    for sentence in sentences {
        if char_len(&sentence) <= limits.hard_max {
            segments.push(sentence);
        } else {
            segments.extend(cut_long(&sentence, limits));
        }
    }

    merge_short(segments, limits)
}

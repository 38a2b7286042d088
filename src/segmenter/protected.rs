//! Защищенные фразы (CTA)
//!
//! Фразы извлекаются из текста до разбиения и добавляются в конец отдельно,
//! в порядке их появления в тексте.

use log::info;

use super::splitter::{char_len, cut_long, normalize_whitespace, Limits};

/// Убирает защищенные фразы из текста. Возвращает (текст без фраз, найденные фразы).
pub fn extract_protected(text: &str, protected: &[String]) -> (String, Vec<String>) {
    let mut remaining = text.to_string();
    let mut found: Vec<(usize, String)> = Vec::new();

    for line in protected {
        let line = normalize_whitespace(line);
        if line.is_empty() {
            continue;
        }
        if let Some(pos) = text.find(&line) {
            remaining = remaining.replacen(&line, " ", 1);
            found.push((pos, line));
        }
    }

    if found.is_empty() {
        return (text.to_string(), Vec::new());
    }

    found.sort_by_key(|(pos, _)| *pos);
    let lines: Vec<String> = found.into_iter().map(|(_, line)| line).collect();
    info!("Preserved {} protected line(s)", lines.len());
    (normalize_whitespace(&remaining), lines)
}

/// Сегменты для защищенных фраз: одна строка, если помещается, иначе две
/// половины по пробелу, ближайшему к середине
pub fn segment_protected(lines: &[String], limits: Limits, single_max: usize) -> Vec<String> {
    if lines.is_empty() {
        return Vec::new();
    }

    let combined = lines.join(" ");
    let single_max = single_max.min(limits.hard_max);
    if char_len(&combined) <= single_max {
        return vec![combined];
    }

    let chars: Vec<char> = combined.chars().collect();
    let mid = chars.len() / 2;
    let split = (1..chars.len())
        .filter(|&i| chars[i] == ' ')
        .min_by_key(|&i| i.abs_diff(mid))
        .unwrap_or(mid);

    let first: String = chars[..split].iter().collect();
    let second: String = chars[split..].iter().collect();

    [first, second]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .flat_map(|part| {
            if char_len(part) <= limits.hard_max {
                vec![part.to_string()]
            } else {
                cut_long(part, limits)
            }
        })
        .collect()
}

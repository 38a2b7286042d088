//! # Script segmenter
//!
//! Splits narration text into bounded-length subtitle chunks that respect
//! sentence boundaries and never cut inside a known grammatical unit.

pub mod grammar;
pub mod protected;
pub mod splitter;

use log::{debug, info};

use crate::config::SegmenterConfig;

pub use grammar::is_bad_split_point;
pub use splitter::{char_len, ends_with_terminal, Limits};

/// Разбивает текст на субтитры с учетом защищенных фраз
#[derive(Debug, Clone)]
pub struct Segmenter {
    target_len: usize,
    protected: Vec<String>,
    protected_single_max: usize,
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            target_len: config.target_len,
            protected: config.protected_lines.clone(),
            protected_single_max: config.protected_single_max,
        }
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn protected_lines(&self) -> &[String] {
        &self.protected
    }

    pub fn segment(&self, text: &str) -> Vec<String> {
        self.segment_with_target(text, self.target_len)
    }

    pub fn segment_with_target(&self, text: &str, target_len: usize) -> Vec<String> {
        let limits = Limits::for_target(target_len);
        let normalized = splitter::normalize_whitespace(text);
        let (body, preserved) = protected::extract_protected(&normalized, &self.protected);

        let mut segments = splitter::split_text(&body, limits);
        segments.extend(protected::segment_protected(
            &preserved,
            limits,
            self.protected_single_max,
        ));

        info!(
            "Segmented {} chars into {} subtitle(s) (target {})",
            char_len(&normalized),
            segments.len(),
            target_len
        );
        segments
    }
}

/// Разбивает текст без защищенных фраз
pub fn segment(text: &str, target_len: usize) -> Vec<String> {
    splitter::split_text(text, Limits::for_target(target_len))
}

/// Объединяет короткие черновые строки сценария до синтеза.
///
/// Строка короче `target_len - 3` присоединяется к предыдущей, если та не
/// заканчивается конечной пунктуацией, иначе к следующей, если сама строка не
/// заканчивается ею. Верхнего предела длины здесь нет: строки потом режутся
/// `segment`.
pub fn merge_short_drafts<S: AsRef<str>>(drafts: &[S], target_len: usize) -> Vec<String> {
    let min = target_len.saturating_sub(3);
    let mut merged: Vec<String> = Vec::with_capacity(drafts.len());
    let mut carry: Option<String> = None;

    for draft in drafts {
        let mut draft = splitter::normalize_whitespace(draft.as_ref());
        if draft.is_empty() {
            continue;
        }
        if let Some(short) = carry.take() {
            draft = format!("{} {}", short, draft);
        }

        let is_short = char_len(&draft) < min;
        match merged.last_mut() {
            Some(prev) if is_short && !ends_with_terminal(prev) => {
                prev.push(' ');
                prev.push_str(&draft);
            }
            _ if is_short && !ends_with_terminal(&draft) => carry = Some(draft),
            _ => merged.push(draft),
        }
    }

    if let Some(short) = carry {
        match merged.last_mut() {
            // Хвост без соседа справа остается отдельной строкой
            Some(prev) if !ends_with_terminal(prev) => {
                prev.push(' ');
                prev.push_str(&short);
            }
            _ => merged.push(short),
        }
    }

    debug!("Merged {} draft(s) into {}", drafts.len(), merged.len());
    merged
}

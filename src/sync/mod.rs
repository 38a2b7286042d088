//! # Timestamp synchronizer
//!
//! Привязывает сегменты субтитров к временным окнам синтезированной речи.
//! Стратегии пробуются по порядку, первая успешная дает результат:
//!
//! 1. внешний сервис выравнивания (`external`)
//! 2. локальное распознавание слов (`recognition`)
//! 3. пропорциональное распределение по символам (`proportional`)
//!
//! Результат любой стратегии проходит `timeline::validate_timeline`.

pub mod external;
pub mod proportional;
pub mod recognition;
pub mod rescale;
pub mod timeline;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::audio::{detect_leading_silence, AudioInfo};
use crate::config::SyncConfig;
use crate::errors::{AppError, Result};
use crate::services::{AlignmentService, SpeechRecognizer};

pub use external::ExternalAlignment;
pub use proportional::ProportionalAlignment;
pub use recognition::RecognitionAlignment;
pub use rescale::rescale_to_duration;
pub use timeline::validate_timeline;

/// Сегмент субтитра с временным окном в секундах
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub idx: usize,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub speaker_label: Option<String>,
    pub audio_path: Option<PathBuf>,
}

impl SubtitleSegment {
    pub fn new(idx: usize, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            idx,
            text: text.into(),
            start,
            end,
            speaker_label: None,
            audio_path: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampsSource {
    ExternalAlignment,
    LocalRecognition,
    ProportionalFallback,
    /// Метки пересчитаны после растяжения аудио
    Preserved,
}

impl TimestampsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampsSource::ExternalAlignment => "external_alignment",
            TimestampsSource::LocalRecognition => "local_recognition",
            TimestampsSource::ProportionalFallback => "proportional_fallback",
            TimestampsSource::Preserved => "preserved",
        }
    }
}

impl fmt::Display for TimestampsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Сведения о синхронизации для пары (задание, голос)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub audio_duration: f64,
    pub speed_ratio: f64,
    pub start_offset: f64,
    pub timestamps_source: TimestampsSource,
}

/// Аудио, к которому привязываются сегменты
#[derive(Debug, Clone, Copy)]
pub struct SyncAudio<'a> {
    pub path: &'a Path,
    pub info: &'a AudioInfo,
}

/// Одна стратегия выравнивания
#[async_trait]
pub trait AlignmentStrategy: Send + Sync {
    fn source(&self) -> TimestampsSource;

    async fn align(
        &self,
        texts: &[String],
        audio: SyncAudio<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SubtitleSegment>>;
}

/// Упорядоченный список стратегий выравнивания
pub struct Synchronizer {
    strategies: Vec<Box<dyn AlignmentStrategy>>,
    config: SyncConfig,
}

impl Synchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            strategies: Vec::new(),
            config,
        }
    }

    /// Стандартная цепочка: внешний сервис и распознавание, если доступны и
    /// включены, затем пропорциональное распределение
    pub fn with_services(
        config: SyncConfig,
        alignment: Option<Arc<dyn AlignmentService>>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
    ) -> Self {
        let mut sync = Self::new(config.clone());
        if let Some(service) = alignment.filter(|_| config.use_external_alignment) {
            sync = sync.with_strategy(Box::new(ExternalAlignment::new(service, config.clone())));
        }
        if let Some(recognizer) = recognizer.filter(|_| config.use_recognition) {
            sync = sync.with_strategy(Box::new(RecognitionAlignment::new(recognizer, config.clone())));
        }
        sync.with_strategy(Box::new(ProportionalAlignment::new(config)))
    }

    pub fn with_strategy(mut self, strategy: Box<dyn AlignmentStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn align(
        &self,
        texts: &[String],
        audio: SyncAudio<'_>,
        speed_ratio: f64,
        cancel: &CancellationToken,
    ) -> Result<(Vec<SubtitleSegment>, SyncMetadata)> {
        let start_offset = detect_leading_silence(
            &audio.info.samples,
            audio.info.sample_rate,
            self.config.silence_threshold_ratio,
            self.config.max_leading_silence,
        );
        let metadata = |source| SyncMetadata {
            audio_duration: audio.info.duration,
            speed_ratio,
            start_offset,
            timestamps_source: source,
        };

        if texts.is_empty() {
            return Ok((Vec::new(), metadata(TimestampsSource::ProportionalFallback)));
        }

        for strategy in &self.strategies {
            let source = strategy.source();
            let segments = match strategy.align(texts, audio, cancel).await {
                Ok(segments) => segments,
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    warn!("[sync] {} failed: {}", source, e);
                    continue;
                }
            };

            match validate_timeline(
                &segments,
                audio.info.duration,
                self.config.overlap_epsilon,
                self.config.end_tolerance,
            ) {
                Ok(()) => {
                    info!(
                        "[sync] {} segment(s) aligned via {} over {:.2}s",
                        segments.len(),
                        source,
                        audio.info.duration
                    );
                    return Ok((segments, metadata(source)));
                }
                Err(e) => warn!("[sync] {} produced an invalid timeline: {}", source, e),
            }
        }

        Err(AppError::Sync("no alignment strategy succeeded".to_string()))
    }
}

// Services module
// Traits for the external collaborators of a batch run and their HTTP implementations

pub mod openai_tts;     // Speech synthesis over an OpenAI-compatible API
pub mod transcription;  // Word-level transcription over an OpenAI-compatible API

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::audio::AudioInfo;
use crate::errors::Result;
use crate::orchestrator::Job;
use crate::sync::{SubtitleSegment, SyncMetadata};

pub use openai_tts::OpenAiSpeechSynthesizer;
pub use transcription::WhisperRecognizer;

/// Скачанный источник
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    /// Длительность в секундах
    pub duration: f64,
}

/// Результат анализа источника
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Переведенный сценарий озвучки
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub lines: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Примечание для списка заданий
    #[serde(default)]
    pub remark: Option<String>,
}

/// Распознанное слово с временными метками
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, url: &str, work_dir: &Path) -> Result<FetchedMedia>;
}

#[async_trait]
pub trait ContentService: Send + Sync {
    async fn analyze(&self, media: &FetchedMedia, secret: &str) -> Result<Analysis>;

    async fn translate(&self, analysis: &Analysis, secret: &str) -> Result<Script>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Синтезирует речь, возвращает байты аудиофайла
    async fn synthesize(&self, text: &str, voice: &str, speed: f64, secret: &str) -> Result<Bytes>;
}

#[async_trait]
pub trait AlignmentService: Send + Sync {
    /// Сырой ответ сервиса выравнивания (JSON, возможно окруженный текстом)
    async fn align(&self, audio: &Path, texts: &[String]) -> Result<String>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// `cancel` прерывает только ожидание ключа API, не сам запрос
    async fn transcribe(&self, audio: &Path, cancel: &CancellationToken) -> Result<Vec<WordTiming>>;
}

#[async_trait]
pub trait AudioMeter: Send + Sync {
    async fn measure(&self, path: &Path) -> Result<AudioInfo>;
}

#[async_trait]
pub trait TimeStretcher: Send + Sync {
    /// Ускоряет аудио в `ratio` раз, возвращает путь к новому файлу
    async fn stretch(&self, path: &Path, ratio: f64) -> Result<PathBuf>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        job: &Job,
        voice: &str,
        audio: &Path,
        segments: &[SubtitleSegment],
        metadata: &SyncMetadata,
    ) -> Result<PathBuf>;
}

#[async_trait]
pub trait UsageAccounting: Send + Sync {
    async fn record_use(&self, url: &str) -> Result<()>;
}

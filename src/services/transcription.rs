//! Распознавание речи с пословными метками через OpenAI-совместимый
//! endpoint `/audio/transcriptions` (`verbose_json`, гранулярность `word`)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{SpeechRecognizer, WordTiming};
use crate::config::ServiceConfig;
use crate::credentials::CredentialPool;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    words: Vec<WordTiming>,
}

/// Разбирает ответ `verbose_json`; пробелы вокруг слов убираются
pub fn parse_verbose_json(content: &str) -> Result<Vec<WordTiming>> {
    let response: VerboseTranscription = serde_json::from_str(content)?;
    Ok(response
        .words
        .into_iter()
        .map(|w| WordTiming {
            word: w.word.trim().to_string(),
            ..w
        })
        .collect())
}

pub struct WhisperRecognizer {
    client: Client,
    api_base: String,
    model: String,
    language: Option<String>,
    credentials: Arc<CredentialPool>,
}

impl WhisperRecognizer {
    pub fn new(config: &ServiceConfig, credentials: Arc<CredentialPool>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
            language: config.transcription_language.clone(),
            credentials,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn transcribe(&self, audio: &Path, cancel: &CancellationToken) -> Result<Vec<WordTiming>> {
        let secret = self.credentials.current_secret(cancel).await?;
        let content = tokio::fs::read(audio).await?;
        let filename = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());
        info!("Transcribing {} ({} bytes)", filename, content.len());

        let file = Part::bytes(content)
            .file_name(filename)
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .part("file", file)
            .text("timestamp_granularities[]", "word")
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .header("Authorization", format!("Bearer {}", secret))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AppError::from_status(status.as_u16(), body));
        }

        let words = parse_verbose_json(&body)?;
        debug!("Transcription returned {} word(s)", words.len());
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbose_json_words() {
        let body = r#"{
            "text": "안녕하세요 여러분",
            "words": [
                {"word": " 안녕하세요", "start": 0.12, "end": 0.8},
                {"word": "여러분 ", "start": 0.85, "end": 1.3}
            ]
        }"#;
        let words = parse_verbose_json(body).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].word, "안녕하세요");
        assert_eq!(words[1].word, "여러분");
        assert!((words[1].end - 1.3).abs() < 1e-9);
    }

    #[test]
    fn test_parse_without_words() {
        assert!(parse_verbose_json(r#"{"text": "..."}"#).unwrap().is_empty());
    }
}

//! Синтез речи через OpenAI-совместимый endpoint `/audio/speech`
//!
//! Ответы кэшируются в памяти клиента по (модель, голос, скорость, текст),
//! повторный синтез той же строки не тратит квоту. Размер кэша ограничен,
//! при переполнении удаляются самые старые записи.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;

use super::SpeechSynthesizer;
use crate::config::ServiceConfig;
use crate::errors::{AppError, Result};

pub fn cache_key(model: &str, voice: &str, speed: f64, text: &str) -> String {
    let digest = md5::compute(format!("{}|{}|{:.3}|{}", model, voice, speed, text));
    format!("{:x}", digest)
}

/// Кэш синтезированного аудио
pub struct SpeechCache {
    /// Максимальный суммарный размер в байтах
    max_size: u64,
    total_size: u64,
    entries: HashMap<String, Bytes>,
    /// Порядок добавления, от старых к новым
    order: VecDeque<String>,
}

impl SpeechCache {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            total_size: 0,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).cloned()
    }

    /// Добавить запись; записи больше всего кэша не сохраняются
    pub fn insert(&mut self, key: String, audio: Bytes) {
        let size = audio.len() as u64;
        if size > self.max_size {
            debug!("Skipping TTS cache for {} bytes (limit {})", size, self.max_size);
            return;
        }
        if let Some(old) = self.entries.remove(&key) {
            self.total_size -= old.len() as u64;
            self.order.retain(|k| k != &key);
        }
        while self.total_size + size > self.max_size {
            let Some(oldest) = self.order.pop_front() else { break };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total_size -= evicted.len() as u64;
            }
        }
        self.total_size += size;
        self.order.push_back(key.clone());
        self.entries.insert(key, audio);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }
}

/// Клиент для OpenAI-совместимого TTS API
pub struct OpenAiSpeechSynthesizer {
    client: Client,
    api_base: String,
    model: String,
    cache: Mutex<SpeechCache>,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.tts_model.clone(),
            cache: Mutex::new(SpeechCache::new(config.speech_cache_max_bytes)),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, speed: f64, secret: &str) -> Result<Bytes> {
        if secret.trim().is_empty() {
            return Err(AppError::Configuration("API key is required for speech synthesis".to_string()));
        }

        let key = cache_key(&self.model, voice, speed, text);
        if let Some(cached) = self.cache.lock().get(&key) {
            debug!("TTS cache hit for {} chars ({})", text.chars().count(), voice);
            return Ok(cached);
        }

        info!("Generating speech: {} chars, voice {}, speed {:.2}", text.chars().count(), voice, speed);
        let response = self
            .client
            .post(format!("{}/audio/speech", self.api_base))
            .header("Authorization", format!("Bearer {}", secret))
            .json(&json!({
                "model": self.model,
                "voice": voice,
                "input": text,
                "speed": speed,
                "response_format": "wav",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status.as_u16(), body));
        }

        let mut audio = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            audio.extend_from_slice(&chunk?);
        }
        if audio.is_empty() {
            return Err(AppError::Audio("TTS response contained no audio".to_string()));
        }

        let audio = Bytes::from(audio);
        self.cache.lock().insert(key, audio.clone());
        debug!("Received {} bytes of audio", audio.len());
        Ok(audio)
    }
}

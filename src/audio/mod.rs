//! # Audio
//!
//! Измерение длительности и семплов синтезированной речи.

pub mod format;
pub mod silence;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::{AppError, Result};
use crate::services::AudioMeter;

pub use format::{decode_audio_file, duration_in_seconds, encode_wav, peak_amplitude};
pub use silence::{detect_leading_silence, detect_trailing_silence, voiced_window, VoicedWindow};

/// Decoded clip with its measured duration.
#[derive(Debug, Clone)]
pub struct AudioInfo {
    pub duration: f64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioInfo {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            duration: duration_in_seconds(samples.len(), sample_rate),
            samples,
            sample_rate,
        }
    }
}

/// Измеритель на основе декодирования файла
#[derive(Debug, Default, Clone, Copy)]
pub struct FileAudioMeter;

#[async_trait]
impl AudioMeter for FileAudioMeter {
    async fn measure(&self, path: &Path) -> Result<AudioInfo> {
        let path = path.to_path_buf();
        // Декодирование блокирующее, выносим из runtime
        let (samples, sample_rate) = tokio::task::spawn_blocking(move || decode_audio_file(&path))
            .await
            .map_err(|e| AppError::Audio(format!("Decoder task failed: {}", e)))??;
        Ok(AudioInfo::from_samples(samples, sample_rate))
    }
}

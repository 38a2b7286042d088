//! # TTS duration fitter
//!
//! Подгоняет озвучку под длительность видео: синтезирует, измеряет и
//! сокращает сценарий, пока результат не поместится в окно.

pub mod trim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::FitterConfig;
use crate::credentials::CredentialPool;
use crate::errors::{AppError, Result};
use crate::orchestrator::classify::{classify, ErrorClass};
use crate::segmenter::Segmenter;
use crate::services::{AudioMeter, SpeechSynthesizer};
use crate::sync::proportional::distribute;
use crate::sync::SubtitleSegment;
use crate::utils::workspace::{sanitize_filename, JobWorkspace};

pub use trim::{estimate_duration, shrink_by_rate, trim_script_by_chars};

const MIN_RATE: f64 = 0.30;
const MAX_RATE: f64 = 0.95;
const RATE_HEADROOM: f64 = 0.85;
const ROUGH_TIMING_GAP: f64 = 0.005;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("Script is empty")]
    EmptyScript,

    #[error("TTS length {best:.1}s exceeds {upper:.1}s after {attempts} attempts")]
    CannotFit { best: f64, upper: f64, attempts: u32 },
}

/// Допустимая длительность озвучки, секунды
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitWindow {
    pub lower: f64,
    pub upper: f64,
}

impl FitWindow {
    /// Окно для видео: озвучка занимает не больше `ratio` его длительности
    pub fn for_video(video_duration: f64, ratio: f64) -> Self {
        Self {
            lower: 0.0,
            upper: video_duration * ratio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FitResult {
    pub audio_path: PathBuf,
    pub duration: f64,
    /// Сегменты с грубой разметкой пропорционально числу символов
    pub segments: Vec<SubtitleSegment>,
    /// Итоговый (возможно сокращенный) сценарий
    pub script: String,
    pub attempts: u32,
    /// Результат длиннее окна, но в пределах допуска
    pub degraded: bool,
}

struct Attempt {
    path: PathBuf,
    duration: f64,
    script: String,
}

pub struct DurationFitter {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    meter: Arc<dyn AudioMeter>,
    credentials: Arc<CredentialPool>,
    segmenter: Segmenter,
    config: FitterConfig,
}

impl DurationFitter {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        meter: Arc<dyn AudioMeter>,
        credentials: Arc<CredentialPool>,
        segmenter: Segmenter,
        config: FitterConfig,
    ) -> Self {
        Self {
            synthesizer,
            meter,
            credentials,
            segmenter,
            config,
        }
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    pub fn estimate(&self, script: &str) -> f64 {
        estimate_duration(script, self.config.chars_per_second, self.config.speed_ratio)
    }

    pub async fn fit(
        &self,
        script: &str,
        voice: &str,
        window: FitWindow,
        workspace: &mut JobWorkspace,
        cancel: &CancellationToken,
    ) -> Result<FitResult> {
        let protected = self.segmenter.protected_lines();
        let mut script = crate::segmenter::splitter::normalize_whitespace(script);
        if script.is_empty() {
            return Err(FitError::EmptyScript.into());
        }

        let estimate = self.estimate(&script);
        info!(
            "[tts] {} chars, estimated {:.1}s, window {:.1}s",
            script.chars().count(),
            estimate,
            window.upper
        );
        if estimate > window.upper * self.config.preshrink_threshold {
            let rate = (window.upper / estimate).max(MIN_RATE);
            script = shrink_by_rate(&script, rate, protected);
            info!("[tts] pre-shrink to {:.0}%: {} chars", rate * 100.0, script.chars().count());
        }

        let mut best: Option<Attempt> = None;
        let mut last_error: Option<AppError> = None;
        let max_attempts = self.config.max_attempts;

        for attempt in 1..=max_attempts {
            info!("[tts] attempt {}/{}: {} chars", attempt, max_attempts, script.chars().count());
            let secret = self.credentials.current_secret(cancel).await?;

            let audio = match self
                .synthesizer
                .synthesize(&script, voice, self.config.speed_ratio, &secret)
                .await
            {
                Ok(audio) => audio,
                Err(e) if classify(&e) == ErrorClass::QuotaExceeded => {
                    let block = Duration::from_secs(self.config.rate_limit_block_minutes * 60);
                    let blocked = self.credentials.block_current(block);
                    warn!(
                        "[tts] rate limited on attempt {}, blocked {} for {} min",
                        attempt,
                        blocked.as_deref().unwrap_or("-"),
                        self.config.rate_limit_block_minutes
                    );
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let path = workspace.file_path(&format!("tts_{}", sanitize_filename(voice)), "wav");
            tokio::fs::write(&path, &audio).await?;
            let duration = self.meter.measure(&path).await?.duration;

            if duration <= window.upper {
                info!("[tts] fits: {:.1}s <= {:.1}s", duration, window.upper);
                if duration < window.lower {
                    warn!("[tts] narration {:.1}s is shorter than {:.1}s", duration, window.lower);
                }
                return Ok(self.result(path, duration, script, voice, attempt, false));
            }

            let overshoot = duration / window.upper;
            warn!("[tts] too long: {:.1}s > {:.1}s", duration, window.upper);
            if best.as_ref().is_none_or(|b| duration < b.duration) {
                best = Some(Attempt {
                    path,
                    duration,
                    script: script.clone(),
                });
            }

            if attempt < max_attempts {
                let rate = (RATE_HEADROOM / overshoot).clamp(MIN_RATE, MAX_RATE);
                script = shrink_by_rate(&script, rate, protected);
                info!("[tts] retry with {:.0}% of the text", rate * 100.0);
            }
        }

        let Some(best) = best else {
            return Err(last_error.unwrap_or_else(|| AppError::Audio("speech synthesis produced no audio".to_string())));
        };

        if best.duration <= window.upper * (1.0 + self.config.degraded_tolerance) {
            warn!(
                "[tts] using best attempt {:.1}s over {:.1}s window",
                best.duration, window.upper
            );
            return Ok(self.result(best.path, best.duration, best.script, voice, max_attempts, true));
        }

        Err(FitError::CannotFit {
            best: best.duration,
            upper: window.upper,
            attempts: max_attempts,
        }
        .into())
    }

    fn result(
        &self,
        audio_path: PathBuf,
        duration: f64,
        script: String,
        voice: &str,
        attempts: u32,
        degraded: bool,
    ) -> FitResult {
        let texts = self.segmenter.segment(&script);
        let segments = distribute(&texts, 0.0, duration, duration, ROUGH_TIMING_GAP)
            .into_iter()
            .map(|seg| SubtitleSegment {
                speaker_label: Some(voice.to_string()),
                audio_path: Some(audio_path.clone()),
                ..seg
            })
            .collect();

        FitResult {
            audio_path,
            duration,
            segments,
            script,
            attempts,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    mod test_fitter;
    mod test_trim;
}

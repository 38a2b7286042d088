//! Этапы обработки одного задания
//!
//! скачивание → проверка длительности → анализ → перевод → для каждого голоса:
//! подгонка озвучки → синхронизация → (ускорение + перенос шкалы) → рендер.
//! Каждый внешний вызов ограничен таймаутом и сопровождается сообщениями о
//! прогрессе.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::context::BatchContext;
use crate::audio::{detect_leading_silence, AudioInfo};
use crate::config::{BatchConfig, SyncConfig};
use crate::credentials::CredentialPool;
use crate::errors::{AppError, Result};
use crate::fitter::{DurationFitter, FitWindow};
use crate::segmenter::{merge_short_drafts, Segmenter};
use crate::services::{
    AlignmentService, AudioMeter, ContentService, MediaSource, Renderer, SpeechRecognizer,
    SpeechSynthesizer, TimeStretcher, UsageAccounting,
};
use crate::sync::{
    rescale_to_duration, validate_timeline, SubtitleSegment, SyncAudio, SyncMetadata, Synchronizer,
    TimestampsSource,
};
use crate::utils::workspace::JobWorkspace;

/// Внешние участники обработки
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn MediaSource>,
    pub content: Arc<dyn ContentService>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub meter: Arc<dyn AudioMeter>,
    pub renderer: Arc<dyn Renderer>,
    pub alignment: Option<Arc<dyn AlignmentService>>,
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub stretcher: Option<Arc<dyn TimeStretcher>>,
    pub usage: Option<Arc<dyn UsageAccounting>>,
}

/// Результат успешной обработки задания
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub remark: Option<String>,
    pub outputs: Vec<PathBuf>,
}

pub struct Pipeline {
    services: Services,
    segmenter: Segmenter,
    fitter: DurationFitter,
    synchronizer: Synchronizer,
}

impl Pipeline {
    pub fn new(services: Services, config: &BatchConfig, credentials: Arc<CredentialPool>) -> Self {
        let segmenter = Segmenter::new(&config.segmenter);
        let fitter = DurationFitter::new(
            services.synthesizer.clone(),
            services.meter.clone(),
            credentials,
            segmenter.clone(),
            config.fitter.clone(),
        );
        let synchronizer = Synchronizer::with_services(
            config.sync.clone(),
            services.alignment.clone(),
            services.recognizer.clone(),
        );
        Self {
            services,
            segmenter,
            fitter,
            synchronizer,
        }
    }

    pub fn usage(&self) -> Option<&Arc<dyn UsageAccounting>> {
        self.services.usage.as_ref()
    }

    pub async fn process(&self, ctx: &BatchContext, url: &str) -> Result<JobOutcome> {
        let config = &ctx.config;
        let mut workspace = JobWorkspace::create(config.work_dir.as_deref(), url, true)?;

        let media = stage(ctx, url, "download", self.services.source.fetch(url, workspace.path())).await?;
        info!("[check] {} is {:.1}s", url, media.duration);
        if media.duration < config.min_source_secs {
            return Err(AppError::ValidationSkip(format!("너무짧음{:.0}초", media.duration)));
        }
        if media.duration > config.max_source_secs {
            return Err(AppError::ValidationSkip(format!("길이초과{:.0}초", media.duration)));
        }

        let cancel = ctx.cancel_token();
        let secret = ctx.credentials.current_secret(&cancel).await?;
        let analysis = stage(ctx, url, "analysis", self.services.content.analyze(&media, &secret)).await?;

        let secret = ctx.credentials.current_secret(&cancel).await?;
        let script = stage(ctx, url, "translation", self.services.content.translate(&analysis, &secret)).await?;

        let drafts = merge_short_drafts(&script.lines, self.segmenter.target_len());
        let text = drafts.join(" ");
        let window = FitWindow::for_video(media.duration, self.fitter.config().max_duration_ratio);

        let mut outputs = Vec::with_capacity(config.voices.len());
        for voice in &config.voices {
            if ctx.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let step = format!("tts:{}", voice);
            let fit = stage(
                ctx,
                url,
                &step,
                self.fitter.fit(&text, voice, window, &mut workspace, &cancel),
            )
            .await?;
            if fit.degraded {
                ctx.display.warn(format!("[tts] {} narration is {:.1}s, over the window", voice, fit.duration));
            }

            let texts: Vec<String> = fit.segments.iter().map(|s| s.text.clone()).collect();
            let info = self.services.meter.measure(&fit.audio_path).await?;
            let audio = SyncAudio {
                path: &fit.audio_path,
                info: &info,
            };
            let (segments, metadata) = stage(
                ctx,
                url,
                "sync",
                self.synchronizer
                    .align(&texts, audio, self.fitter.config().speed_ratio, &cancel),
            )
            .await?;
            let segments = label(segments, voice, &fit.audio_path);

            let (audio_path, segments, metadata) = match self.services.stretcher.as_ref() {
                Some(stretcher) if (config.post_stretch_ratio - 1.0).abs() > f64::EPSILON => {
                    let ratio = config.post_stretch_ratio;
                    let path = stage(ctx, url, "stretch", stretcher.stretch(&fit.audio_path, ratio)).await?;
                    let stretched = self.services.meter.measure(&path).await?;
                    let (segments, metadata) =
                        restretch(&segments, &metadata, &stretched, ratio, self.synchronizer.config())?;
                    (path.clone(), label(segments, voice, &path), metadata)
                }
                _ => (fit.audio_path.clone(), segments, metadata),
            };

            let job = ctx
                .job(url)
                .ok_or_else(|| AppError::Other(format!("job {} disappeared from the queue", url)))?;
            let output = stage(
                ctx,
                url,
                "render",
                self.services
                    .renderer
                    .render(&job, voice, &audio_path, &segments, &metadata),
            )
            .await?;
            info!("[render] {} -> {}", voice, output.display());
            outputs.push(output);
        }

        if let Err(e) = workspace.cleanup() {
            debug!("[cleanup] {}", e);
        }

        Ok(JobOutcome {
            remark: script.remark,
            outputs,
        })
    }
}

fn label(segments: Vec<SubtitleSegment>, voice: &str, audio: &Path) -> Vec<SubtitleSegment> {
    segments
        .into_iter()
        .map(|seg| SubtitleSegment {
            speaker_label: Some(voice.to_string()),
            audio_path: Some(audio.to_path_buf()),
            ..seg
        })
        .collect()
}

/// Переносит шкалу сегментов на ускоренное аудио и заново проверяет ее
fn restretch(
    segments: &[SubtitleSegment],
    metadata: &SyncMetadata,
    stretched: &AudioInfo,
    ratio: f64,
    sync: &SyncConfig,
) -> Result<(Vec<SubtitleSegment>, SyncMetadata)> {
    let offset = detect_leading_silence(
        &stretched.samples,
        stretched.sample_rate,
        sync.silence_threshold_ratio,
        sync.max_leading_silence,
    );
    let old_span = segments
        .last()
        .zip(segments.first())
        .map(|(last, first)| last.end - first.start)
        .unwrap_or(0.0);
    let new_span = (old_span / ratio).min((stretched.duration - offset - sync.min_gap).max(0.0));
    let rescaled = rescale_to_duration(segments, offset, new_span);
    validate_timeline(&rescaled, stretched.duration, sync.overlap_epsilon, sync.end_tolerance)?;

    let metadata = SyncMetadata {
        audio_duration: stretched.duration,
        speed_ratio: metadata.speed_ratio * ratio,
        start_offset: offset,
        timestamps_source: TimestampsSource::Preserved,
    };
    Ok((rescaled, metadata))
}

/// Выполняет внешний вызов с таймаутом и сообщениями о прогрессе.
/// После остановки новый этап не начинается, но уже начатый вызов
/// доводится до конца (или до таймаута).
pub async fn stage<T, F>(ctx: &BatchContext, url: &str, step: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if ctx.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    ctx.display.info(format!("[{}] {}", step, url));
    let limit = Duration::from_secs(ctx.config.call_timeout_secs);
    let started = Instant::now();
    let mut heartbeat = tokio::time::interval(Duration::from_secs(ctx.config.heartbeat_secs.max(1)));
    // Первый тик interval срабатывает сразу
    heartbeat.tick().await;

    let call = tokio::time::timeout(limit, call);
    tokio::pin!(call);
    loop {
        tokio::select! {
            result = &mut call => {
                return match result {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Timeout(format!(
                        "{} exceeded {}s",
                        step,
                        limit.as_secs()
                    ))),
                };
            }
            _ = heartbeat.tick() => {
                ctx.display.progress(url, step, started.elapsed().as_secs());
            }
        }
    }
}

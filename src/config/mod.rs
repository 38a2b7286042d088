// Configuration module
// Centralized management of batch run configuration

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Настройки цикла обработки очереди
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Максимум повторов для классов ошибок со счетчиком
    pub max_retries: u32,
    /// Минимальная длительность исходного видео (сек)
    pub min_source_secs: f64,
    /// Максимальная длительность исходного видео (сек)
    pub max_source_secs: f64,
    /// Пауза между заданиями (сек)
    pub gap_secs: u64,
    /// Сколько тиков ждать новых заданий при пустой очереди
    pub idle_poll_attempts: u32,
    /// Пауза перед повторной проверкой пустой очереди (сек)
    pub idle_rescan_secs: u64,
    /// Ожидание при перегрузке сервера (сек)
    pub overload_wait_secs: u64,
    /// Верхняя граница числа ожиданий при перегрузке, None = без ограничения
    pub max_overload_waits: Option<u32>,
    /// Множитель ожидания при превышении квоты (сек × номер попытки)
    pub quota_wait_step_secs: u64,
    /// Ожидание после ошибки 500 (сек)
    pub server_error_wait_secs: u64,
    /// Блокировка ключа при 429/403 (мин)
    pub key_block_minutes: u64,
    /// Таймаут одного внешнего вызова (сек)
    pub call_timeout_secs: u64,
    /// Длительность одного тика ожидания (мс)
    pub tick_ms: u64,
    /// Таймаут захвата блокировки запуска (сек)
    pub run_lock_timeout_secs: u64,
    /// Количество попыток захвата блокировки запуска
    pub run_lock_attempts: u32,
    /// Таймаут ожидания рабочего потока при остановке (сек)
    pub stop_join_timeout_secs: u64,
    /// Интервал сообщений о прогрессе во время длинных вызовов (сек)
    pub heartbeat_secs: u64,
    /// Голоса, для которых создается озвучка, в порядке обработки
    pub voices: Vec<String>,
    /// Коэффициент ускорения после синтеза, 1.0 = без растяжения
    pub post_stretch_ratio: f64,
    /// Рабочая директория для файлов заданий
    pub work_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_source_secs: 10.0,
            max_source_secs: 39.0,
            gap_secs: 10,
            idle_poll_attempts: 10,
            idle_rescan_secs: 10,
            overload_wait_secs: 300,
            max_overload_waits: None,
            quota_wait_step_secs: 15,
            server_error_wait_secs: 60,
            key_block_minutes: 30,
            call_timeout_secs: 600,
            tick_ms: 1000,
            run_lock_timeout_secs: 300,
            run_lock_attempts: 3,
            stop_join_timeout_secs: 30,
            heartbeat_secs: 15,
            voices: vec!["Charon".to_string()],
            post_stretch_ratio: 1.0,
            work_dir: None,
        }
    }
}

/// Параметры разбиения текста на субтитры
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Целевая длина сегмента в символах
    pub target_len: usize,
    /// Защищенные фразы (CTA), которые разбиваются отдельно и добавляются в конец
    pub protected_lines: Vec<String>,
    /// Максимальная длина CTA, которая остается одним сегментом
    pub protected_single_max: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_len: 13,
            protected_lines: Vec::new(),
            protected_single_max: 15,
        }
    }
}

/// Параметры подгонки длительности TTS
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    pub max_attempts: u32,
    /// Скорость речи для оценки длительности (символов в секунду)
    pub chars_per_second: f64,
    /// Скорость синтеза, передаваемая в TTS
    pub speed_ratio: f64,
    /// Доля длительности видео, которую может занять озвучка
    pub max_duration_ratio: f64,
    /// Порог превышения оценки для предварительного сокращения
    pub preshrink_threshold: f64,
    /// Допустимое превышение для деградированного результата
    pub degraded_tolerance: f64,
    /// Блокировка ключа при rate limit во время синтеза (мин)
    pub rate_limit_block_minutes: u64,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            chars_per_second: 7.0,
            speed_ratio: 1.2,
            max_duration_ratio: 0.85,
            preshrink_threshold: 1.5,
            degraded_tolerance: 0.30,
            rate_limit_block_minutes: 5,
        }
    }
}

/// Параметры синхронизации временных меток
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Доля пиковой амплитуды для детектора тишины
    pub silence_threshold_ratio: f32,
    /// Смещения больше этого значения считаются ошибкой детектора
    pub max_leading_silence: f64,
    /// Допустимое расхождение оценок начала речи
    pub onset_tolerance: f64,
    /// Допуск на перекрытие сегментов
    pub overlap_epsilon: f64,
    /// Допуск на выход за конец аудио
    pub end_tolerance: f64,
    /// Минимальный зазор между соседними сегментами
    pub min_gap: f64,
    pub use_external_alignment: bool,
    pub use_recognition: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ratio: 0.01,
            max_leading_silence: 0.5,
            onset_tolerance: 0.1,
            overlap_epsilon: 0.01,
            end_tolerance: 0.05,
            min_gap: 0.005,
            use_external_alignment: true,
            use_recognition: true,
        }
    }
}

/// Параметры HTTP-сервисов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_base: String,
    pub tts_model: String,
    pub transcription_model: String,
    /// Язык распознавания, None = автоопределение
    pub transcription_language: Option<String>,
    pub request_timeout_secs: u64,
    /// Файл с ключами API (JSON: [{"name": ..., "secret": ...}])
    pub credentials_file: Option<PathBuf>,
    /// Файл сохранения сессии
    pub session_file: Option<PathBuf>,
    /// Предельный размер кэша синтезированной речи (байт)
    pub speech_cache_max_bytes: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            tts_model: "tts-1".to_string(),
            transcription_model: "whisper-1".to_string(),
            transcription_language: Some("ko".to_string()),
            request_timeout_secs: 120,
            credentials_file: None,
            session_file: None,
            speech_cache_max_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub orchestrator: OrchestratorConfig,
    pub segmenter: SegmenterConfig,
    pub fitter: FitterConfig,
    pub sync: SyncConfig,
    pub services: ServiceConfig,
}

impl BatchConfig {
    /// Проверяет согласованность параметров
    pub fn validate(&self) -> Result<()> {
        let o = &self.orchestrator;
        if o.min_source_secs > o.max_source_secs {
            return Err(AppError::Configuration(format!(
                "min_source_secs ({}) exceeds max_source_secs ({})",
                o.min_source_secs, o.max_source_secs
            )));
        }
        if o.tick_ms == 0 {
            return Err(AppError::Configuration("tick_ms must be positive".to_string()));
        }
        if o.run_lock_attempts == 0 {
            return Err(AppError::Configuration("run_lock_attempts must be at least 1".to_string()));
        }
        if o.post_stretch_ratio <= 0.0 {
            return Err(AppError::Configuration("post_stretch_ratio must be positive".to_string()));
        }
        if self.segmenter.target_len < 4 {
            return Err(AppError::Configuration(format!(
                "target_len {} is too small",
                self.segmenter.target_len
            )));
        }
        let f = &self.fitter;
        if f.max_attempts == 0 || f.chars_per_second <= 0.0 || f.speed_ratio <= 0.0 {
            return Err(AppError::Configuration(
                "fitter attempts, chars_per_second and speed_ratio must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sync.silence_threshold_ratio) {
            return Err(AppError::Configuration(
                "silence_threshold_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Загружает конфигурацию из JSON-файла; отсутствующий файл дает значения по умолчанию
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(BatchConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: BatchConfig = serde_json::from_str(&content)?;
    config.validate()?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

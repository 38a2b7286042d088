//! # narration-batch
//!
//! Пакетная озвучка коротких видео: очередь заданий с повторами и ротацией
//! ключей API, подгонка длительности TTS под видео и синхронизация субтитров
//! с синтезированной речью.

pub mod audio;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod fitter;
pub mod orchestrator;
pub mod persistence;
pub mod segmenter;
pub mod services;
pub mod sync;
pub mod utils;

pub use errors::{AppError, Result};

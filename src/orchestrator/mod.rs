//! # Job queue orchestrator
//!
//! Последовательная обработка очереди URL в рабочем потоке с политикой
//! повторов по классам ошибок и ротацией ключей API.
//!
//! Состояния задания: `waiting → processing → completed | failed | skipped`.

pub mod classify;
pub mod context;
pub mod controller;
pub mod events;
pub mod job;
pub mod pipeline;
pub mod runner;
pub mod wait;

pub use classify::{classify, short_code, translate_message, ErrorClass};
pub use context::BatchContext;
pub use controller::{BatchController, RunGuard, RunLock};
pub use events::{display_channel, BatchSummary, DisplayCommand, DisplayReceiver, DisplaySender, LogLevel};
pub use job::{Job, JobStatus};
pub use pipeline::{JobOutcome, Pipeline, Services};
pub use runner::BatchRunner;

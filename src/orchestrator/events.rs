// Display command queue
// The worker never touches the UI; it pushes commands that a single consumer drains

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use super::job::JobStatus;

/// Итоги запуска
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Команда для отображения
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayCommand {
    StatusChanged {
        url: String,
        status: JobStatus,
        short_message: String,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    Progress {
        url: String,
        step: String,
        elapsed_secs: u64,
    },
    RunFinished(BatchSummary),
}

pub type DisplayReceiver = mpsc::UnboundedReceiver<DisplayCommand>;

/// Отправитель команд; закрытый получатель не считается ошибкой
#[derive(Debug, Clone)]
pub struct DisplaySender {
    tx: mpsc::UnboundedSender<DisplayCommand>,
}

pub fn display_channel() -> (DisplaySender, DisplayReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DisplaySender { tx }, rx)
}

impl DisplaySender {
    pub fn send(&self, command: DisplayCommand) {
        if let Err(e) = self.tx.send(command) {
            debug!("Display queue closed, dropping {:?}", e.0);
        }
    }

    pub fn status(&self, url: &str, status: JobStatus, short_message: &str) {
        self.send(DisplayCommand::StatusChanged {
            url: url.to_string(),
            status,
            short_message: short_message.to_string(),
        });
    }

    /// Пишет в журнал и дублирует строку в очередь отображения
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.send(DisplayCommand::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn progress(&self, url: &str, step: &str, elapsed_secs: u64) {
        self.send(DisplayCommand::Progress {
            url: url.to_string(),
            step: step.to_string(),
            elapsed_secs,
        });
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Статус задания в очереди
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Waiting,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Задание еще не завершено
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Waiting | JobStatus::Processing)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Waiting, Processing)
                // Повторная попытка того же задания
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Skipped)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Задание: URL источника и его состояние
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub url: String,
    #[serde(default)]
    pub status: JobStatus,
    /// Короткий код ошибки или пропуска
    #[serde(default)]
    pub short_message: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: JobStatus::Waiting,
            short_message: String::new(),
            remark: String::new(),
            updated_at: None,
        }
    }

    /// Переводит задание в `next`, запрещенный переход возвращает ошибку
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Other(format!(
                "illegal status transition {} -> {} for {}",
                self.status, next, self.url
            )));
        }
        self.status = next;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Восстановление после сбоя: прерванное задание снова ждет обработки.
    /// Возвращает true, если статус изменился.
    pub fn reset_interrupted(&mut self) -> bool {
        if self.status == JobStatus::Processing {
            self.status = JobStatus::Waiting;
            self.updated_at = Some(Utc::now());
            return true;
        }
        false
    }
}

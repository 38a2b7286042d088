//! # Session persistence
//!
//! Снимок очереди заданий сохраняется после каждого завершенного задания и
//! удаляется, когда запуск заканчивается без незавершенных заданий.
//! При загрузке прерванные задания (`processing`) снова становятся `waiting`.

pub mod session;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::orchestrator::{Job, JobStatus};

pub use session::JsonSessionStore;

/// Счетчики заданий по статусам
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    pub total: usize,
    pub waiting: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SessionStats {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut stats = Self {
            total: jobs.len(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }
}

/// Сохраненное состояние очереди
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub saved_at: Option<DateTime<Utc>>,
    pub url_queue: Vec<String>,
    /// `null` допускается и читается как `waiting`
    pub url_status: HashMap<String, Option<JobStatus>>,
    pub url_status_message: HashMap<String, String>,
    pub url_remarks: HashMap<String, String>,
    pub url_updated_at: HashMap<String, DateTime<Utc>>,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut snapshot = Self {
            saved_at: Some(Utc::now()),
            stats: SessionStats::from_jobs(jobs),
            ..Self::default()
        };
        for job in jobs {
            snapshot.url_queue.push(job.url.clone());
            snapshot.url_status.insert(job.url.clone(), Some(job.status));
            if !job.short_message.is_empty() {
                snapshot
                    .url_status_message
                    .insert(job.url.clone(), job.short_message.clone());
            }
            if !job.remark.is_empty() {
                snapshot.url_remarks.insert(job.url.clone(), job.remark.clone());
            }
            if let Some(updated_at) = job.updated_at {
                snapshot.url_updated_at.insert(job.url.clone(), updated_at);
            }
        }
        snapshot
    }

    /// Восстанавливает задания в порядке очереди.
    ///
    /// Отсутствующий статус и `processing` становятся `waiting`; URL со
    /// статусом `processing`, которых нет в очереди, добавляются в конец в
    /// порядке `url_updated_at`, при равенстве по URL.
    pub fn into_jobs(mut self) -> Vec<Job> {
        let mut orphans: Vec<String> = self
            .url_status
            .iter()
            .filter(|(url, status)| {
                **status == Some(JobStatus::Processing) && !self.url_queue.contains(*url)
            })
            .map(|(url, _)| url.clone())
            .collect();
        // Без отметки времени раньше остальных, затем по времени и URL
        orphans.sort_by(|a, b| {
            let at_a = self.url_updated_at.get(a);
            let at_b = self.url_updated_at.get(b);
            at_a.cmp(&at_b).then_with(|| a.cmp(b))
        });
        self.url_queue.extend(orphans);

        let mut jobs: Vec<Job> = Vec::with_capacity(self.url_queue.len());
        let mut recovered = 0;
        for url in self.url_queue {
            if jobs.iter().any(|j| j.url == url) {
                debug!("[session] duplicate url {} dropped", url);
                continue;
            }
            let mut job = Job::new(url.clone());
            job.status = self.url_status.get(&url).copied().flatten().unwrap_or_default();
            job.short_message = self.url_status_message.remove(&url).unwrap_or_default();
            job.remark = self.url_remarks.remove(&url).unwrap_or_default();
            job.updated_at = self.url_updated_at.get(&url).copied();
            if job.reset_interrupted() {
                recovered += 1;
                info!("[session] interrupted job restarts: {}", url);
            }
            jobs.push(job);
        }

        if recovered > 0 {
            info!("[session] {} interrupted job(s) reset to waiting", recovered);
        }
        jobs
    }
}

/// Хранилище состояния очереди
pub trait JobStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    fn load(&self) -> Result<Option<SessionSnapshot>>;

    fn clear(&self) -> Result<()>;
}

/// Хранилище в памяти, для запусков без файла сессии
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    fn clear(&self) -> Result<()> {
        *self.snapshot.lock() = None;
        Ok(())
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use log::{error, warn};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::events::DisplaySender;
use super::job::{Job, JobStatus};
use crate::config::OrchestratorConfig;
use crate::credentials::CredentialPool;
use crate::errors::{AppError, Result};
use crate::persistence::{JobStore, SessionSnapshot};

/// Общее состояние запуска: очередь заданий, пул ключей, токен отмены,
/// очередь отображения и хранилище сессии
pub struct BatchContext {
    jobs: RwLock<Vec<Job>>,
    pub credentials: Arc<CredentialPool>,
    cancel: Mutex<CancellationToken>,
    pub display: DisplaySender,
    store: Arc<dyn JobStore>,
    pub config: OrchestratorConfig,
}

impl BatchContext {
    pub fn new(
        jobs: Vec<Job>,
        credentials: Arc<CredentialPool>,
        display: DisplaySender,
        store: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            jobs: RwLock::new(jobs),
            credentials,
            cancel: Mutex::new(CancellationToken::new()),
            display,
            store,
            config,
        }
    }

    /// Восстанавливает очередь из хранилища; пустое хранилище дает пустую очередь
    pub fn restore(
        credentials: Arc<CredentialPool>,
        display: DisplaySender,
        store: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Result<Self> {
        let jobs = store.load()?.map(SessionSnapshot::into_jobs).unwrap_or_default();
        Ok(Self::new(jobs, credentials, display, store, config))
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.lock().is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Новый токен для следующего запуска, если предыдущий был отменен
    pub fn renew_token(&self) {
        let mut token = self.cancel.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.read().clone()
    }

    pub fn job(&self, url: &str) -> Option<Job> {
        self.jobs.read().iter().find(|j| j.url == url).cloned()
    }

    /// Добавляет задание в конец очереди; повторный URL отклоняется
    pub fn enqueue(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Other("empty url".to_string()));
        }
        let mut jobs = self.jobs.write();
        if jobs.iter().any(|j| j.url == url) {
            return Err(AppError::Other(format!("duplicate url: {}", url)));
        }
        jobs.push(Job::new(url));
        drop(jobs);
        self.display.status(url, JobStatus::Waiting, "");
        Ok(())
    }

    /// Первое ожидающее задание, которое еще не отправлялось в этом запуске
    pub fn next_waiting(&self, dispatched: &HashSet<String>) -> Option<String> {
        self.jobs
            .read()
            .iter()
            .find(|j| j.status == JobStatus::Waiting && !dispatched.contains(&j.url))
            .map(|j| j.url.clone())
    }

    pub fn waiting_count(&self) -> usize {
        self.jobs
            .read()
            .iter()
            .filter(|j| j.status == JobStatus::Waiting)
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs.read().iter().filter(|j| j.status.is_pending()).count()
    }

    /// Меняет статус по таблице переходов и сообщает об изменении
    pub fn set_status(&self, url: &str, status: JobStatus, short_message: &str) {
        let mut jobs = self.jobs.write();
        let Some(job) = jobs.iter_mut().find(|j| j.url == url) else {
            warn!("[queue] status update for unknown url {}", url);
            return;
        };
        if let Err(e) = job.transition(status) {
            error!("[queue] {}", e);
            return;
        }
        job.short_message = short_message.to_string();
        drop(jobs);
        self.display.status(url, status, short_message);
    }

    pub fn set_remark(&self, url: &str, remark: &str) {
        if let Some(job) = self.jobs.write().iter_mut().find(|j| j.url == url) {
            job.remark = remark.to_string();
        }
    }

    /// Ошибка сохранения записывается в журнал и не прерывает запуск
    pub fn save_session(&self) {
        let snapshot = SessionSnapshot::from_jobs(&self.jobs.read());
        if let Err(e) = self.store.save(&snapshot) {
            error!("[session] save failed: {}", e);
        }
    }

    pub fn clear_session(&self) {
        if let Err(e) = self.store.clear() {
            error!("[session] clear failed: {}", e);
        }
    }
}

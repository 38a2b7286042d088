//! Цикл обработки очереди
//!
//! Задания обрабатываются строго по одному. Ошибка задания никогда не
//! завершает запуск: она классифицируется и либо повторяется по политике
//! своего класса, либо фиксируется как `failed`/`skipped`. Пустая очередь
//! тоже не завершает запуск: цикл ждет новые задания до остановки.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info};

use super::classify::{classify, short_code, translate_message, ErrorClass};
use super::context::BatchContext;
use super::events::{BatchSummary, DisplayCommand};
use super::job::JobStatus;
use super::pipeline::{JobOutcome, Pipeline};
use super::wait::{overload_wait, sleep_ticks};
use crate::credentials::CredentialError;
use crate::errors::{AppError, Result};

const LOG_MESSAGE_LIMIT: usize = 100;

enum Next {
    Retry,
    Done,
}

/// Счетчики повторов одного задания
#[derive(Debug, Default)]
struct RetryState {
    retry_count: u32,
    overload_waits: u32,
}

pub struct BatchRunner {
    ctx: Arc<BatchContext>,
    pipeline: Arc<Pipeline>,
}

impl BatchRunner {
    pub fn new(ctx: Arc<BatchContext>, pipeline: Arc<Pipeline>) -> Self {
        Self { ctx, pipeline }
    }

    fn tick(&self) -> Duration {
        Duration::from_millis(self.ctx.config.tick_ms)
    }

    async fn sleep(&self, duration: Duration) -> Result<()> {
        sleep_ticks(duration, self.tick(), &self.ctx.cancel_token()).await
    }

    pub async fn run(&self) -> BatchSummary {
        let ctx = &self.ctx;
        let mut dispatched: HashSet<String> = HashSet::new();
        let mut summary = BatchSummary::default();

        ctx.display.info(format!("[batch] started with {} waiting job(s)", ctx.waiting_count()));

        loop {
            if ctx.is_cancelled() {
                ctx.display.warn("[batch] stop requested");
                break;
            }

            let Some(url) = self.next_job(&dispatched).await else {
                break;
            };
            dispatched.insert(url.clone());

            match self.process_with_retry(&url).await {
                Some(JobStatus::Completed) => summary.success += 1,
                Some(JobStatus::Failed) => summary.failed += 1,
                Some(JobStatus::Skipped) => summary.skipped += 1,
                _ => {}
            }

            if ctx.is_cancelled() {
                ctx.display.warn("[batch] stop requested");
                break;
            }
            if ctx.next_waiting(&dispatched).is_some() {
                debug!("[batch] gap {}s before the next job", ctx.config.gap_secs);
                if self.sleep(Duration::from_secs(ctx.config.gap_secs)).await.is_err() {
                    break;
                }
            }
        }

        self.finish(summary)
    }

    /// Следующее ожидающее задание. При пустой очереди опрашивает ее каждый
    /// тик, затем ждет `idle_rescan_secs` и повторяет, пока запуск не остановлен.
    /// None означает остановку.
    async fn next_job(&self, dispatched: &HashSet<String>) -> Option<String> {
        let ctx = &self.ctx;
        if let Some(url) = ctx.next_waiting(dispatched) {
            return Some(url);
        }

        let mut announced = false;
        loop {
            for _ in 0..ctx.config.idle_poll_attempts.max(1) {
                self.sleep(self.tick()).await.ok()?;
                if let Some(url) = ctx.next_waiting(dispatched) {
                    ctx.display.info("[batch] new job detected");
                    return Some(url);
                }
            }

            if announced {
                debug!("[batch] still idle, rescanning in {}s", ctx.config.idle_rescan_secs);
            } else {
                ctx.display.info(format!(
                    "[batch] no waiting jobs, rescanning every {}s until stopped",
                    ctx.config.idle_rescan_secs
                ));
                announced = true;
            }
            self.sleep(Duration::from_secs(ctx.config.idle_rescan_secs)).await.ok()?;
            if let Some(url) = ctx.next_waiting(dispatched) {
                ctx.display.info("[batch] new job detected");
                return Some(url);
            }
        }
    }

    /// Обрабатывает задание с повторами. Возвращает итоговый статус или None,
    /// если обработка прервана остановкой.
    async fn process_with_retry(&self, url: &str) -> Option<JobStatus> {
        let ctx = &self.ctx;
        let mut state = RetryState::default();

        loop {
            if ctx.is_cancelled() {
                return None;
            }
            ctx.set_status(url, JobStatus::Processing, "");

            let attempt = AssertUnwindSafe(self.pipeline.process(ctx, url)).catch_unwind().await;
            let result = match attempt {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "panic".to_string());
                    Err(AppError::Other(format!("worker panic: {}", message)))
                }
            };

            match result {
                Ok(outcome) => {
                    self.complete(url, outcome).await;
                    return Some(JobStatus::Completed);
                }
                Err(AppError::Cancelled) => {
                    ctx.display.warn(format!("[batch] {} interrupted", url));
                    return None;
                }
                Err(err) => match self.handle_failure(url, &err, &mut state).await {
                    Next::Retry => continue,
                    Next::Done => return ctx.job(url).map(|j| j.status).filter(|s| !s.is_pending()),
                },
            }
        }
    }

    async fn complete(&self, url: &str, outcome: JobOutcome) {
        let ctx = &self.ctx;
        ctx.set_status(url, JobStatus::Completed, "");
        if let Some(remark) = outcome.remark.as_deref().filter(|r| !r.is_empty()) {
            ctx.set_remark(url, remark);
        }
        if let Some(usage) = self.pipeline.usage() {
            if let Err(e) = usage.record_use(url).await {
                ctx.display.warn(format!("[usage] accounting failed for {}: {}", url, e));
            }
        }
        ctx.display.info(format!("[batch] completed {} ({} output(s))", url, outcome.outputs.len()));
        ctx.save_session();
    }

    fn fail(&self, url: &str, err: &AppError) {
        let code = short_code(err);
        self.ctx.set_status(url, JobStatus::Failed, &code);
        self.ctx.display.error(format!("[batch] failed {}: {}", url, code));
        self.ctx.save_session();
    }

    async fn handle_failure(&self, url: &str, err: &AppError, state: &mut RetryState) -> Next {
        let ctx = &self.ctx;
        let config = &ctx.config;
        let class = classify(err);
        let message: String = translate_message(&err.to_string())
            .chars()
            .take(LOG_MESSAGE_LIMIT)
            .collect();
        ctx.display.warn(format!("[error] {}: {}", url, message));
        debug!("[error] {:?} from {}", class, err);

        let block = Duration::from_secs(config.key_block_minutes * 60);
        match class {
            ErrorClass::ValidationSkip => {
                let code = short_code(err);
                ctx.set_status(url, JobStatus::Skipped, &code);
                ctx.display.info(format!("[batch] skipped {}: {}", url, code));
                ctx.save_session();
                Next::Done
            }
            ErrorClass::ServerOverloaded => {
                state.overload_waits += 1;
                if config.max_overload_waits.is_some_and(|max| state.overload_waits > max) {
                    self.fail(url, err);
                    return Next::Done;
                }
                let wait = Duration::from_secs(config.overload_wait_secs);
                match overload_wait(wait, self.tick(), &ctx.cancel_token(), &ctx.display).await {
                    Ok(()) => Next::Retry,
                    Err(_) => Next::Done,
                }
            }
            ErrorClass::QuotaExceeded => {
                state.retry_count += 1;
                if state.retry_count >= config.max_retries {
                    self.fail(url, err);
                    return Next::Done;
                }
                match ctx.credentials.rotate(block, &ctx.cancel_token()).await {
                    Ok((blocked, next)) => ctx.display.info(format!(
                        "[credentials] quota: {} blocked for {} min, switched to {}",
                        blocked.as_deref().unwrap_or("-"),
                        config.key_block_minutes,
                        next
                    )),
                    Err(e) => ctx.display.warn(format!("[credentials] rotation failed: {}", e)),
                }
                let wait = Duration::from_secs(config.quota_wait_step_secs * u64::from(state.retry_count));
                info!(
                    "[retry] {}/{} in {}s",
                    state.retry_count,
                    config.max_retries,
                    wait.as_secs()
                );
                match self.sleep(wait).await {
                    Ok(()) => Next::Retry,
                    Err(_) => Next::Done,
                }
            }
            ErrorClass::PermissionDenied => {
                state.retry_count += 1;
                if state.retry_count >= config.max_retries {
                    self.fail(url, err);
                    return Next::Done;
                }
                match ctx.credentials.rotate(block, &ctx.cancel_token()).await {
                    Ok((blocked, next)) => {
                        ctx.display.info(format!(
                            "[credentials] permission: {} blocked for {} min, switched to {}",
                            blocked.as_deref().unwrap_or("-"),
                            config.key_block_minutes,
                            next
                        ));
                        Next::Retry
                    }
                    Err(CredentialError::Cancelled) => Next::Done,
                    Err(e) => {
                        ctx.display.error(format!("[credentials] no usable key left: {}", e));
                        self.fail(url, err);
                        Next::Done
                    }
                }
            }
            ErrorClass::ServerError => {
                state.retry_count += 1;
                if state.retry_count >= config.max_retries {
                    self.fail(url, err);
                    return Next::Done;
                }
                let wait = Duration::from_secs(config.server_error_wait_secs);
                info!("[retry] server error, {}/{} in {}s", state.retry_count, config.max_retries, wait.as_secs());
                match self.sleep(wait).await {
                    Ok(()) => Next::Retry,
                    Err(_) => Next::Done,
                }
            }
            ErrorClass::Unclassified => {
                self.fail(url, err);
                Next::Done
            }
        }
    }

    fn finish(&self, summary: BatchSummary) -> BatchSummary {
        let ctx = &self.ctx;
        ctx.display.info(format!(
            "[batch] finished: {} succeeded, {} failed, {} skipped",
            summary.success, summary.failed, summary.skipped
        ));

        if ctx.pending_count() == 0 {
            ctx.clear_session();
        } else {
            ctx.save_session();
        }
        ctx.display.send(DisplayCommand::RunFinished(summary));
        summary
    }
}

// Batch controller
// Starts the worker thread, guards against concurrent runs and handles stop requests

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};

use super::context::BatchContext;
use super::events::BatchSummary;
use super::pipeline::Pipeline;
use super::runner::BatchRunner;
use crate::errors::{AppError, Result};

const JOIN_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct LockState {
    busy: Mutex<bool>,
    released: Condvar,
}

/// Блокировка запуска: одновременно активен только один запуск
#[derive(Clone, Default)]
pub struct RunLock {
    state: Arc<LockState>,
}

/// Освобождает блокировку при drop, в том числе при панике рабочего потока
pub struct RunGuard {
    state: Arc<LockState>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.state.busy.lock() = false;
        self.state.released.notify_all();
    }
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        *self.state.busy.lock()
    }

    /// Первая попытка без ожидания, затем до `attempts - 1` ожиданий по `timeout`
    pub fn acquire(&self, timeout: Duration, attempts: u32) -> Result<RunGuard> {
        let mut busy = self.state.busy.lock();
        for attempt in 0..attempts.max(1) {
            if !*busy {
                *busy = true;
                return Ok(RunGuard {
                    state: self.state.clone(),
                });
            }
            if attempt + 1 == attempts.max(1) {
                break;
            }
            warn!(
                "[batch] another run is active, waiting up to {}s (attempt {}/{})",
                timeout.as_secs(),
                attempt + 2,
                attempts
            );
            let deadline = Instant::now() + timeout;
            while *busy {
                if self.state.released.wait_until(&mut busy, deadline).timed_out() {
                    break;
                }
            }
        }
        Err(AppError::AlreadyRunning(format!(
            "run lock not acquired after {} attempt(s)",
            attempts
        )))
    }
}

/// Управляет запуском обработки очереди в отдельном потоке
pub struct BatchController {
    ctx: Arc<BatchContext>,
    pipeline: Arc<Pipeline>,
    lock: RunLock,
    worker: Mutex<Option<JoinHandle<BatchSummary>>>,
}

impl BatchController {
    pub fn new(ctx: Arc<BatchContext>, pipeline: Arc<Pipeline>) -> Self {
        Self::with_lock(ctx, pipeline, RunLock::new())
    }

    /// Контроллер с общей блокировкой запуска
    pub fn with_lock(ctx: Arc<BatchContext>, pipeline: Arc<Pipeline>, lock: RunLock) -> Self {
        Self {
            ctx,
            pipeline,
            lock,
            worker: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &Arc<BatchContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Добавляет задание; во время запуска оно будет подхвачено циклом
    pub fn enqueue(&self, url: &str) -> Result<()> {
        self.ctx.enqueue(url)?;
        info!("[queue] added {}", url);
        Ok(())
    }

    /// Проверяет условия запуска и стартует рабочий поток
    pub fn start(&self) -> Result<()> {
        let config = &self.ctx.config;
        if self.ctx.waiting_count() == 0 {
            return Err(AppError::Configuration("no waiting jobs in the queue".to_string()));
        }
        if config.voices.is_empty() {
            return Err(AppError::Configuration("no voice selected".to_string()));
        }
        if !self.ctx.credentials.has_usable() {
            return Err(AppError::Configuration("no usable API key registered".to_string()));
        }
        if self.is_running() {
            return Err(AppError::AlreadyRunning("worker thread is still active".to_string()));
        }

        let guard = self.lock.acquire(
            Duration::from_secs(config.run_lock_timeout_secs),
            config.run_lock_attempts,
        )?;
        self.ctx.renew_token();

        let runner = BatchRunner::new(self.ctx.clone(), self.pipeline.clone());
        let handle = thread::Builder::new()
            .name("batch-worker".to_string())
            .spawn(move || {
                let _guard = guard;
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(runner.run()),
                    Err(e) => {
                        error!("[batch] failed to build worker runtime: {}", e);
                        BatchSummary::default()
                    }
                }
            })?;

        *self.worker.lock() = Some(handle);
        info!("[batch] worker started");
        Ok(())
    }

    /// Запрашивает остановку. Поток очистки ждет рабочий поток не дольше
    /// `stop_join_timeout_secs` и сохраняет сессию.
    pub fn stop(&self) -> Result<JoinHandle<Option<BatchSummary>>> {
        self.ctx.cancel();
        info!("[batch] stop requested");

        let worker = self.worker.lock().take();
        let ctx = self.ctx.clone();
        let timeout = Duration::from_secs(ctx.config.stop_join_timeout_secs);
        let handle = thread::Builder::new()
            .name("batch-cleanup".to_string())
            .spawn(move || {
                let summary = worker.and_then(|handle| join_with_timeout(handle, timeout));
                ctx.save_session();
                summary
            })?;
        Ok(handle)
    }
}

fn join_with_timeout(handle: JoinHandle<BatchSummary>, timeout: Duration) -> Option<BatchSummary> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("[batch] worker did not stop within {}s", timeout.as_secs());
            return None;
        }
        thread::sleep(JOIN_POLL);
    }
    match handle.join() {
        Ok(summary) => Some(summary),
        Err(_) => {
            error!("[batch] worker thread panicked");
            None
        }
    }
}

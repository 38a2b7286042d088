use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{Clock, CredentialError, CredentialStore, SystemClock};

/// Ожидание освобождения ключа, при котором пул ждет вместо ошибки
const MAX_INLINE_WAIT: Duration = Duration::from_secs(60);
/// Сколько раз пул ждет освобождения ключа за один вызов
const MAX_WAIT_ROUNDS: u32 = 3;
/// Шаг ожидания, после каждого шага проверяется отмена
const WAIT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct Credential {
    name: String,
    secret: String,
    usage_count: u64,
    blocked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PoolState {
    /// В порядке первого появления
    credentials: Vec<Credential>,
    current: Option<String>,
}

enum Selection {
    Picked(String),
    Wait(Duration),
    AllBlocked { minutes: i64 },
    Empty,
}

/// Состояние ключа для отображения
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialStatus {
    pub name: String,
    pub usage_count: u64,
    /// Минут до разблокировки, None если ключ доступен
    pub blocked_minutes_left: Option<i64>,
    pub is_current: bool,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_current { "*" } else { " " };
        match self.blocked_minutes_left {
            Some(minutes) => write!(
                f,
                "{}{}: blocked ({} min left), used {}",
                marker, self.name, minutes, self.usage_count
            ),
            None => write!(f, "{}{}: available, used {}", marker, self.name, self.usage_count),
        }
    }
}

/// Пул ключей API с ротацией
pub struct CredentialPool {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        let pool = Self {
            store,
            clock,
            state: Mutex::new(PoolState::default()),
        };
        if let Err(e) = pool.refresh() {
            warn!("Initial credential load failed: {}", e);
        }
        pool
    }

    /// Перечитывает хранилище: добавляет новые ключи и обновляет измененные,
    /// сохраняя счетчики и блокировки. Возвращает число новых ключей.
    pub fn refresh(&self) -> Result<usize, CredentialError> {
        let fresh = self.store.list()?;
        let mut state = self.state.lock();
        let mut added = Vec::new();

        for (name, secret) in fresh {
            match state.credentials.iter_mut().find(|c| c.name == name) {
                Some(existing) => {
                    if existing.secret != secret {
                        existing.secret = secret;
                        info!("Credential {} value updated", name);
                    }
                }
                None => {
                    added.push(name.clone());
                    state.credentials.push(Credential {
                        name,
                        secret,
                        usage_count: 0,
                        blocked_until: None,
                    });
                }
            }
        }

        if !added.is_empty() {
            info!("Detected {} new credential(s): {}", added.len(), added.join(", "));
        }
        Ok(added.len())
    }

    /// Выбирает наименее использованный доступный ключ и увеличивает его счетчик.
    /// Если все ключи заблокированы и ближайший освободится в течение минуты,
    /// ждет не более трех раз. Ожидание прерывается токеном `cancel`.
    pub async fn get_available(&self, cancel: &CancellationToken) -> Result<String, CredentialError> {
        if let Err(e) = self.refresh() {
            warn!("Credential refresh failed, using cached keys: {}", e);
        }

        let mut waits = 0;
        loop {
            match self.select() {
                Selection::Picked(secret) => return Ok(secret),
                Selection::Empty => return Err(CredentialError::NoCredentials),
                Selection::AllBlocked { minutes } => {
                    return Err(CredentialError::AllBlocked { minutes });
                }
                Selection::Wait(wait) => {
                    if waits >= MAX_WAIT_ROUNDS {
                        let minutes = (wait.as_secs() / 60) as i64;
                        return Err(CredentialError::AllBlocked { minutes });
                    }
                    waits += 1;
                    info!("All credentials blocked, waiting {}s (round {})", wait.as_secs(), waits);
                    self.wait_for_unblock(wait + Duration::from_secs(1), cancel).await?;
                }
            }
        }
    }

    async fn wait_for_unblock(&self, total: Duration, cancel: &CancellationToken) -> Result<(), CredentialError> {
        let mut left = total;
        while !left.is_zero() {
            if cancel.is_cancelled() {
                return Err(CredentialError::Cancelled);
            }
            let step = left.min(WAIT_TICK);
            tokio::select! {
                _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
                _ = self.clock.sleep(step) => {}
            }
            left -= step;
        }
        Ok(())
    }

    fn select(&self) -> Selection {
        let now = self.clock.now();
        let mut state = self.state.lock();

        for credential in state.credentials.iter_mut() {
            if credential.blocked_until.is_some_and(|until| now >= until) {
                credential.blocked_until = None;
                info!("Credential {} unblocked", credential.name);
            }
        }

        if state.credentials.is_empty() {
            return Selection::Empty;
        }

        // min_by_key возвращает первый минимальный элемент, то есть порядок появления
        let picked = state
            .credentials
            .iter_mut()
            .filter(|c| !c.secret.is_empty() && c.blocked_until.is_none())
            .min_by_key(|c| c.usage_count);

        if let Some(credential) = picked {
            credential.usage_count += 1;
            debug!(
                "Selected credential {} (used {} times)",
                credential.name, credential.usage_count
            );
            let name = credential.name.clone();
            let secret = credential.secret.clone();
            state.current = Some(name);
            return Selection::Picked(secret);
        }

        let next_unblock = state
            .credentials
            .iter()
            .filter(|c| !c.secret.is_empty())
            .filter_map(|c| c.blocked_until)
            .min();

        match next_unblock {
            None => Selection::Empty,
            Some(until) => {
                let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
                if wait <= MAX_INLINE_WAIT {
                    Selection::Wait(wait)
                } else {
                    Selection::AllBlocked {
                        minutes: (wait.as_secs() / 60) as i64,
                    }
                }
            }
        }
    }

    /// Секрет текущего ключа; новый ключ выбирается, только если текущего нет
    /// или он заблокирован
    pub async fn current_secret(&self, cancel: &CancellationToken) -> Result<String, CredentialError> {
        {
            let now = self.clock.now();
            let state = self.state.lock();
            if let Some(current) = &state.current {
                if let Some(c) = state.credentials.iter().find(|c| &c.name == current) {
                    let blocked = c.blocked_until.is_some_and(|until| now < until);
                    if !blocked && !c.secret.is_empty() {
                        return Ok(c.secret.clone());
                    }
                }
            }
        }
        self.get_available(cancel).await
    }

    pub fn current_name(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    /// Блокирует ключ на `duration`. Возвращает false, если ключ не найден.
    pub fn block(&self, name: &str, duration: Duration) -> bool {
        let until = self.clock.now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(1));
        let mut state = self.state.lock();
        let Some(credential) = state.credentials.iter_mut().find(|c| c.name == name) else {
            return false;
        };
        credential.blocked_until = Some(until);
        info!("Credential {} blocked for {} min", name, duration.as_secs() / 60);
        if state.current.as_deref() == Some(name) {
            state.current = None;
        }
        true
    }

    /// Блокирует текущий ключ и сбрасывает выбор. Возвращает имя заблокированного ключа.
    pub fn block_current(&self, duration: Duration) -> Option<String> {
        let current = self.current_name()?;
        self.block(&current, duration);
        Some(current)
    }

    /// Блокирует текущий ключ и выбирает следующий: (заблокированный, новый)
    pub async fn rotate(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(Option<String>, String), CredentialError> {
        let blocked = self.block_current(duration);
        self.get_available(cancel).await?;
        let next = self.current_name().unwrap_or_default();
        Ok((blocked, next))
    }

    /// Есть ли хотя бы один ключ с непустым значением
    pub fn has_usable(&self) -> bool {
        if let Err(e) = self.refresh() {
            warn!("Credential refresh failed: {}", e);
        }
        self.state.lock().credentials.iter().any(|c| !c.secret.is_empty())
    }

    pub fn status(&self) -> Vec<CredentialStatus> {
        let now = self.clock.now();
        let state = self.state.lock();
        state
            .credentials
            .iter()
            .map(|c| CredentialStatus {
                name: c.name.clone(),
                usage_count: c.usage_count,
                blocked_minutes_left: c
                    .blocked_until
                    .filter(|until| now < *until)
                    .map(|until| {
                        let secs = (until - now).num_seconds();
                        (secs + 59) / 60
                    }),
                is_current: state.current.as_deref() == Some(c.name.as_str()),
            })
            .collect()
    }
}

//! Прерываемые ожидания
//!
//! Любая пауза делится на тики, каждый тик проверяет токен отмены.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::events::DisplaySender;
use crate::errors::{AppError, Result};

/// Ждет `total`, проверяя отмену каждый тик
pub async fn sleep_ticks(total: Duration, tick: Duration, cancel: &CancellationToken) -> Result<()> {
    let tick = tick.max(Duration::from_millis(1));
    let mut left = total;
    while !left.is_zero() {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let step = left.min(tick);
        tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(step) => {}
        }
        left -= step;
    }
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(())
}

/// Ожидание при перегрузке сервера с сообщением о каждой оставшейся минуте
pub async fn overload_wait(
    total: Duration,
    tick: Duration,
    cancel: &CancellationToken,
    display: &DisplaySender,
) -> Result<()> {
    let minute = Duration::from_secs(60);
    let mut left = total;
    while !left.is_zero() {
        let minutes_left = left.as_secs().div_ceil(60);
        display.info(format!("[retry] server overloaded, retrying in {} min", minutes_left));
        let step = left.min(minute);
        sleep_ticks(step, tick, cancel).await?;
        left -= step;
    }
    Ok(())
}

//! # Credential pool
//!
//! Пул именованных API-ключей со счетчиками использования и временными
//! блокировками. Выбирается наименее использованный незаблокированный ключ.

pub mod clock;
pub mod pool;
pub mod store;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pool::{CredentialPool, CredentialStatus};
pub use store::{CredentialStore, JsonFileStore, MemoryStore};

/// Ошибки пула ключей
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No API keys registered")]
    NoCredentials,

    #[error("All API keys blocked, next one frees in {minutes} min")]
    AllBlocked { minutes: i64 },

    #[error("Credential store error: {0}")]
    Store(String),

    #[error("Waiting for an API key was cancelled")]
    Cancelled,
}

// Error handling module
// Contains the crate error type and HTTP status mapping

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::fitter::FitError;

// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("API quota exceeded (429): {0}")]
    QuotaExceeded(String),

    #[error("API permission denied (403): {0}")]
    PermissionDenied(String),

    #[error("Service overloaded (503): {0}")]
    ServerOverloaded(String),

    #[error("Internal server error (500): {0}")]
    ServerError(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Источник не проходит предварительную проверку, текст - короткое сообщение для списка
    #[error("{0}")]
    ValidationSkip(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio processing error: {0}")]
    Audio(String),

    #[error(transparent)]
    Credential(CredentialError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("Synchronization error: {0}")]
    Sync(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Batch run already active: {0}")]
    AlreadyRunning(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    /// Maps a non-success HTTP status and response body onto the typed variants
    /// the retry classifier understands.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => AppError::QuotaExceeded(body),
            401 | 403 => AppError::PermissionDenied(body),
            503 => AppError::ServerOverloaded(body),
            500..=599 => AppError::ServerError(format!("HTTP {}: {}", status, body)),
            404 => AppError::Other(format!("HTTP 404 not found: {}", body)),
            400 => AppError::Other(format!("HTTP 400 bad request: {}", body)),
            _ => AppError::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}

// Реализация трейтов From для различных типов ошибок
impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Other(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Cancelled => AppError::Cancelled,
            other => AppError::Credential(other),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

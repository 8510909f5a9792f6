use crate::middleware::error_handling;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_handling::into_response(self).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("user does not exist")]
    IdentityNotFound,

    #[error("cannot open a chat session with yourself")]
    SelfSession,

    #[error("message content cannot be empty")]
    EmptyMessage,

    #[error("message content exceeds the limit of {limit}")]
    PayloadTooLarge { limit: usize },

    #[error("custom-encrypted content must be valid base64")]
    InvalidEncoding,

    #[error("scheduled destroy time must be in the future")]
    InvalidScheduleTime,

    #[error("message already destroyed")]
    AlreadyDestroyed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("encryption error: {0}")]
    Encryption(String),
}

impl AppError {
    /// Returns whether this error is retryable (e.g., database connection timeout)
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Database(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            _ => false,
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Unauthorized => 401,
            AppError::NotFound | AppError::IdentityNotFound => 404,
            AppError::SelfSession
            | AppError::EmptyMessage
            | AppError::InvalidEncoding
            | AppError::InvalidScheduleTime => 400,
            AppError::PayloadTooLarge { .. } => 413,
            AppError::AlreadyDestroyed => 410,
            AppError::DecryptionFailed => 500,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Encryption(_) => 500,
        }
    }
}

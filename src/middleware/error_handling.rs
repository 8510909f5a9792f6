use crate::error::AppError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// JSON error body shared by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
    pub code: &'static str,
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = match err {
        AppError::Unauthorized => "UNAUTHORIZED",
        AppError::NotFound => "NOT_FOUND",
        AppError::IdentityNotFound => "IDENTITY_NOT_FOUND",
        AppError::SelfSession => "SELF_SESSION_REJECTED",
        AppError::EmptyMessage => "EMPTY_MESSAGE",
        AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
        AppError::InvalidEncoding => "INVALID_ENCODING",
        AppError::InvalidScheduleTime => "INVALID_SCHEDULE_TIME",
        AppError::AlreadyDestroyed => "ALREADY_DESTROYED",
        AppError::DecryptionFailed => "DECRYPTION_FAILED",
        AppError::Config(_) | AppError::StartServer(_) => "INTERNAL_SERVER_ERROR",
        AppError::Database(_) => "DATABASE_ERROR",
        AppError::Encryption(_) => "ENCRYPTION_ERROR",
    };

    // Persistence and crypto internals stay out of client-facing bodies.
    let message = if status.is_server_error() {
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    let title = match status {
        StatusCode::BAD_REQUEST => "Bad Request",
        StatusCode::UNAUTHORIZED => "Unauthorized",
        StatusCode::NOT_FOUND => "Not Found",
        StatusCode::GONE => "Gone",
        StatusCode::PAYLOAD_TOO_LARGE => "Payload Too Large",
        StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
        _ => "Error",
    };

    let response = ErrorResponse {
        error: title.to_string(),
        message,
        status: status.as_u16(),
        code,
    };

    (status, response)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    if err.status_code() >= 500 {
        tracing::error!(error = %err, "request failed");
    }
    let (status, response) = map_error(&err);
    (status, Json(response))
}

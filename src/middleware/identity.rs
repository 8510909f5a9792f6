use crate::error::AppError;
use axum::http::HeaderMap;

/// Header carrying the authenticated identity, set by the upstream
/// authenticating proxy. Authentication itself is outside this service;
/// requests reaching it are already verified.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// The caller's authenticated identity, as inserted into request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

pub fn identity_from_headers(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Middleware to extract the authenticated identity and add it to extensions
pub async fn identity_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let user_id = identity_from_headers(req.headers()).ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}

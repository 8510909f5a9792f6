use axum::{extract::State, Extension, Json};
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::identity::AuthenticatedUser;
use crate::models::session::SessionOverview;
use crate::services::session_service::SessionService;
use crate::services::unread_service::UnreadService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UnreadSummaryResponse {
    pub total_unread: i64,
    pub sessions: Vec<SessionOverview>,
}

/// Aggregate unread summary: global unread count plus the most-recently
/// active sessions with per-session counts and previews.
pub async fn unread_summary(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
) -> Result<Json<UnreadSummaryResponse>, AppError> {
    let total_unread = UnreadService::unread_count(&state.db, caller).await?;
    let sessions = SessionService::sessions_overview(&state.db, &state.codec, caller).await?;

    Ok(Json(UnreadSummaryResponse {
        total_unread,
        sessions,
    }))
}

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::identity::AuthenticatedUser;
use crate::models::message::{MessageScheme, MessageView};
use crate::services::message_service::{MessageService, NewMessage};
use crate::services::session_service::SessionService;
use crate::services::unread_service::UnreadService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    /// Cursor: only messages with a strictly greater id are returned.
    pub last_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FetchMessagesResponse {
    pub messages: Vec<MessageView>,
    pub total_unread: i64,
    pub session_id: Option<Uuid>,
}

/// Incremental fetch of the conversation with `user_id`, used for initial
/// load and for recovery after missed real-time events. Fetched messages
/// addressed to the caller are marked read as a side effect.
pub async fn fetch_messages(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Query(params): Query<FetchParams>,
) -> Result<Json<FetchMessagesResponse>, AppError> {
    SessionService::resolve_user(&state.db, user_id).await?;

    let session = SessionService::find(&state.db, caller, user_id).await?;
    let messages = match &session {
        Some(session) => {
            MessageService::fetch_since(
                &state.db,
                &state.codec,
                &state.registry,
                session,
                caller,
                params.last_id,
                state.config.fetch_batch_limit,
            )
            .await?
        }
        None => Vec::new(),
    };

    let total_unread = UnreadService::unread_count(&state.db, caller).await?;

    Ok(Json(FetchMessagesResponse {
        messages,
        total_unread,
        session_id: session.map(|s| s.id),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "default_scheme")]
    pub encryption_type: MessageScheme,
    #[serde(default)]
    pub is_burn_after_reading: bool,
    #[serde(default)]
    pub burn_at: Option<DateTime<Utc>>,
}

fn default_scheme() -> MessageScheme {
    MessageScheme::System
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Non-realtime send fallback; validation matches the websocket path.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let request = NewMessage {
        scheme: body.encryption_type,
        content: body.content,
        is_burn_after_reading: body.is_burn_after_reading,
        burn_at: body.burn_at,
    };

    let view = MessageService::send(
        &state.db,
        &state.codec,
        &state.registry,
        &state.config,
        caller,
        user_id,
        request,
    )
    .await?;

    Ok(Json(SendMessageResponse {
        message_id: view.id,
        created_at: view.created_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated_count: i64,
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    let updated_count =
        UnreadService::mark_all_read(&state.db, &state.registry, caller).await?;
    Ok(Json(MarkAllReadResponse { updated_count }))
}

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use crate::error::AppError;
use crate::middleware::identity::identity_from_headers;
use crate::models::session::ChatSession;
use crate::services::message_service::{MessageService, NewMessage};
use crate::services::session_service::SessionService;
use crate::state::AppState;
use crate::websocket::message_types::{WsInboundFrame, WsOutboundFrame};

/// Upgrade endpoint for a private chat connection to `user_id`. The caller's
/// own identity comes from the authenticating proxy; an unauthenticated
/// upgrade is refused before the handshake.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(other_user_id): Path<i64>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = identity_from_headers(&headers) else {
        tracing::warn!("websocket rejected: no authenticated identity");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, other_user_id, socket))
        .into_response()
}

/// Connection lifecycle: resolve both identities and the canonical session,
/// join its delivery group, multiplex inbound frames against group events,
/// and always leave the group on the way out.
async fn handle_socket(state: AppState, user_id: i64, other_user_id: i64, mut socket: WebSocket) {
    let session = match resolve_session(&state, user_id, other_user_id).await {
        Ok(session) => session,
        Err(e) => {
            // Refused connections close without an application frame.
            tracing::warn!(user_id, other_user_id, error = %e, "websocket join refused");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let (conn_id, mut events) = state.registry.join(session.id).await;
    tracing::info!(user_id, session_id = %session.id, "joined session group");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                match maybe_event {
                    Some(event) => {
                        let frame = WsOutboundFrame::from_event(event);
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &session, user_id, other_user_id, &text, &mut sink)
                            .await;
                    }
                    // Control-level pings are answered by the transport.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    // Unconditional group-discard: runs for clean closes, transport errors
    // and send failures alike.
    state.registry.leave(session.id, conn_id).await;
    tracing::info!(user_id, session_id = %session.id, "left session group");
}

async fn resolve_session(
    state: &AppState,
    user_id: i64,
    other_user_id: i64,
) -> Result<ChatSession, AppError> {
    SessionService::resolve_user(&state.db, other_user_id).await?;
    SessionService::get_or_create(&state.db, user_id, other_user_id).await
}

/// One inbound application frame. Keep-alives never touch the codec; send
/// requests go through the full validate/persist/publish path. Malformed
/// frames are dropped, processing failures answered with an error frame -
/// the connection survives both.
async fn handle_frame(
    state: &AppState,
    session: &ChatSession,
    user_id: i64,
    other_user_id: i64,
    text: &str,
    sink: &mut SplitSink<WebSocket, Message>,
) {
    let frame = match serde_json::from_str::<WsInboundFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "dropping malformed frame");
            return;
        }
    };

    match frame {
        WsInboundFrame::Ping => {
            let _ = send_frame(sink, &WsOutboundFrame::Pong).await;
        }
        WsInboundFrame::Message {
            message,
            encryption_type,
            is_burn_after_reading,
            burn_at,
        } => {
            let request = NewMessage {
                scheme: encryption_type,
                content: message,
                is_burn_after_reading,
                burn_at,
            };
            match MessageService::send(
                &state.db,
                &state.codec,
                &state.registry,
                &state.config,
                user_id,
                other_user_id,
                request,
            )
            .await
            {
                // Delivery to this connection happens via the group
                // broadcast (the sender gets its own echo).
                Ok(view) => {
                    tracing::debug!(message_id = view.id, session_id = %session.id, "message sent");
                }
                Err(e) => {
                    let message = client_error_message(&e);
                    tracing::warn!(user_id, error = %e, "inbound message rejected");
                    let _ = send_frame(sink, &WsOutboundFrame::Error { message }).await;
                }
            }
        }
    }
}

/// Client input errors carry their own description; internal failures are
/// reported generically so the connection remains useful without leaking
/// persistence details.
fn client_error_message(e: &AppError) -> String {
    if e.status_code() >= 500 {
        "message processing failed".to_string()
    } else {
        e.to_string()
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &WsOutboundFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("outbound frames always serialize");
    sink.send(Message::Text(text)).await
}

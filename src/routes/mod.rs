use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::middleware::{identity, logging};
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub mod messages;
pub mod sessions;

use messages::{fetch_messages, mark_all_read, send_message};
use sessions::unread_summary;

pub fn build_router(state: AppState) -> Router {
    // The polling/query surface requires an authenticated identity; the
    // websocket upgrade checks it itself so a refused connection closes
    // without a body.
    let api = Router::new()
        .route(
            "/users/:user_id/messages",
            get(fetch_messages).post(send_message),
        )
        .route("/messages/unread", get(unread_summary))
        .route("/messages/read-all", post(mark_all_read))
        .layer(axum_middleware::from_fn(identity::identity_middleware));

    let router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ws/private/:user_id", get(ws_handler))
        .nest("/api/v1", api);

    logging::add_tracing(router).with_state(state)
}

use crate::{config::Config, services::encryption::MessageCodec, websocket::ConnectionRegistry};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub codec: Arc<MessageCodec>,
    pub config: Arc<Config>,
}

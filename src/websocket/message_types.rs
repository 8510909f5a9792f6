use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::message::{MessageScheme, MessageView};

/// Lifecycle event fanned out on a session's delivery group.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    NewMessage(MessageView),
    StateChanged {
        message_id: i64,
        is_read: bool,
        destroyed_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundFrame {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "message")]
    Message {
        message: String,
        #[serde(default = "default_scheme")]
        encryption_type: MessageScheme,
        #[serde(default)]
        is_burn_after_reading: bool,
        #[serde(default)]
        burn_at: Option<DateTime<Utc>>,
    },
}

fn default_scheme() -> MessageScheme {
    MessageScheme::System
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsOutboundFrame {
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "message")]
    Message {
        id: i64,
        sender_id: i64,
        sender_username: String,
        message: Option<String>,
        encryption_type: MessageScheme,
        is_burn_after_reading: bool,
        burn_at: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
    },
    #[serde(rename = "state")]
    State {
        message_id: i64,
        is_read: bool,
        destroyed_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

impl WsOutboundFrame {
    pub fn from_event(event: ChatEvent) -> Self {
        match event {
            ChatEvent::NewMessage(view) => WsOutboundFrame::Message {
                id: view.id,
                sender_id: view.sender_id,
                sender_username: view.sender_username,
                message: view.content,
                encryption_type: view.encryption_type,
                is_burn_after_reading: view.is_burn_after_reading,
                burn_at: view.burn_at,
                created_at: view.created_at,
            },
            ChatEvent::StateChanged {
                message_id,
                is_read,
                destroyed_at,
            } => WsOutboundFrame::State {
                message_id,
                is_read,
                destroyed_at,
            },
        }
    }
}

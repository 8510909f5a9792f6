use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encryption discipline for a message. `System` payloads are encrypted and
/// decrypted with the server-managed key; `Custom` payloads are
/// caller-supplied ciphertext the core stores verbatim and never interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageScheme {
    System,
    Custom,
}

impl MessageScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageScheme::System => "system",
            MessageScheme::Custom => "custom",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "custom" => MessageScheme::Custom,
            _ => MessageScheme::System,
        }
    }
}

/// Validated message body at the codec boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Plaintext to be encrypted under the process key.
    System(String),
    /// Decoded caller-supplied ciphertext, stored as-is.
    Custom(Vec<u8>),
}

/// A message row as persisted. `ciphertext`/`nonce` are NULL exactly when
/// the message has been destroyed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: Uuid,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub encryption_type: String,
    pub ciphertext: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub is_burn_after_reading: bool,
    pub burn_at: Option<DateTime<Utc>>,
    pub destroyed_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn scheme(&self) -> MessageScheme {
        MessageScheme::from_db(&self.encryption_type)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }
}

/// Wire projection of a message. `content` is the decrypted plaintext for
/// the system scheme, base64 ciphertext for the custom scheme, and null
/// once destroyed or undecryptable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub session_id: Uuid,
    pub sender_id: i64,
    pub sender_username: String,
    pub content: Option<String>,
    pub encryption_type: MessageScheme,
    pub is_burn_after_reading: bool,
    pub burn_at: Option<DateTime<Utc>>,
    pub destroyed_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

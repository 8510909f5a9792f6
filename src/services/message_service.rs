use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};

use crate::config::Config;
use crate::error::AppError;
use crate::models::message::{MessageBody, MessageScheme, MessageView, StoredMessage};
use crate::models::session::ChatSession;
use crate::models::user::User;
use crate::services::encryption::MessageCodec;
use crate::services::session_service::SessionService;
use crate::websocket::message_types::ChatEvent;
use crate::websocket::ConnectionRegistry;

const MESSAGE_COLUMNS: &str = "id, session_id, sender_id, receiver_id, encryption_type, \
     ciphertext, nonce, is_burn_after_reading, burn_at, destroyed_at, is_read, read_at, created_at";

/// A send request after frame/body parsing, before validation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub scheme: MessageScheme,
    /// Plaintext for the system scheme, base64 ciphertext for custom.
    pub content: String,
    pub is_burn_after_reading: bool,
    pub burn_at: Option<DateTime<Utc>>,
}

/// Outcome of a first read transition, for updating in-memory copies.
#[derive(Debug, Clone, Copy)]
pub struct ReadOutcome {
    pub read_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

pub struct MessageService;

impl MessageService {
    /// Validates and decodes a payload into the codec-boundary union.
    pub fn validate_body(
        config: &Config,
        scheme: MessageScheme,
        content: &str,
    ) -> Result<MessageBody, AppError> {
        match scheme {
            MessageScheme::System => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    return Err(AppError::EmptyMessage);
                }
                if trimmed.chars().count() > config.max_plaintext_chars {
                    return Err(AppError::PayloadTooLarge {
                        limit: config.max_plaintext_chars,
                    });
                }
                Ok(MessageBody::System(trimmed.to_string()))
            }
            MessageScheme::Custom => {
                let bytes = STANDARD
                    .decode(content.trim())
                    .map_err(|_| AppError::InvalidEncoding)?;
                if bytes.is_empty() {
                    return Err(AppError::EmptyMessage);
                }
                if bytes.len() > config.max_ciphertext_bytes {
                    return Err(AppError::PayloadTooLarge {
                        limit: config.max_ciphertext_bytes,
                    });
                }
                Ok(MessageBody::Custom(bytes))
            }
        }
    }

    /// Full send path: validate, resolve the canonical session, encrypt,
    /// persist, then fan out. The insert completes before the publish so no
    /// group member can observe an event for an unpersisted message.
    pub async fn send(
        db: &Pool<Postgres>,
        codec: &MessageCodec,
        registry: &ConnectionRegistry,
        config: &Config,
        sender_id: i64,
        receiver_id: i64,
        request: NewMessage,
    ) -> Result<MessageView, AppError> {
        let sender = SessionService::resolve_user(db, sender_id).await?;
        SessionService::resolve_user(db, receiver_id).await?;

        let body = Self::validate_body(config, request.scheme, &request.content)?;
        if let Some(burn_at) = request.burn_at {
            if burn_at <= Utc::now() {
                return Err(AppError::InvalidScheduleTime);
            }
        }

        let session = SessionService::get_or_create(db, sender_id, receiver_id).await?;

        let (ciphertext, nonce) = match &body {
            MessageBody::System(plaintext) => {
                let (ciphertext, nonce) = codec.encrypt(session.id, plaintext)?;
                (ciphertext, Some(nonce))
            }
            MessageBody::Custom(bytes) => (bytes.clone(), None),
        };

        let row = sqlx::query(
            "INSERT INTO private_messages \
             (session_id, sender_id, receiver_id, encryption_type, ciphertext, nonce, \
              is_burn_after_reading, burn_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, created_at",
        )
        .bind(session.id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(request.scheme.as_str())
        .bind(&ciphertext)
        .bind(&nonce)
        .bind(request.is_burn_after_reading)
        .bind(request.burn_at)
        .fetch_one(db)
        .await?;

        SessionService::touch(db, session.id).await?;

        let view = MessageView {
            id: row.get("id"),
            session_id: session.id,
            sender_id,
            sender_username: sender.username,
            content: Some(match body {
                MessageBody::System(plaintext) => plaintext,
                MessageBody::Custom(bytes) => STANDARD.encode(bytes),
            }),
            encryption_type: request.scheme,
            is_burn_after_reading: request.is_burn_after_reading,
            burn_at: request.burn_at,
            destroyed_at: None,
            is_read: false,
            read_at: None,
            created_at: row.get("created_at"),
        };

        registry
            .publish(session.id, ChatEvent::NewMessage(view.clone()))
            .await;

        Ok(view)
    }

    /// Incremental fetch after `last_id`, ascending. Fetched messages
    /// addressed to the caller are marked read as a side effect, which may
    /// trigger burn-after-reading destruction; the returned projections
    /// reflect the post-read state. Messages the caller sent are never
    /// touched.
    pub async fn fetch_since(
        db: &Pool<Postgres>,
        codec: &MessageCodec,
        registry: &ConnectionRegistry,
        session: &ChatSession,
        caller_id: i64,
        last_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageView>, AppError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM private_messages \
             WHERE session_id = $1 AND id > $2 \
             ORDER BY id ASC LIMIT $3"
        );
        let mut messages = sqlx::query_as::<_, StoredMessage>(&sql)
            .bind(session.id)
            .bind(last_id.unwrap_or(0))
            .bind(limit)
            .fetch_all(db)
            .await?;

        for message in &mut messages {
            if message.receiver_id == caller_id && !message.is_read {
                if let Some(outcome) = Self::mark_read(db, registry, message.id).await? {
                    message.is_read = true;
                    message.read_at = Some(outcome.read_at);
                    if let Some(destroyed_at) = outcome.destroyed_at {
                        message.destroyed_at = Some(destroyed_at);
                        message.ciphertext = None;
                        message.nonce = None;
                    }
                }
            }
        }

        let usernames = Self::participant_usernames(db, session).await?;
        let views = messages
            .into_iter()
            .map(|m| Self::project(codec, &usernames, m))
            .collect();
        Ok(views)
    }

    /// First read transition for a message. Idempotent: a second call (or a
    /// concurrent one) matches no row and returns None. Burn-after-reading
    /// destruction runs inside the first transition only.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        registry: &ConnectionRegistry,
        message_id: i64,
    ) -> Result<Option<ReadOutcome>, AppError> {
        let row = sqlx::query(
            "UPDATE private_messages SET is_read = TRUE, read_at = now() \
             WHERE id = $1 AND is_read = FALSE \
             RETURNING session_id, read_at, is_burn_after_reading",
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session_id: uuid::Uuid = row.get("session_id");
        let read_at: DateTime<Utc> = row.get("read_at");
        let burn: bool = row.get("is_burn_after_reading");

        let destroyed_at = if burn {
            Self::destroy(db, message_id).await?
        } else {
            None
        };

        registry
            .publish(
                session_id,
                ChatEvent::StateChanged {
                    message_id,
                    is_read: true,
                    destroyed_at,
                },
            )
            .await;

        Ok(Some(ReadOutcome {
            read_at,
            destroyed_at,
        }))
    }

    /// Destroy transition: clears the payload and stamps destroyed_at in a
    /// single compare-and-set, so the read trigger and the sweep compose
    /// without a lock. Returns None when the message was already destroyed.
    pub async fn destroy(
        db: &Pool<Postgres>,
        message_id: i64,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let row = sqlx::query(
            "UPDATE private_messages \
             SET ciphertext = NULL, nonce = NULL, destroyed_at = now() \
             WHERE id = $1 AND destroyed_at IS NULL \
             RETURNING destroyed_at",
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| r.get("destroyed_at")))
    }

    pub async fn get(db: &Pool<Postgres>, message_id: i64) -> Result<StoredMessage, AppError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM private_messages WHERE id = $1");
        sqlx::query_as::<_, StoredMessage>(&sql)
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Explicit decrypt of a system-scheme message, for callers that need
    /// the plaintext rather than a projection. Destroyed rows surface
    /// AlreadyDestroyed, never a decryption error.
    pub fn system_content(
        codec: &MessageCodec,
        message: &StoredMessage,
    ) -> Result<String, AppError> {
        if message.scheme() != MessageScheme::System {
            return Err(AppError::DecryptionFailed);
        }
        if message.is_destroyed() {
            return Err(AppError::AlreadyDestroyed);
        }
        match (&message.ciphertext, &message.nonce) {
            (Some(ciphertext), Some(nonce)) => {
                codec.decrypt(message.session_id, ciphertext, nonce)
            }
            _ => Err(AppError::AlreadyDestroyed),
        }
    }

    /// Builds the wire projection for a stored row. Content degrades to
    /// null for destroyed or undecryptable messages instead of failing.
    pub fn project(
        codec: &MessageCodec,
        usernames: &ParticipantUsernames,
        message: StoredMessage,
    ) -> MessageView {
        let content = if message.is_destroyed() {
            None
        } else {
            match message.scheme() {
                MessageScheme::System => match (&message.ciphertext, &message.nonce) {
                    (Some(ciphertext), Some(nonce)) => codec
                        .decrypt(message.session_id, ciphertext, nonce)
                        .map_err(|e| {
                            tracing::warn!(message_id = message.id, error = %e,
                                "stored message no longer decryptable");
                            e
                        })
                        .ok(),
                    _ => None,
                },
                MessageScheme::Custom => message.ciphertext.as_ref().map(|c| STANDARD.encode(c)),
            }
        };

        MessageView {
            id: message.id,
            session_id: message.session_id,
            sender_id: message.sender_id,
            sender_username: usernames.name_of(message.sender_id),
            content,
            encryption_type: message.scheme(),
            is_burn_after_reading: message.is_burn_after_reading,
            burn_at: message.burn_at,
            destroyed_at: message.destroyed_at,
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
        }
    }

    pub async fn participant_usernames(
        db: &Pool<Postgres>,
        session: &ChatSession,
    ) -> Result<ParticipantUsernames, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, created_at FROM users WHERE id = $1 OR id = $2",
        )
        .bind(session.user_low)
        .bind(session.user_high)
        .fetch_all(db)
        .await?;
        Ok(ParticipantUsernames { users })
    }
}

/// Username lookup for a session's two participants.
pub struct ParticipantUsernames {
    users: Vec<User>,
}

impl ParticipantUsernames {
    pub fn name_of(&self, user_id: i64) -> String {
        self.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }
}

use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::message::MessageScheme;
use crate::models::session::{ChatSession, SessionOverview, UserPair};
use crate::models::user::User;
use crate::services::encryption::MessageCodec;

const SESSION_COLUMNS: &str = "id, user_low, user_high, is_active, created_at, updated_at";
const OVERVIEW_LIMIT: i64 = 20;
const PREVIEW_CHARS: usize = 50;

pub const DESTROYED_MARKER: &str = "[message destroyed]";
pub const ENCRYPTED_MARKER: &str = "[encrypted message]";

pub struct SessionService;

impl SessionService {
    pub async fn resolve_user(db: &Pool<Postgres>, user_id: i64) -> Result<User, AppError> {
        sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::IdentityNotFound)
    }

    /// Returns the canonical session for the pair, creating it on first
    /// contact. Safe under concurrent creation from both orders: the insert
    /// is a no-op on conflict with the pair uniqueness constraint and the
    /// winner's row is re-read.
    pub async fn get_or_create(
        db: &Pool<Postgres>,
        a: i64,
        b: i64,
    ) -> Result<ChatSession, AppError> {
        let pair = UserPair::new(a, b)?;
        Self::resolve_user(db, pair.low()).await?;
        Self::resolve_user(db, pair.high()).await?;

        sqlx::query(
            "INSERT INTO chat_sessions (id, user_low, user_high) VALUES ($1, $2, $3) \
             ON CONFLICT (user_low, user_high) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(pair.low())
        .bind(pair.high())
        .execute(db)
        .await?;

        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_low = $1 AND user_high = $2"
        );
        let session = sqlx::query_as::<_, ChatSession>(&sql)
            .bind(pair.low())
            .bind(pair.high())
            .fetch_one(db)
            .await?;

        // A deactivated session is revived on next contact rather than
        // duplicated; the row stays canonical for the pair.
        if !session.is_active {
            sqlx::query("UPDATE chat_sessions SET is_active = TRUE WHERE id = $1")
                .bind(session.id)
                .execute(db)
                .await?;
            return Ok(ChatSession {
                is_active: true,
                ..session
            });
        }

        Ok(session)
    }

    pub async fn find(
        db: &Pool<Postgres>,
        a: i64,
        b: i64,
    ) -> Result<Option<ChatSession>, AppError> {
        let pair = UserPair::new(a, b)?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_low = $1 AND user_high = $2"
        );
        let session = sqlx::query_as::<_, ChatSession>(&sql)
            .bind(pair.low())
            .bind(pair.high())
            .fetch_optional(db)
            .await?;
        Ok(session)
    }

    pub async fn deactivate(db: &Pool<Postgres>, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE chat_sessions SET is_active = FALSE WHERE id = $1")
            .bind(session_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Bump the session's last-activity timestamp (called on every send).
    pub async fn touch(db: &Pool<Postgres>, session_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Most-recently-active sessions for a user, with per-session unread
    /// counts and a preview of the latest message.
    pub async fn sessions_overview(
        db: &Pool<Postgres>,
        codec: &MessageCodec,
        user_id: i64,
    ) -> Result<Vec<SessionOverview>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT s.id,
                   u.id AS peer_id,
                   u.username AS peer_username,
                   (SELECT COUNT(*) FROM private_messages m
                     WHERE m.session_id = s.id AND m.receiver_id = $1 AND m.is_read = FALSE
                   ) AS unread_count,
                   (SELECT MAX(m.created_at) FROM private_messages m
                     WHERE m.session_id = s.id
                   ) AS last_message_at
            FROM chat_sessions s
            JOIN users u
              ON u.id = CASE WHEN s.user_low = $1 THEN s.user_high ELSE s.user_low END
            WHERE (s.user_low = $1 OR s.user_high = $1) AND s.is_active
            ORDER BY s.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(OVERVIEW_LIMIT)
        .fetch_all(db)
        .await?;

        let mut overviews = Vec::with_capacity(rows.len());
        for row in rows {
            let session_id: Uuid = row.get("id");
            let preview = Self::latest_message_preview(db, codec, session_id).await?;
            overviews.push(SessionOverview {
                session_id,
                peer_id: row.get("peer_id"),
                peer_username: row.get("peer_username"),
                unread_count: row.get("unread_count"),
                last_message_at: row.try_get("last_message_at").ok(),
                preview,
            });
        }

        Ok(overviews)
    }

    async fn latest_message_preview(
        db: &Pool<Postgres>,
        codec: &MessageCodec,
        session_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query(
            "SELECT encryption_type, ciphertext, nonce, destroyed_at \
             FROM private_messages WHERE session_id = $1 \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let destroyed: Option<chrono::DateTime<chrono::Utc>> = row.get("destroyed_at");
        if destroyed.is_some() {
            return Ok(Some(DESTROYED_MARKER.to_string()));
        }

        let scheme = MessageScheme::from_db(row.get::<String, _>("encryption_type").as_str());
        let ciphertext: Option<Vec<u8>> = row.get("ciphertext");
        let nonce: Option<Vec<u8>> = row.get("nonce");

        // Only system-scheme content is previewable; custom ciphertext and
        // undecryptable rows degrade to the opaque marker.
        let preview = match (scheme, ciphertext, nonce) {
            (MessageScheme::System, Some(ciphertext), Some(nonce)) => codec
                .decrypt(session_id, &ciphertext, &nonce)
                .map(|text| truncate_chars(&text, PREVIEW_CHARS))
                .unwrap_or_else(|_| ENCRYPTED_MARKER.to_string()),
            _ => ENCRYPTED_MARKER.to_string(),
        };

        Ok(Some(preview))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

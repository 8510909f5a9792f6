use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::message_service::MessageService;
use crate::websocket::message_types::ChatEvent;
use crate::websocket::ConnectionRegistry;

/// Unread bookkeeping is always derived from message rows; there is no
/// separate counter that could drift from the read/destroy transitions.
/// Destruction does not imply read: a destroyed-but-unread message still
/// counts until it is read.
pub struct UnreadService;

impl UnreadService {
    pub async fn unread_count(db: &Pool<Postgres>, user_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM private_messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    pub async fn session_unread_count(
        db: &Pool<Postgres>,
        session_id: Uuid,
        user_id: i64,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM private_messages \
             WHERE session_id = $1 AND receiver_id = $2 AND is_read = FALSE",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Marks every unread message addressed to the user as read in one
    /// statement and returns the affected count. Burn-after-reading rows
    /// are destroyed afterwards through the usual compare-and-set, so a
    /// concurrent sweep pass stays safe.
    pub async fn mark_all_read(
        db: &Pool<Postgres>,
        registry: &ConnectionRegistry,
        user_id: i64,
    ) -> Result<i64, AppError> {
        let rows = sqlx::query(
            "UPDATE private_messages SET is_read = TRUE, read_at = now() \
             WHERE receiver_id = $1 AND is_read = FALSE \
             RETURNING id, session_id, is_burn_after_reading",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let count = rows.len() as i64;
        for row in rows {
            let message_id: i64 = row.get("id");
            let session_id: Uuid = row.get("session_id");
            let burn: bool = row.get("is_burn_after_reading");

            let destroyed_at = if burn {
                MessageService::destroy(db, message_id).await?
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
        }

        Ok(count)
    }
}

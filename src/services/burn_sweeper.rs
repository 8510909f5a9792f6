use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::message_service::MessageService;
use crate::websocket::message_types::ChatEvent;
use crate::websocket::ConnectionRegistry;

/// Upper bound on rows handled per pass; the remainder is picked up by the
/// next cycle.
const SWEEP_BATCH: i64 = 500;

/// Spawns the scheduled-destroy sweeper. Every interval it destroys
/// messages whose burn_at has elapsed, regardless of read state. The
/// destroy itself is the same compare-and-set used by the read trigger, so
/// racing with burn-after-reading reads is safe; whichever side wins, the
/// transition runs once.
pub fn spawn(
    db: Pool<Postgres>,
    registry: ConnectionRegistry,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "starting burn sweeper");
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match run_sweep(&db, &registry).await {
                Ok(0) => {}
                Ok(destroyed) => {
                    tracing::info!(destroyed, "burn sweep destroyed expired messages")
                }
                Err(e) => tracing::error!(error = %e, "burn sweep pass failed"),
            }
        }
    })
}

/// One sweep pass. Per-message failures are logged and left for the next
/// cycle; a bad row never aborts the pass.
pub async fn run_sweep(
    db: &Pool<Postgres>,
    registry: &ConnectionRegistry,
) -> Result<u64, AppError> {
    let rows = sqlx::query(
        "SELECT id, session_id, is_read FROM private_messages \
         WHERE burn_at <= now() AND destroyed_at IS NULL \
         ORDER BY burn_at ASC LIMIT $1",
    )
    .bind(SWEEP_BATCH)
    .fetch_all(db)
    .await?;

    let mut destroyed = 0u64;
    for row in rows {
        let message_id: i64 = row.get("id");
        let session_id: Uuid = row.get("session_id");
        let is_read: bool = row.get("is_read");

        match MessageService::destroy(db, message_id).await {
            Ok(Some(destroyed_at)) => {
                destroyed += 1;
                registry
                    .publish(
                        session_id,
                        ChatEvent::StateChanged {
                            message_id,
                            is_read,
                            destroyed_at: Some(destroyed_at),
                        },
                    )
                    .await;
            }
            // Lost the race against a read-triggered destroy; nothing to do.
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(message_id, error = %e, "failed to destroy expired message");
            }
        }
    }

    Ok(destroyed)
}

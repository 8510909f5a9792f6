use sqlx::{Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_users.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_chat_sessions.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_private_messages.sql");

/// Runs the embedded schema migrations in order. Every statement is
/// IF NOT EXISTS-guarded, so reruns are no-ops and any error is real.
pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    for (i, sql) in [MIG_0001, MIG_0002, MIG_0003].into_iter().enumerate() {
        sqlx::raw_sql(sql).execute(db).await?;
        tracing::info!(migration = i + 1, "migration applied");
    }
    Ok(())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mirror of an externally-owned account. The chat core never creates or
/// mutates these rows; it only resolves ids to display names.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

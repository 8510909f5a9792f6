use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonically ordered user pair. Construction is the only place the
/// ordering and the self-pair rejection live; everything downstream can
/// assume `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPair {
    low: i64,
    high: i64,
}

impl UserPair {
    pub fn new(a: i64, b: i64) -> Result<Self, AppError> {
        if a == b {
            return Err(AppError::SelfSession);
        }
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_low: i64,
    pub user_high: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// The other participant from `user_id`'s point of view.
    pub fn peer_of(&self, user_id: i64) -> i64 {
        if self.user_low == user_id {
            self.user_high
        } else {
            self.user_low
        }
    }

    pub fn involves(&self, user_id: i64) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }
}

/// One entry of the aggregate unread summary: a recently-active session
/// with its unread count and a short preview of the latest message.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOverview {
    pub session_id: Uuid,
    pub peer_id: i64,
    pub peer_username: String,
    pub unread_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub preview: Option<String>,
}

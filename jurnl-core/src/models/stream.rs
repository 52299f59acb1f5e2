use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_FREQUENCY: &str = "weekly";

/// A user's standing subscription to periodic summaries of `topic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stream {
    pub id: i64,
    pub user_id: Uuid,
    pub topic: String,
    pub frequency: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_streams: i64,
    pub recent_updates: i64,
    pub recent_streams: Vec<Stream>,
}

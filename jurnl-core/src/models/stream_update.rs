use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StreamUpdate {
    pub id: i64,
    pub stream_id: i64,
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

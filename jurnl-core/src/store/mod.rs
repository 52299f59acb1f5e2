//! Persistence for chat messages, streams and stream updates.
//!
//! Every per-user read and write takes the caller's `user_id` and filters on
//! it, so a row owned by someone else is indistinguishable from a missing one.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ChatMessage, Stream, StreamUpdate};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// PostgreSQL `undefined_table`.
pub const UNDEFINED_TABLE: &str = "42P01";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Database tables not set up")]
    MissingTable,

    #[error("Query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.code().as_deref() == Some(UNDEFINED_TABLE) {
                return StoreError::MissingTable;
            }
        }
        StoreError::Query(e.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Backend description for `/health`.
    async fn health(&self) -> Result<String, StoreError>;

    async fn create_stream(&self, user_id: Uuid, topic: &str) -> Result<Stream, StoreError>;

    /// Newest first by `created_at`.
    async fn list_streams(&self, user_id: Uuid) -> Result<Vec<Stream>, StoreError>;

    async fn get_stream(&self, user_id: Uuid, stream_id: i64) -> Result<Option<Stream>, StoreError>;

    /// Newest first by `generated_at`.
    async fn list_updates(&self, stream_id: i64) -> Result<Vec<StreamUpdate>, StoreError>;

    /// Returns `false` when no row owned by `user_id` matched.
    async fn delete_stream(&self, user_id: Uuid, stream_id: i64) -> Result<bool, StoreError>;

    async fn count_streams(&self, user_id: Uuid) -> Result<i64, StoreError>;

    /// Updates generated at or after `since` on streams owned by `user_id`.
    async fn count_updates_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    async fn recently_updated_streams(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Stream>, StoreError>;

    /// All streams (any owner) with `last_updated_at` strictly before `cutoff`.
    async fn stale_streams(&self, cutoff: DateTime<Utc>) -> Result<Vec<Stream>, StoreError>;

    /// Insert a stream update and advance the stream's `last_updated_at` to
    /// `at` as one atomic step. The timestamp never moves backwards.
    async fn record_update(
        &self,
        stream_id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<StreamUpdate, StoreError>;

    async fn save_chat_messages(&self, messages: &[ChatMessage]) -> Result<(), StoreError>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{ChatMessage, Stream, StreamUpdate, DEFAULT_FREQUENCY};

const STREAM_COLUMNS: &str = "id, user_id, topic, frequency, created_at, last_updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health(&self) -> Result<String, StoreError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn create_stream(&self, user_id: Uuid, topic: &str) -> Result<Stream, StoreError> {
        let stream = sqlx::query_as::<_, Stream>(&format!(
            "INSERT INTO streams (user_id, topic, frequency) VALUES ($1, $2, $3) RETURNING {STREAM_COLUMNS}"
        ))
        .bind(user_id)
        .bind(topic)
        .bind(DEFAULT_FREQUENCY)
        .fetch_one(&self.pool)
        .await?;
        Ok(stream)
    }

    async fn list_streams(&self, user_id: Uuid) -> Result<Vec<Stream>, StoreError> {
        let streams = sqlx::query_as::<_, Stream>(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(streams)
    }

    async fn get_stream(&self, user_id: Uuid, stream_id: i64) -> Result<Option<Stream>, StoreError> {
        let stream = sqlx::query_as::<_, Stream>(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE id = $1 AND user_id = $2"
        ))
        .bind(stream_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stream)
    }

    async fn list_updates(&self, stream_id: i64) -> Result<Vec<StreamUpdate>, StoreError> {
        let updates = sqlx::query_as::<_, StreamUpdate>(
            "SELECT id, stream_id, content, generated_at FROM stream_updates \
             WHERE stream_id = $1 ORDER BY generated_at DESC, id DESC",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(updates)
    }

    #[instrument(skip_all, fields(user_id = %user_id, stream_id = stream_id))]
    async fn delete_stream(&self, user_id: Uuid, stream_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM streams WHERE id = $1 AND user_id = $2")
            .bind(stream_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_streams(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM streams WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_updates_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM stream_updates u \
             INNER JOIN streams s ON s.id = u.stream_id \
             WHERE s.user_id = $1 AND u.generated_at >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn recently_updated_streams(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Stream>, StoreError> {
        let streams = sqlx::query_as::<_, Stream>(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE user_id = $1 \
             ORDER BY last_updated_at DESC, id DESC LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(streams)
    }

    async fn stale_streams(&self, cutoff: DateTime<Utc>) -> Result<Vec<Stream>, StoreError> {
        let streams = sqlx::query_as::<_, Stream>(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE last_updated_at < $1 \
             ORDER BY last_updated_at ASC, id ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(streams)
    }

    #[instrument(skip(self, content, at), fields(content_len = content.len()))]
    async fn record_update(
        &self,
        stream_id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<StreamUpdate, StoreError> {
        let mut tx = self.pool.begin().await?;

        let update = sqlx::query_as::<_, StreamUpdate>(
            "INSERT INTO stream_updates (stream_id, content, generated_at) VALUES ($1, $2, $3) \
             RETURNING id, stream_id, content, generated_at",
        )
        .bind(stream_id)
        .bind(content)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE streams SET last_updated_at = GREATEST(last_updated_at, $2) WHERE id = $1",
        )
        .bind(stream_id)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(update)
    }

    async fn save_chat_messages(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for message in messages {
            sqlx::query(
                "INSERT INTO chat_messages (id, user_id, role, content, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(message.id)
            .bind(message.user_id)
            .bind(&message.role)
            .bind(&message.content)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

//! In-process store. Backs `database.backend = "memory"` and the test suites.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{ChatMessage, Stream, StreamUpdate, DEFAULT_FREQUENCY};

#[derive(Default)]
struct Tables {
    streams: Vec<Stream>,
    updates: Vec<StreamUpdate>,
    chat_messages: Vec<ChatMessage>,
    next_stream_id: i64,
    next_update_id: i64,
    failure: Option<StoreError>,
    failing_records: HashSet<i64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the tables, returning the injected failure if one is set.
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        let tables = self.lock();
        if let Some(e) = tables.failure.clone() {
            return Err(e);
        }
        Ok(tables)
    }
}

/// Test hooks for seeding rows and injecting failures. Not part of the
/// `Store` surface; enabled for this crate's tests and via `test-util`.
#[cfg(any(test, feature = "test-util"))]
impl MemoryStore {
    /// Make every subsequent call fail with `error` (None clears it).
    pub fn set_failure(&self, error: Option<StoreError>) {
        self.lock().failure = error;
    }

    /// Make `record_update` fail for one stream only.
    pub fn fail_record_update_for(&self, stream_id: i64) {
        self.lock().failing_records.insert(stream_id);
    }

    /// Insert a stream with an explicit `last_updated_at`.
    pub fn insert_stream(&self, user_id: Uuid, topic: &str, last_updated_at: DateTime<Utc>) -> Stream {
        let mut tables = self.lock();
        tables.next_stream_id += 1;
        let stream = Stream {
            id: tables.next_stream_id,
            user_id,
            topic: topic.to_string(),
            frequency: DEFAULT_FREQUENCY.to_string(),
            created_at: last_updated_at,
            last_updated_at,
        };
        tables.streams.push(stream.clone());
        stream
    }

    /// Insert a stream update without touching the stream.
    pub fn insert_update(&self, stream_id: i64, content: &str, generated_at: DateTime<Utc>) -> StreamUpdate {
        let mut tables = self.lock();
        tables.next_update_id += 1;
        let update = StreamUpdate {
            id: tables.next_update_id,
            stream_id,
            content: content.to_string(),
            generated_at,
        };
        tables.updates.push(update.clone());
        update
    }

    /// Look up a stream regardless of owner.
    pub fn stream(&self, stream_id: i64) -> Option<Stream> {
        self.lock().streams.iter().find(|s| s.id == stream_id).cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.lock().streams.len()
    }

    pub fn update_count(&self) -> usize {
        self.lock().updates.len()
    }

    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.lock().chat_messages.clone()
    }
}

fn owned_streams(tables: &Tables, user_id: Uuid) -> Vec<Stream> {
    tables
        .streams
        .iter()
        .filter(|s| s.user_id == user_id)
        .cloned()
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn health(&self) -> Result<String, StoreError> {
        let tables = self.tables()?;
        Ok(format!("memory ({} streams)", tables.streams.len()))
    }

    async fn create_stream(&self, user_id: Uuid, topic: &str) -> Result<Stream, StoreError> {
        let mut tables = self.tables()?;
        tables.next_stream_id += 1;
        let now = Utc::now();
        let stream = Stream {
            id: tables.next_stream_id,
            user_id,
            topic: topic.to_string(),
            frequency: DEFAULT_FREQUENCY.to_string(),
            created_at: now,
            last_updated_at: now,
        };
        tables.streams.push(stream.clone());
        Ok(stream)
    }

    async fn list_streams(&self, user_id: Uuid) -> Result<Vec<Stream>, StoreError> {
        let tables = self.tables()?;
        let mut streams = owned_streams(&tables, user_id);
        streams.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(streams)
    }

    async fn get_stream(&self, user_id: Uuid, stream_id: i64) -> Result<Option<Stream>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .streams
            .iter()
            .find(|s| s.id == stream_id && s.user_id == user_id)
            .cloned())
    }

    async fn list_updates(&self, stream_id: i64) -> Result<Vec<StreamUpdate>, StoreError> {
        let tables = self.tables()?;
        let mut updates: Vec<StreamUpdate> = tables
            .updates
            .iter()
            .filter(|u| u.stream_id == stream_id)
            .cloned()
            .collect();
        updates.sort_by(|a, b| b.generated_at.cmp(&a.generated_at).then(b.id.cmp(&a.id)));
        Ok(updates)
    }

    async fn delete_stream(&self, user_id: Uuid, stream_id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.streams.len();
        tables
            .streams
            .retain(|s| !(s.id == stream_id && s.user_id == user_id));
        let deleted = tables.streams.len() < before;
        if deleted {
            tables.updates.retain(|u| u.stream_id != stream_id);
        }
        Ok(deleted)
    }

    async fn count_streams(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables()?;
        Ok(tables.streams.iter().filter(|s| s.user_id == user_id).count() as i64)
    }

    async fn count_updates_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let tables = self.tables()?;
        let owned: HashSet<i64> = tables
            .streams
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.id)
            .collect();
        Ok(tables
            .updates
            .iter()
            .filter(|u| owned.contains(&u.stream_id) && u.generated_at >= since)
            .count() as i64)
    }

    async fn recently_updated_streams(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Stream>, StoreError> {
        let tables = self.tables()?;
        let mut streams = owned_streams(&tables, user_id);
        streams.sort_by(|a, b| {
            b.last_updated_at
                .cmp(&a.last_updated_at)
                .then(b.id.cmp(&a.id))
        });
        streams.truncate(limit.max(0) as usize);
        Ok(streams)
    }

    async fn stale_streams(&self, cutoff: DateTime<Utc>) -> Result<Vec<Stream>, StoreError> {
        let tables = self.tables()?;
        let mut streams: Vec<Stream> = tables
            .streams
            .iter()
            .filter(|s| s.last_updated_at < cutoff)
            .cloned()
            .collect();
        streams.sort_by(|a, b| a.last_updated_at.cmp(&b.last_updated_at).then(a.id.cmp(&b.id)));
        Ok(streams)
    }

    async fn record_update(
        &self,
        stream_id: i64,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<StreamUpdate, StoreError> {
        let mut tables = self.tables()?;
        if tables.failing_records.contains(&stream_id) {
            return Err(StoreError::Query(format!(
                "injected failure for stream {stream_id}"
            )));
        }

        let tables = &mut *tables;
        let stream = tables
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id)
            .ok_or_else(|| StoreError::Query(format!("stream {stream_id} does not exist")))?;
        if at > stream.last_updated_at {
            stream.last_updated_at = at;
        }

        tables.next_update_id += 1;
        let update = StreamUpdate {
            id: tables.next_update_id,
            stream_id,
            content: content.to_string(),
            generated_at: at,
        };
        tables.updates.push(update.clone());
        Ok(update)
    }

    async fn save_chat_messages(&self, messages: &[ChatMessage]) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables.chat_messages.extend_from_slice(messages);
        Ok(())
    }
}

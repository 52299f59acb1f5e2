//! Stream management actions, scoped to the calling user.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use jurnl_core::models::{DashboardStats, User};
use jurnl_core::store::{Store, StoreError};
use serde_json::{json, Value};

/// Window for the dashboard's "recent updates" count.
pub const RECENT_WINDOW_DAYS: i64 = 7;
/// Number of streams listed on the dashboard.
pub const RECENT_STREAMS_LIMIT: i64 = 3;

pub const MISSING_TABLES_MESSAGE: &str =
    "Database tables not set up. Run the migrations in migrations/ against the configured database.";

/// A failed action: HTTP status, caller-facing message, optional machine code.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

impl ActionError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Log `error` and hide it behind `public_message`, except for the
    /// missing-table condition which carries a remediation hint.
    pub fn store(public_message: &str, error: StoreError) -> Self {
        tracing::error!(error = %error, "{}", public_message);
        match error {
            StoreError::MissingTable => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: MISSING_TABLES_MESSAGE.to_string(),
                code: Some("TABLES_NOT_FOUND"),
            },
            StoreError::Query(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, public_message),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({ "error": self.message });
        if let Some(code) = self.code {
            body["code"] = json!(code);
        }
        body
    }
}

pub type ActionResult = Result<Value, ActionError>;

pub async fn create_stream(store: &dyn Store, user: &User, topic: Option<String>) -> ActionResult {
    let topic = match topic.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => return Err(ActionError::bad_request("Topic is required")),
    };

    let stream = store
        .create_stream(user.id, &topic)
        .await
        .map_err(|e| ActionError::store("Failed to create stream", e))?;

    tracing::info!(stream_id = stream.id, user_id = %user.id, "Stream created");
    Ok(json!({ "success": true, "stream": stream }))
}

pub async fn list_streams(store: &dyn Store, user: &User) -> ActionResult {
    let streams = store
        .list_streams(user.id)
        .await
        .map_err(|e| ActionError::store("Failed to fetch streams", e))?;
    Ok(json!({ "success": true, "streams": streams }))
}

pub async fn stream_with_updates(
    store: &dyn Store,
    user: &User,
    stream_id: Option<i64>,
) -> ActionResult {
    let stream_id = stream_id.ok_or_else(|| ActionError::bad_request("Stream ID is required"))?;

    let stream = store
        .get_stream(user.id, stream_id)
        .await
        .map_err(|e| ActionError::store("Failed to fetch stream", e))?
        .ok_or_else(|| ActionError::not_found("Stream not found"))?;

    let updates = store
        .list_updates(stream.id)
        .await
        .map_err(|e| ActionError::store("Failed to fetch stream updates", e))?;

    Ok(json!({ "success": true, "stream": stream, "updates": updates }))
}

pub async fn delete_stream(store: &dyn Store, user: &User, stream_id: Option<i64>) -> ActionResult {
    let stream_id = stream_id.ok_or_else(|| ActionError::bad_request("Stream ID is required"))?;

    let deleted = store
        .delete_stream(user.id, stream_id)
        .await
        .map_err(|e| ActionError::store("Failed to delete stream", e))?;

    if !deleted {
        return Err(ActionError::not_found("Stream not found"));
    }

    tracing::info!(stream_id, user_id = %user.id, "Stream deleted");
    Ok(json!({ "success": true }))
}

/// Three independent queries, recomputed on every call.
pub async fn dashboard_stats(store: &dyn Store, user: &User) -> ActionResult {
    const FAILED: &str = "Failed to fetch dashboard stats";

    let total_streams = store
        .count_streams(user.id)
        .await
        .map_err(|e| ActionError::store(FAILED, e))?;

    let since = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
    let recent_updates = store
        .count_updates_since(user.id, since)
        .await
        .map_err(|e| ActionError::store(FAILED, e))?;

    let recent_streams = store
        .recently_updated_streams(user.id, RECENT_STREAMS_LIMIT)
        .await
        .map_err(|e| ActionError::store(FAILED, e))?;

    let stats = DashboardStats {
        total_streams,
        recent_updates,
        recent_streams,
    };
    Ok(json!({ "success": true, "stats": stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jurnl_core::store::MemoryStore;
    use uuid::Uuid;

    fn user() -> User {
        User::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_stream_trims_topic_and_sets_owner() {
        let store = MemoryStore::new();
        let caller = user();

        let body = create_stream(&store, &caller, Some("  quantum computing \n".to_string()))
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["stream"]["topic"], "quantum computing");
        assert_eq!(body["stream"]["frequency"], "weekly");
        assert_eq!(body["stream"]["user_id"], caller.id.to_string());
        assert_eq!(store.stream_count(), 1);
    }

    #[tokio::test]
    async fn test_blank_topic_is_rejected_without_write() {
        let store = MemoryStore::new();
        for topic in [None, Some(String::new()), Some("   ".to_string())] {
            let err = create_stream(&store, &user(), topic).await.unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.message, "Topic is required");
        }
        assert_eq!(store.stream_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_stream_id() {
        let store = MemoryStore::new();
        let err = stream_with_updates(&store, &user(), None).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Stream ID is required");

        let err = delete_stream(&store, &user(), None).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_foreign_stream_behaves_as_missing() {
        let store = MemoryStore::new();
        let owner = user();
        let stranger = user();
        let stream = store.insert_stream(owner.id, "biotech", Utc::now());
        store.insert_update(stream.id, "private summary", Utc::now());

        let err = stream_with_updates(&store, &stranger, Some(stream.id))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::not_found("Stream not found"));

        let err = delete_stream(&store, &stranger, Some(stream.id))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert!(store.stream(stream.id).is_some());
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_with_updates_newest_first() {
        let store = MemoryStore::new();
        let owner = user();
        let now = Utc::now();
        let stream = store.insert_stream(owner.id, "space", now);
        store.insert_update(stream.id, "older", now - Duration::days(7));
        store.insert_update(stream.id, "newer", now - Duration::days(1));

        let body = stream_with_updates(&store, &owner, Some(stream.id))
            .await
            .unwrap();
        assert_eq!(body["stream"]["id"], stream.id);
        let updates = body["updates"].as_array().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["content"], "newer");
        assert_eq!(updates[1]["content"], "older");
    }

    #[tokio::test]
    async fn test_dashboard_stats_counts_only_callers_rows() {
        let store = MemoryStore::new();
        let me = user();
        let other = user();
        let now = Utc::now();

        let streams: Vec<_> = (0..4)
            .map(|i| store.insert_stream(me.id, &format!("topic {i}"), now - Duration::days(i)))
            .collect();
        let foreign = store.insert_stream(other.id, "foreign", now);

        store.insert_update(streams[0].id, "a", now - Duration::days(1));
        store.insert_update(streams[1].id, "b", now - Duration::days(6));
        store.insert_update(streams[2].id, "c", now - Duration::days(8));
        store.insert_update(foreign.id, "d", now);

        let body = dashboard_stats(&store, &me).await.unwrap();
        let stats = &body["stats"];
        assert_eq!(stats["total_streams"], 4);
        assert_eq!(stats["recent_updates"], 2);

        let recent = stats["recent_streams"].as_array().unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0]["id"], streams[0].id);
        assert_eq!(recent[2]["id"], streams[2].id);
    }

    #[tokio::test]
    async fn test_missing_table_surfaces_code() {
        let store = MemoryStore::new();
        store.set_failure(Some(StoreError::MissingTable));

        let err = create_stream(&store, &user(), Some("x".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, Some("TABLES_NOT_FOUND"));
        assert_eq!(err.to_json()["code"], "TABLES_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_query_failure_is_generic() {
        let store = MemoryStore::new();
        store.set_failure(Some(StoreError::Query("connection reset".to_string())));

        let err = list_streams(&store, &user()).await.unwrap_err();
        assert_eq!(err.message, "Failed to fetch streams");
        assert!(err.code.is_none());
        assert!(err.to_json().get("code").is_none());
    }
}

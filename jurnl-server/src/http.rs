//! Jurnl HTTP API
//!
//! Each endpoint is a thin axum handler that delegates to an `*_inner`
//! function taking plain values, so request handling can be tested without
//! going through the router.
//!
//! Endpoints:
//! - GET  /health                   store connectivity
//! - GET  /version                  server version info
//! - POST /api/chat                 streamed chat relay (AI data-stream format)
//! - GET  /api/cron/process-streams one batch pass, bearer cron secret
//! - POST /api/mcp/streams          stream management actions

use std::sync::Arc;

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use jurnl_core::actions::{ActionParseError, StreamAction};
use jurnl_core::auth::SessionProvider;
use jurnl_core::llm::{ChatTurn, GenerateRequest, LlmBackend, LlmError, TokenStream};
use jurnl_core::models::User;
use jurnl_core::store::Store;
use jurnl_core::JurnlConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};

use crate::router;
use crate::subsystems::batch;
use crate::subsystems::chat::{self, ChatPersistence, DATA_STREAM_HEADER, DATA_STREAM_VERSION};

/// Shared state for all HTTP handlers
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<dyn SessionProvider>,
    pub chat_llm: Arc<dyn LlmBackend>,
    pub summary_llm: Arc<dyn LlmBackend>,
    pub config: JurnlConfig,
    /// Held for the duration of a batch pass; shared with the scheduler.
    pub batch_lock: Arc<Mutex<()>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/cron/process-streams", get(process_streams_handler))
        .route("/api/mcp/streams", post(streams_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = state.config.http_addr();
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Jurnl HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
}

fn error_body(message: &str) -> Value {
    json!({ "error": message })
}

// ============================================================================
// Session helpers
// ============================================================================

/// Access token from `Authorization: Bearer`, falling back to the session cookie.
pub fn access_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Provider failures count as "no session".
pub async fn resolve_user(
    sessions: &dyn SessionProvider,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Option<User> {
    let token = access_token(headers, cookie_name)?;
    match sessions.resolve(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Session lookup failed");
            None
        }
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(store: &dyn Store) -> (StatusCode, Value) {
    match store.health().await {
        Ok(version) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "postgresql": version,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jurnl",
    })
}

/// Authenticate, parse the action envelope, dispatch.
pub async fn streams_inner(state: &AppState, headers: &HeaderMap, body: &[u8]) -> (StatusCode, Value) {
    let user = match resolve_user(state.sessions.as_ref(), headers, &state.config.auth.cookie_name).await {
        Some(user) => user,
        None => return (StatusCode::UNAUTHORIZED, error_body("Unauthorized")),
    };

    let payload: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, error_body("Invalid request body")),
    };

    let action = match StreamAction::parse(payload) {
        Ok(action) => action,
        Err(ActionParseError::InvalidBody) => {
            return (StatusCode::BAD_REQUEST, error_body("Invalid request body"))
        }
        Err(ActionParseError::InvalidAction) => {
            return (StatusCode::BAD_REQUEST, error_body("Invalid action"))
        }
    };

    router::into_http(router::handle_action(action, &user, state.store.as_ref()).await)
}

/// One batch pass, gated on the configured cron secret.
pub async fn process_streams_inner(state: &AppState, authorization: Option<&str>) -> (StatusCode, Value) {
    let secret = match state.config.cron.secret.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => {
            tracing::error!("Cron secret is not configured");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Server configuration error"),
            );
        }
    };

    if authorization != Some(format!("Bearer {secret}").as_str()) {
        tracing::warn!("Rejected batch trigger with bad credentials");
        return (StatusCode::UNAUTHORIZED, error_body("Unauthorized"));
    }

    let Ok(_pass) = state.batch_lock.try_lock() else {
        tracing::warn!("Batch trigger ignored; a pass is already running");
        return (StatusCode::CONFLICT, error_body("Stream processing already running"));
    };

    let report = match batch::run_batch(state.store.as_ref(), state.summary_llm.as_ref(), &state.config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Failed to fetch stale streams");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("Failed to fetch streams"),
            );
        }
    };

    if report.selected == 0 {
        return (
            StatusCode::OK,
            json!({
                "success": true,
                "message": "No streams need updating",
                "processed": 0,
                "errors": 0,
            }),
        );
    }

    let mut body = json!({
        "success": true,
        "message": "Stream processing completed",
        "processed": report.processed,
        "errors": report.failures.len(),
    });
    if !report.failures.is_empty() {
        body["errorDetails"] = json!(report.failures);
    }
    (StatusCode::OK, body)
}

fn upstream_failure(e: LlmError) -> Response {
    tracing::error!(error = %e, "Chat model request failed");
    let (status, message) = match e {
        LlmError::MissingApiKey => (StatusCode::INTERNAL_SERVER_ERROR, "Chat service is not configured"),
        _ => (StatusCode::BAD_GATEWAY, "Failed to get a response from the AI service"),
    };
    (status, Json(error_body(message))).into_response()
}

/// Relay a conversation to the chat model. Errors before the first token
/// become a JSON error response; after that the stream itself carries them.
pub async fn chat_inner(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let request: ChatRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, Json(error_body("Invalid request body"))).into_response()
        }
    };
    if request.messages.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(error_body("Messages are required"))).into_response();
    }

    let user = resolve_user(state.sessions.as_ref(), headers, &state.config.auth.cookie_name).await;
    let last_user_message = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone());

    tracing::info!(
        turns = request.messages.len(),
        authenticated = user.is_some(),
        model = state.chat_llm.model(),
        "Chat request"
    );

    let system_prompt = &state.config.chat.system_prompt;
    let generate = GenerateRequest {
        system: (!system_prompt.is_empty()).then(|| system_prompt.clone()),
        messages: request.messages,
        max_tokens: state.config.chat.max_tokens,
    };

    let mut tokens = match state.chat_llm.stream(&generate).await {
        Ok(tokens) => tokens,
        Err(e) => return upstream_failure(e),
    };
    let first = match tokens.next().await {
        Some(Err(e)) => return upstream_failure(e),
        first => first,
    };
    let tokens: TokenStream = Box::pin(futures::stream::iter(first).chain(tokens));

    let persistence = match (user, last_user_message) {
        (Some(user), Some(user_message)) => Some(ChatPersistence {
            store: state.store.clone(),
            user_id: user.id,
            user_message,
        }),
        _ => None,
    };

    let mut response = Response::new(Body::from_stream(chat::relay(tokens, persistence)));
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response_headers.insert(DATA_STREAM_HEADER, HeaderValue::from_static(DATA_STREAM_VERSION));
    response
}

// ============================================================================
// Axum handler wrappers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn streams_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) = streams_inner(&state, &headers, &body).await;
    (status, Json(body))
}

pub async fn process_streams_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let (status, body) = process_streams_inner(&state, authorization).await;
    (status, Json(body))
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    chat_inner(&state, &headers, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use jurnl_core::auth::AuthError;
    use jurnl_core::llm::ChatCompletionsClient;
    use jurnl_core::store::{MemoryStore, StoreError};
    use uuid::Uuid;

    struct OneUser(User);

    #[async_trait]
    impl SessionProvider for OneUser {
        async fn resolve(&self, access_token: &str) -> Result<Option<User>, AuthError> {
            Ok((access_token == "valid").then(|| self.0.clone()))
        }
    }

    fn state_with(store: Arc<MemoryStore>, secret: Option<&str>) -> AppState {
        let mut config = JurnlConfig::default();
        config.cron.secret = secret.map(str::to_string);
        config.batch.delay_ms = 0;
        let llm: Arc<dyn LlmBackend> = Arc::new(ChatCompletionsClient::new(&config.summary).unwrap());
        AppState {
            store,
            sessions: Arc::new(OneUser(User::new(Uuid::new_v4()))),
            chat_llm: llm.clone(),
            summary_llm: llm,
            config,
            batch_lock: Arc::new(Mutex::new(())),
        }
    }

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["service"], "jurnl");
    }

    #[test]
    fn test_access_token_prefers_bearer() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "sb-access-token=from-cookie"),
        ]);
        assert_eq!(access_token(&map, "sb-access-token").as_deref(), Some("from-header"));
    }

    #[test]
    fn test_access_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; sb-access-token=abc.def; other=1")]);
        assert_eq!(access_token(&map, "sb-access-token").as_deref(), Some("abc.def"));
        assert_eq!(access_token(&map, "missing"), None);
    }

    #[test]
    fn test_access_token_ignores_empty_values() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer "),
            (header::COOKIE, "sb-access-token="),
        ]);
        assert_eq!(access_token(&map, "sb-access-token"), None);
        assert_eq!(access_token(&HeaderMap::new(), "sb-access-token"), None);
    }

    #[tokio::test]
    async fn test_health_inner_reports_store_state() {
        let store = Arc::new(MemoryStore::new());
        let (status, body) = health_inner(store.as_ref()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        store.set_failure(Some(StoreError::Query("refused".to_string())));
        let (status, body) = health_inner(store.as_ref()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_streams_inner_requires_session_before_parsing() {
        let state = state_with(Arc::new(MemoryStore::new()), None);
        let (status, body) = streams_inner(&state, &HeaderMap::new(), b"not json").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_streams_inner_body_and_action_errors() {
        let state = state_with(Arc::new(MemoryStore::new()), None);
        let auth = headers(&[(header::AUTHORIZATION, "Bearer valid")]);

        for raw in ["not json", "[1,2]", "\"create_stream\""] {
            let (status, body) = streams_inner(&state, &auth, raw.as_bytes()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Invalid request body");
        }

        for raw in ["{}", r#"{"action":"drop_tables"}"#] {
            let (status, body) = streams_inner(&state, &auth, raw.as_bytes()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Invalid action");
        }
    }

    #[tokio::test]
    async fn test_cron_without_secret_is_config_error() {
        let state = state_with(Arc::new(MemoryStore::new()), None);
        let (status, body) = process_streams_inner(&state, Some("Bearer anything")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Server configuration error");
    }

    #[tokio::test]
    async fn test_cron_rejects_wrong_secret_without_touching_store() {
        let store = Arc::new(MemoryStore::new());
        let stream = store.insert_stream(Uuid::new_v4(), "old", Utc::now() - Duration::days(30));
        let state = state_with(store.clone(), Some("s3cret"));

        for auth in [None, Some("Bearer wrong"), Some("s3cret"), Some("Bearer s3cret ")] {
            let (status, body) = process_streams_inner(&state, auth).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Unauthorized");
        }
        assert_eq!(store.update_count(), 0);
        assert_eq!(
            store.stream(stream.id).unwrap().last_updated_at,
            stream.last_updated_at
        );
    }

    #[tokio::test]
    async fn test_cron_with_nothing_stale() {
        let store = Arc::new(MemoryStore::new());
        store.insert_stream(Uuid::new_v4(), "fresh", Utc::now());
        let state = state_with(store, Some("s3cret"));

        let (status, body) = process_streams_inner(&state, Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "message": "No streams need updating",
                "processed": 0,
                "errors": 0,
            })
        );
    }

    #[tokio::test]
    async fn test_cron_refuses_overlapping_pass() {
        let store = Arc::new(MemoryStore::new());
        let stream = store.insert_stream(Uuid::new_v4(), "old", Utc::now() - Duration::days(30));
        let state = state_with(store.clone(), Some("s3cret"));

        let held = state.batch_lock.clone().try_lock_owned().unwrap();
        let (status, body) = process_streams_inner(&state, Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Stream processing already running");
        assert_eq!(store.update_count(), 0);
        assert_eq!(
            store.stream(stream.id).unwrap().last_updated_at,
            stream.last_updated_at
        );

        drop(held);
        let (status, _) = process_streams_inner(&state, Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cron_selection_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_failure(Some(StoreError::Query("timeout".to_string())));
        let state = state_with(store, Some("s3cret"));

        let (status, body) = process_streams_inner(&state, Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch streams");
    }

    #[tokio::test]
    async fn test_chat_inner_validates_messages() {
        let state = state_with(Arc::new(MemoryStore::new()), None);

        let response = chat_inner(&state, &HeaderMap::new(), br#"{"messages":[]}"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = chat_inner(&state, &HeaderMap::new(), b"{}").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = chat_inner(&state, &HeaderMap::new(), b"nope").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_inner_without_api_key_is_server_error() {
        let state = state_with(Arc::new(MemoryStore::new()), None);
        let response = chat_inner(
            &state,
            &HeaderMap::new(),
            br#"{"messages":[{"role":"user","content":"hi"}]}"#,
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

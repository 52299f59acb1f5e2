//! Shared fakes for router-level tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use jurnl_core::auth::{AuthError, SessionProvider};
use jurnl_core::config::LlmConfig;
use jurnl_core::llm::{ChatCompletionsClient, GenerateRequest, LlmBackend, LlmError, TokenStream};
use jurnl_core::models::User;
use jurnl_core::store::MemoryStore;
use jurnl_core::JurnlConfig;
use jurnl_server::http::{build_router, AppState};
use tower::ServiceExt;
use uuid::Uuid;

pub const CRON_SECRET: &str = "cron-test-secret";

/// Token → user table.
#[derive(Default)]
pub struct FakeSessions {
    users: HashMap<String, User>,
}

impl FakeSessions {
    pub fn with_user(mut self, token: &str) -> (Self, User) {
        let user = User::new(Uuid::new_v4());
        self.users.insert(token.to_string(), user.clone());
        (self, user)
    }
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn resolve(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(access_token).cloned())
    }
}

/// Summary model stand-in keyed by the topic at the end of the prompt.
#[derive(Default)]
pub struct ScriptedSummaries {
    blanks: Vec<String>,
    pub calls: Mutex<usize>,
}

impl ScriptedSummaries {
    pub fn blank_for(topic: &str) -> Self {
        Self {
            blanks: vec![topic.to_string()],
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedSummaries {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        *self.calls.lock().unwrap() += 1;
        let prompt = &request.messages[0].content;
        let topic = prompt.rsplit("Topic: ").next().unwrap_or_default();
        if self.blanks.iter().any(|b| b == topic) {
            Ok(String::new())
        } else {
            Ok(format!("Weekly digest: {topic}"))
        }
    }

    async fn stream(&self, _request: &GenerateRequest) -> Result<TokenStream, LlmError> {
        Err(LlmError::InvalidResponse("summaries are not streamed".to_string()))
    }

    fn model(&self) -> &str {
        "scripted-summary"
    }
}

pub fn chat_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        base_url: base_url.to_string(),
        api_key: "sk-test".to_string(),
        model: "gpt-test".to_string(),
        timeout_seconds: 5,
        ..LlmConfig::chat_defaults()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new(sessions: FakeSessions, summaries: Arc<ScriptedSummaries>, chat_base_url: &str) -> Self {
        let mut config = JurnlConfig::default();
        config.cron.secret = Some(CRON_SECRET.to_string());
        config.batch.delay_ms = 0;
        config.chat = chat_config(chat_base_url);

        let store = Arc::new(MemoryStore::new());
        let chat_llm = ChatCompletionsClient::new(&config.chat).expect("chat client");
        let state = AppState {
            store: store.clone(),
            sessions: Arc::new(sessions),
            chat_llm: Arc::new(chat_llm),
            summary_llm: summaries,
            config,
            batch_lock: Arc::new(tokio::sync::Mutex::new(())),
        };

        Self {
            router: build_router(Arc::new(state)),
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router is infallible")
    }
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).expect("json body")
}

pub fn streams_request(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/mcp/streams")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

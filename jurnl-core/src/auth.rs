//! Session lookup against the hosted identity provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::User;

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Resolve an access token. `Ok(None)` means the token is not a valid session.
    async fn resolve(&self, access_token: &str) -> Result<Option<User>, AuthError>;
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Identity provider URL is not configured")]
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl From<UserResponse> for User {
    fn from(r: UserResponse) -> Self {
        let metadata = r.user_metadata.unwrap_or_default();
        User {
            id: r.id,
            email: r.email,
            display_name: metadata.full_name.or(metadata.name),
        }
    }
}

/// Supabase-compatible `GET /auth/v1/user` client.
#[derive(Debug, Clone)]
pub struct SupabaseSessionClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseSessionClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }
}

#[async_trait]
impl SessionProvider for SupabaseSessionClient {
    async fn resolve(&self, access_token: &str) -> Result<Option<User>, AuthError> {
        if self.base_url.is_empty() {
            return Err(AuthError::NotConfigured);
        }
        if access_token.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => {
                let user: UserResponse = response.json().await?;
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(AuthError::Api {
                    code: s.as_u16(),
                    message,
                })
            }
        }
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct JurnlConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "LlmConfig::chat_defaults")]
    pub chat: LlmConfig,
    #[serde(default = "LlmConfig::summary_defaults")]
    pub summary: LlmConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl Default for JurnlConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
            auth: AuthConfig::default(),
            chat: LlmConfig::chat_defaults(),
            summary: LlmConfig::summary_defaults(),
            batch: BatchConfig::default(),
            cron: CronConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    /// Public base URL of the web app, used for deep links in emails.
    pub public_url: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Web-app link to one stream.
    pub fn stream_url(&self, stream_id: i64) -> String {
        format!("{}/streams/{}", self.public_url.trim_end_matches('/'), stream_id)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            url: String::new(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Hosted identity provider (Supabase-compatible auth API).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub url: String,
    pub anon_key: String,
    pub cookie_name: String,
    pub timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            cookie_name: "sb-access-token".to_string(),
            timeout_seconds: 10,
        }
    }
}

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Chat completions only; batch summaries use `batch.max_tokens`.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_llm_timeout() -> u64 {
    30
}

pub const CHAT_SYSTEM_PROMPT: &str = "You are Jurnl, a personal AI research assistant. \
Provide helpful, accurate, and well-researched responses. \
Always aim to be informative and cite relevant sources when possible.";

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are an AI research assistant tasked with providing \
comprehensive summaries of recent developments. Focus on the most important and newsworthy \
information from reliable sources.";

impl LlmConfig {
    pub fn chat_defaults() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
            max_tokens: None,
            timeout_seconds: 30,
        }
    }

    pub fn summary_defaults() -> Self {
        Self {
            base_url: "https://api.perplexity.ai".to_string(),
            api_key: String::new(),
            model: "sonar".to_string(),
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
            max_tokens: None,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub stale_after_days: i64,
    pub delay_ms: u64,
    pub max_tokens: u32,
    /// Run the batch pass on an in-process timer in addition to the cron endpoint.
    pub schedule_enabled: bool,
    pub interval_minutes: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            stale_after_days: 7,
            delay_ms: 1000,
            max_tokens: 1500,
            schedule_enabled: false,
            interval_minutes: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CronConfig {
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub base_url: String,
    pub api_key: String,
    pub from: String,
    pub support_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.resend.com".to_string(),
            api_key: String::new(),
            from: "Jurnl AI <updates@jurnl.ai>".to_string(),
            support_address: "support@jurnl.ai".to_string(),
        }
    }
}

impl JurnlConfig {
    /// Load `path` (optional), then `JURNL__SECTION__KEY` overrides, then
    /// conventional secret variables for anything still empty.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let chat = LlmConfig::chat_defaults();
        let summary = LlmConfig::summary_defaults();
        // Per-field defaults so a partial `[chat]`/`[summary]` table (or a lone
        // env override) still deserializes.
        let s = Config::builder()
            .set_default("chat.base_url", chat.base_url)?
            .set_default("chat.model", chat.model)?
            .set_default("chat.system_prompt", chat.system_prompt)?
            .set_default("summary.base_url", summary.base_url)?
            .set_default("summary.model", summary.model)?
            .set_default("summary.system_prompt", summary.system_prompt)?
            .set_default("summary.timeout_seconds", summary.timeout_seconds as i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("JURNL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut config: Self = s.try_deserialize()?;
        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn fill(slot: &mut String, value: Option<String>) {
            if slot.is_empty() {
                if let Some(v) = value.filter(|v| !v.is_empty()) {
                    *slot = v;
                }
            }
        }

        fill(&mut self.database.url, lookup("DATABASE_URL"));
        fill(&mut self.chat.api_key, lookup("OPENAI_API_KEY"));
        fill(&mut self.summary.api_key, lookup("PERPLEXITY_API_KEY"));
        fill(&mut self.auth.url, lookup("SUPABASE_URL"));
        fill(&mut self.auth.anon_key, lookup("SUPABASE_ANON_KEY"));
        fill(&mut self.email.api_key, lookup("RESEND_API_KEY"));

        if self.cron.secret.as_deref().map_or(true, str::is_empty) {
            self.cron.secret = lookup("CRON_SECRET").filter(|v| !v.is_empty());
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_batch_contract() {
        let config = JurnlConfig::default();
        assert_eq!(config.batch.stale_after_days, 7);
        assert_eq!(config.batch.delay_ms, 1000);
        assert_eq!(config.batch.max_tokens, 1500);
        assert!(!config.batch.schedule_enabled);
        assert_eq!(config.auth.cookie_name, "sb-access-token");
        assert!(config.cron.secret.is_none());
    }

    #[test]
    fn test_stream_url_joins_public_url() {
        let service = ServiceConfig {
            public_url: "https://jurnl.ai/".to_string(),
            ..ServiceConfig::default()
        };
        assert_eq!(service.stream_url(42), "https://jurnl.ai/streams/42");
    }

    #[test]
    fn test_env_fallbacks_fill_only_empty_secrets() {
        let mut config = JurnlConfig::default();
        config.chat.api_key = "from-file".to_string();

        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "from-env"),
            ("PERPLEXITY_API_KEY", "pplx"),
            ("CRON_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/jurnl"),
        ]
        .into_iter()
        .collect();
        config.apply_env_fallbacks(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.chat.api_key, "from-file");
        assert_eq!(config.summary.api_key, "pplx");
        assert_eq!(config.cron.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.database.url, "postgres://localhost/jurnl");
        assert!(config.email.api_key.is_empty());
    }

    #[test]
    fn test_empty_cron_secret_is_not_configured() {
        let mut config = JurnlConfig::default();
        config.cron.secret = Some(String::new());
        config.apply_env_fallbacks(|_| Some(String::new()));
        assert!(config.cron.secret.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = JurnlConfig::load("does-not-exist-jurnl").unwrap();
        assert_eq!(config.http.port, 8787);
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.summary.max_tokens, None);
        assert_eq!(config.batch.max_tokens, 1500);
    }
}

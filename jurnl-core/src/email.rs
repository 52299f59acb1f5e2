//! Stream-update notification emails.
//!
//! Not wired into the batch job: the job only logs which user would be
//! notified. `EmailClient` can be invoked directly once user emails are
//! reachable from the service side.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EmailConfig;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email sending failed ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing email API key")]
    MissingApiKey,
}

#[derive(Debug, Clone)]
pub struct StreamUpdateEmail {
    pub to_email: String,
    pub topic: String,
    pub summary_content: String,
    pub stream_url: String,
    pub user_name: Option<String>,
}

/// A rendered message in the shape the email API accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Minimal escaping for text interpolated into HTML bodies.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const EMAIL_STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; \
line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; } \
.container { background-color: white; border-radius: 8px; padding: 30px; } \
.header { text-align: center; margin-bottom: 30px; padding-bottom: 20px; border-bottom: 2px solid #FF6600; } \
.logo { font-size: 24px; font-weight: bold; color: #FF6600; } \
.topic-title { font-size: 20px; font-weight: 600; color: #2c3e50; margin-bottom: 20px; } \
.summary-content { background-color: #f8f9fa; border-left: 4px solid #FF6600; padding: 20px; margin: 20px 0; } \
.cta-button { display: inline-block; background-color: #FF6600; color: white; padding: 12px 24px; \
text-decoration: none; border-radius: 6px; font-weight: 600; } \
.footer { margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; font-size: 14px; color: #666; text-align: center; }";

pub fn build_stream_update_email(config: &EmailConfig, params: &StreamUpdateEmail) -> EmailMessage {
    let user_name = params.user_name.as_deref().unwrap_or("there");
    let topic = escape_html(&params.topic);
    let url = escape_html(&params.stream_url);
    let support = &config.support_address;

    let paragraphs: String = params
        .summary_content
        .split('\n')
        .map(|line| format!("<p>{}</p>", escape_html(line)))
        .collect();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Stream Update</title>
<style>{EMAIL_STYLE}</style>
</head>
<body>
<div class="container">
<div class="header">
<div class="logo">Jurnl AI</div>
<p>Your AI research assistant has found new updates</p>
</div>
<h2>Hi {name}!</h2>
<p>We've found new developments for your stream:</p>
<div class="topic-title">{topic}</div>
<div class="summary-content">
<h3>Latest Summary:</h3>
{paragraphs}
</div>
<p><a href="{url}" class="cta-button">View Full Stream</a></p>
<p>This summary was generated based on the latest developments and news in your area of interest.</p>
<div class="footer">
<p>You're receiving this because you subscribed to updates for "{topic}"</p>
<p><a href="{url}">Manage your stream settings</a> &bull; <a href="mailto:{support}">Contact Support</a></p>
</div>
</div>
</body>
</html>"#,
        name = escape_html(user_name),
    );

    let text = format!(
        "Hi {user_name}!\n\n\
We've found new developments for your stream: \"{topic}\"\n\n\
Latest Summary:\n{summary}\n\n\
View the full stream at: {url}\n\n\
This summary was generated based on the latest developments and news in your area of interest.\n\n\
You're receiving this because you subscribed to updates for \"{topic}\".\n\
Manage your stream settings at: {url}\n\n\
Contact support: {support}\n",
        topic = params.topic,
        summary = params.summary_content,
        url = params.stream_url,
    );

    EmailMessage {
        from: config.from.clone(),
        to: vec![params.to_email.clone()],
        subject: format!("New updates for \"{}\"", params.topic),
        html,
        text,
    }
}

/// Diagnostic message for checking email delivery end to end.
pub fn build_test_email(config: &EmailConfig, to_email: &str) -> EmailMessage {
    EmailMessage {
        from: config.from.clone(),
        to: vec![to_email.to_string()],
        subject: "Jurnl AI Email Test".to_string(),
        html: "<h2>Email Service Working!</h2>\
<p>This is a test email to confirm your Jurnl AI email notifications are set up correctly.</p>\
<p>You should now receive updates when your streams have new content.</p>"
            .to_string(),
        text: "Email Service Working! This is a test email to confirm your Jurnl AI email \
notifications are set up correctly."
            .to_string(),
    }
}

/// Transactional-email API client (`POST /emails`).
#[derive(Debug, Clone)]
pub struct EmailClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl EmailClient {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        if config.api_key.is_empty() {
            return Err(EmailError::MissingApiKey);
        }
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Send `message`, returning the provider's message id.
    pub async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), message = %message, "Email API error");
            return Err(EmailError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let sent: SendResponse = response.json().await?;
        tracing::info!(id = %sent.id, "Email sent");
        Ok(sent.id)
    }
}

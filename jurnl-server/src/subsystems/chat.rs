//! Chat relay: forwards a conversation to the chat model and re-encodes the
//! token stream in the AI data-stream line format.

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use jurnl_core::llm::TokenStream;
use jurnl_core::models::{ChatMessage, ChatRole};
use jurnl_core::store::Store;
use serde_json::json;
use uuid::Uuid;

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

pub fn text_part(token: &str) -> String {
    format!("0:{}\n", json!(token))
}

pub fn error_part(message: &str) -> String {
    format!("3:{}\n", json!(message))
}

pub fn finish_part(reason: &str) -> String {
    format!("d:{}\n", json!({ "finishReason": reason }))
}

/// Saves the exchange once the reply is complete.
pub struct ChatPersistence {
    pub store: Arc<dyn Store>,
    pub user_id: Uuid,
    pub user_message: String,
}

impl ChatPersistence {
    /// Failures are logged and swallowed.
    pub async fn save(self, reply: &str) {
        let messages = [
            ChatMessage::new(self.user_id, ChatRole::User, self.user_message),
            ChatMessage::new(self.user_id, ChatRole::Assistant, reply),
        ];
        match self.store.save_chat_messages(&messages).await {
            Ok(()) => tracing::debug!(user_id = %self.user_id, "Chat exchange saved"),
            Err(e) => tracing::warn!(user_id = %self.user_id, error = %e, "Failed to save chat exchange"),
        }
    }
}

struct RelayState {
    tokens: TokenStream,
    reply: String,
    finished: bool,
    persistence: Option<ChatPersistence>,
}

/// Encode `tokens` as data-stream parts. On normal completion with a
/// non-empty reply the exchange is persisted (when `persistence` is set)
/// before the finish part is sent.
/// A mid-stream failure emits an error part and an `error` finish part and
/// saves nothing.
pub fn relay(
    tokens: TokenStream,
    persistence: Option<ChatPersistence>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let state = RelayState {
        tokens,
        reply: String::new(),
        finished: false,
        persistence,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let part = match state.tokens.next().await {
            Some(Ok(token)) => {
                state.reply.push_str(&token);
                text_part(&token)
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, received = state.reply.len(), "Chat stream interrupted");
                state.finished = true;
                format!("{}{}", error_part("The response was interrupted."), finish_part("error"))
            }
            None => {
                state.finished = true;
                tracing::info!(reply_len = state.reply.len(), "Chat reply complete");
                match state.persistence.take() {
                    Some(persistence) if !state.reply.is_empty() => {
                        persistence.save(&state.reply).await
                    }
                    Some(_) => tracing::warn!("Model returned no tokens; exchange not saved"),
                    None => {}
                }
                finish_part("stop")
            }
        };

        Some((Ok(Bytes::from(part)), state))
    })
}

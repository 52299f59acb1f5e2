pub mod actions;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod llm;
pub mod models;
pub mod store;

pub use actions::{ActionParseError, StreamAction};
pub use auth::{AuthError, SessionProvider, SupabaseSessionClient};
pub use config::JurnlConfig;
pub use email::{EmailClient, EmailError, EmailMessage, StreamUpdateEmail};
pub use error::JurnlError;
pub use llm::{ChatCompletionsClient, ChatTurn, GenerateRequest, LlmBackend, LlmError, TokenStream};
pub use models::{ChatMessage, ChatRole, DashboardStats, Stream, StreamUpdate, User};
pub use store::{MemoryStore, PgStore, Store, StoreError};

pub mod chat_message;
pub mod stream;
pub mod stream_update;
pub mod user;

pub use chat_message::{ChatMessage, ChatRole};
pub use stream::{DashboardStats, Stream, DEFAULT_FREQUENCY};
pub use stream_update::StreamUpdate;
pub use user::User;

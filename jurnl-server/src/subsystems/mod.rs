pub mod batch;
pub mod chat;
pub mod scheduler;
pub mod streams;

pub mod chat;
pub mod message;

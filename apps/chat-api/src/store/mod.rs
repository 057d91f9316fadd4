//! External collaborators consumed by the chat core.
//!
//! Both collaborators are object-safe async traits (backed by Postgres in
//! production and in-memory fakes in tests) so the gateway and routes never
//! depend on a concrete storage backend.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::message::Message;

/// Validates session tokens against the credential backend.
///
/// Callers must fail closed: an `Err` from `validate` is indistinguishable
/// from an invalid token.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn validate(&self, user_id: i32, session_token: &str) -> Result<bool, ApiError>;
}

/// One chat as presented to its participant: metadata, membership, and the
/// most recent slice of the message log.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatOverview {
    pub chat_id: i32,
    pub created_at: DateTime<Utc>,
    pub last_read_message_id: Option<i64>,
    pub participants: Vec<i32>,
    /// Latest messages, ascending by id.
    pub messages: Vec<Message>,
}

/// Durable append-only message log plus the membership view the gateway
/// loads at connect time.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The set of chat ids the user participates in.
    async fn chats_for_user(&self, user_id: i32) -> Result<HashSet<i32>, ApiError>;

    /// Append a message. The store assigns the id atomically with insertion,
    /// so two concurrent sends to the same chat never share an id.
    async fn insert_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Message, ApiError>;

    async fn is_participant(&self, chat_id: i32, user_id: i32) -> Result<bool, ApiError>;

    /// Per-chat overview for every chat the user participates in.
    async fn chat_overview(&self, user_id: i32) -> Result<Vec<ChatOverview>, ApiError>;

    /// Up to `limit` messages older than `before` (or the newest messages
    /// when `before` is absent), ascending by id.
    async fn messages_before(
        &self,
        chat_id: i32,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError>;

    /// Record the last message the user has read in a chat.
    async fn mark_read(&self, chat_id: i32, user_id: i32, message_id: i64) -> Result<(), ApiError>;

    /// Create a chat with the given participants; returns the new chat id.
    async fn create_chat(&self, participants: &[i32]) -> Result<i32, ApiError>;
}

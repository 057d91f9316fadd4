//! In-memory collaborator implementations for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::message::Message;

use super::{ChatOverview, ChatStore, CredentialStore};

/// Credential store backed by a plain set of `(user_id, token)` grants.
pub struct MemoryCredentialStore {
    grants: Mutex<HashSet<(i32, String)>>,
    unavailable: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Mark a session token as valid for a user.
    pub fn grant(&self, user_id: i32, token: &str) {
        self.grants.lock().insert((user_id, token.to_string()));
    }

    /// Simulate a backend outage: every `validate` call returns an error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn validate(&self, user_id: i32, session_token: &str) -> Result<bool, ApiError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(ApiError::internal("credential store unavailable"));
        }
        Ok(self
            .grants
            .lock()
            .contains(&(user_id, session_token.to_string())))
    }
}

struct MemoryChats {
    next_chat_id: i32,
    next_message_id: i64,
    created_at: HashMap<i32, DateTime<Utc>>,
    participants: HashMap<i32, Vec<i32>>,
    last_read: HashMap<(i32, i32), i64>,
    messages: Vec<Message>,
}

/// Chat store backed by plain maps. Ids are assigned under one lock, so the
/// same atomic id-with-insert contract as the Postgres store holds.
pub struct MemoryChatStore {
    inner: Mutex<MemoryChats>,
    unavailable: AtomicBool,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryChats {
                next_chat_id: 1,
                next_message_id: 1,
                created_at: HashMap::new(),
                participants: HashMap::new(),
                last_read: HashMap::new(),
                messages: Vec::new(),
            }),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a storage outage: every trait method returns an error.
    /// Seeding and inspection helpers keep working.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), ApiError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(ApiError::internal("chat store unavailable"));
        }
        Ok(())
    }

    /// Seed a chat with the given participants; returns the chat id.
    pub fn seed_chat(&self, participants: &[i32]) -> i32 {
        let mut inner = self.inner.lock();
        let chat_id = inner.next_chat_id;
        inner.next_chat_id += 1;
        inner.created_at.insert(chat_id, Utc::now());
        inner.participants.insert(chat_id, participants.to_vec());
        chat_id
    }

    /// All stored messages for a chat, ascending by id.
    pub fn messages_in(&self, chat_id: i32) -> Vec<Message> {
        self.inner
            .lock()
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn last_read(&self, chat_id: i32, user_id: i32) -> Option<i64> {
        self.inner.lock().last_read.get(&(chat_id, user_id)).copied()
    }
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn chats_for_user(&self, user_id: i32) -> Result<HashSet<i32>, ApiError> {
        self.check_available()?;
        let inner = self.inner.lock();
        Ok(inner
            .participants
            .iter()
            .filter(|(_, users)| users.contains(&user_id))
            .map(|(&chat_id, _)| chat_id)
            .collect())
    }

    async fn insert_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Message, ApiError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        if !inner.created_at.contains_key(&chat_id) {
            return Err(ApiError::not_found("Chat not found"));
        }
        let id = inner.next_message_id;
        inner.next_message_id += 1;
        let message = Message {
            id,
            chat_id,
            sender_id,
            message: body.to_string(),
            sent_at,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn is_participant(&self, chat_id: i32, user_id: i32) -> Result<bool, ApiError> {
        self.check_available()?;
        let inner = self.inner.lock();
        Ok(inner
            .participants
            .get(&chat_id)
            .is_some_and(|users| users.contains(&user_id)))
    }

    async fn chat_overview(&self, user_id: i32) -> Result<Vec<ChatOverview>, ApiError> {
        self.check_available()?;
        let inner = self.inner.lock();
        let mut chat_ids: Vec<i32> = inner
            .participants
            .iter()
            .filter(|(_, users)| users.contains(&user_id))
            .map(|(&chat_id, _)| chat_id)
            .collect();
        chat_ids.sort_unstable();

        let overviews = chat_ids
            .into_iter()
            .map(|chat_id| {
                let mut messages: Vec<Message> = inner
                    .messages
                    .iter()
                    .filter(|m| m.chat_id == chat_id)
                    .cloned()
                    .collect();
                let skip = messages.len().saturating_sub(20);
                messages.drain(..skip);

                ChatOverview {
                    chat_id,
                    created_at: inner.created_at[&chat_id],
                    last_read_message_id: inner.last_read.get(&(chat_id, user_id)).copied(),
                    participants: inner.participants[&chat_id].clone(),
                    messages,
                }
            })
            .collect();

        Ok(overviews)
    }

    async fn messages_before(
        &self,
        chat_id: i32,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        self.check_available()?;
        let inner = self.inner.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| before.is_none_or(|b| m.id < b))
            .cloned()
            .collect();
        let skip = messages.len().saturating_sub(limit as usize);
        messages.drain(..skip);
        Ok(messages)
    }

    async fn mark_read(&self, chat_id: i32, user_id: i32, message_id: i64) -> Result<(), ApiError> {
        self.check_available()?;
        self.inner
            .lock()
            .last_read
            .insert((chat_id, user_id), message_id);
        Ok(())
    }

    async fn create_chat(&self, participants: &[i32]) -> Result<i32, ApiError> {
        self.check_available()?;
        Ok(self.seed_chat(participants))
    }
}

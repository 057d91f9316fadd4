//! Postgres-backed collaborator implementations.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::pool::DbPool;
use crate::db::schema::{chat_participants, chats, codes, messages};
use crate::error::ApiError;
use crate::models::chat::{Chat, ChatParticipant, NewChat, NewChatParticipant};
use crate::models::message::{Message, NewMessage};

use super::{ChatOverview, ChatStore, CredentialStore};

/// Messages included per chat in the overview response.
const OVERVIEW_MESSAGES: i64 = 20;

/// Validates session tokens against the `codes` table.
pub struct PgCredentialStore {
    db: DbPool,
}

impl PgCredentialStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn validate(&self, user_id: i32, session_token: &str) -> Result<bool, ApiError> {
        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            codes::table
                .filter(codes::user_id.eq(user_id))
                .filter(codes::code.eq(session_token))
                .filter(codes::expires_at.gt(Utc::now()))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count > 0)
    }
}

/// Message log and membership view over the `chats`, `chat_participants`,
/// and `messages` tables.
pub struct PgChatStore {
    db: DbPool,
}

impl PgChatStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn chats_for_user(&self, user_id: i32) -> Result<HashSet<i32>, ApiError> {
        let mut conn = self.db.get().await?;

        let ids: Vec<i32> = diesel_async::RunQueryDsl::load(
            chat_participants::table
                .filter(chat_participants::user_id.eq(user_id))
                .select(chat_participants::chat_id),
            &mut conn,
        )
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn insert_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Message, ApiError> {
        let mut conn = self.db.get().await?;

        let message: Message = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values(NewMessage {
                    chat_id,
                    sender_id,
                    message: body,
                    sent_at,
                })
                .returning(Message::as_returning()),
            &mut conn,
        )
        .await?;

        Ok(message)
    }

    async fn is_participant(&self, chat_id: i32, user_id: i32) -> Result<bool, ApiError> {
        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            chat_participants::table
                .filter(chat_participants::chat_id.eq(chat_id))
                .filter(chat_participants::user_id.eq(user_id))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count > 0)
    }

    async fn chat_overview(&self, user_id: i32) -> Result<Vec<ChatOverview>, ApiError> {
        let mut conn = self.db.get().await?;

        let memberships: Vec<ChatParticipant> = diesel_async::RunQueryDsl::load(
            chat_participants::table
                .filter(chat_participants::user_id.eq(user_id))
                .select(ChatParticipant::as_select()),
            &mut conn,
        )
        .await?;

        let chat_ids: Vec<i32> = memberships.iter().map(|m| m.chat_id).collect();
        if chat_ids.is_empty() {
            return Ok(Vec::new());
        }

        let chat_rows: Vec<Chat> = diesel_async::RunQueryDsl::load(
            chats::table
                .filter(chats::id.eq_any(&chat_ids))
                .order(chats::id.asc())
                .select(Chat::as_select()),
            &mut conn,
        )
        .await?;

        let all_participants: Vec<ChatParticipant> = diesel_async::RunQueryDsl::load(
            chat_participants::table
                .filter(chat_participants::chat_id.eq_any(&chat_ids))
                .select(ChatParticipant::as_select()),
            &mut conn,
        )
        .await?;

        let mut overviews = Vec::with_capacity(chat_rows.len());
        for chat in chat_rows {
            let latest: Vec<Message> = diesel_async::RunQueryDsl::load(
                messages::table
                    .filter(messages::chat_id.eq(chat.id))
                    .order(messages::id.desc())
                    .limit(OVERVIEW_MESSAGES)
                    .select(Message::as_select()),
                &mut conn,
            )
            .await?;

            let participants: Vec<i32> = all_participants
                .iter()
                .filter(|p| p.chat_id == chat.id)
                .map(|p| p.user_id)
                .collect();

            let last_read_message_id = memberships
                .iter()
                .find(|m| m.chat_id == chat.id)
                .and_then(|m| m.last_read_message_id);

            overviews.push(ChatOverview {
                chat_id: chat.id,
                created_at: chat.created_at,
                last_read_message_id,
                participants,
                messages: latest.into_iter().rev().collect(),
            });
        }

        Ok(overviews)
    }

    async fn messages_before(
        &self,
        chat_id: i32,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, ApiError> {
        let mut conn = self.db.get().await?;

        let mut query = messages::table
            .filter(messages::chat_id.eq(chat_id))
            .order(messages::id.desc())
            .limit(limit)
            .select(Message::as_select())
            .into_boxed();

        if let Some(before) = before {
            query = query.filter(messages::id.lt(before));
        }

        let rows: Vec<Message> = diesel_async::RunQueryDsl::load(query, &mut conn).await?;

        // Return in ascending (chronological) order.
        Ok(rows.into_iter().rev().collect())
    }

    async fn mark_read(&self, chat_id: i32, user_id: i32, message_id: i64) -> Result<(), ApiError> {
        let mut conn = self.db.get().await?;

        diesel_async::RunQueryDsl::execute(
            diesel::update(
                chat_participants::table
                    .filter(chat_participants::chat_id.eq(chat_id))
                    .filter(chat_participants::user_id.eq(user_id)),
            )
            .set(chat_participants::last_read_message_id.eq(Some(message_id))),
            &mut conn,
        )
        .await?;

        Ok(())
    }

    async fn create_chat(&self, participants: &[i32]) -> Result<i32, ApiError> {
        let mut conn = self.db.get().await?;

        let chat_id: i32 = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chats::table)
                .values(NewChat {
                    created_at: Utc::now(),
                })
                .returning(chats::id),
            &mut conn,
        )
        .await?;

        let rows: Vec<NewChatParticipant> = participants
            .iter()
            .map(|&user_id| NewChatParticipant { chat_id, user_id })
            .collect();

        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(chat_participants::table).values(&rows),
            &mut conn,
        )
        .await?;

        Ok(chat_id)
    }
}

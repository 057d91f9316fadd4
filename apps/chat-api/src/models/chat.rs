use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::{chat_participants, chats};

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = chats)]
pub struct Chat {
    pub id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chats)]
pub struct NewChat {
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = chat_participants)]
pub struct ChatParticipant {
    pub chat_id: i32,
    pub user_id: i32,
    pub last_read_message_id: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_participants)]
pub struct NewChatParticipant {
    pub chat_id: i32,
    pub user_id: i32,
}

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::messages;

/// A stored chat message. Immutable once created; never deleted by this
/// service.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: i64,
    pub chat_id: i32,
    pub sender_id: i32,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage<'a> {
    pub chat_id: i32,
    pub sender_id: i32,
    pub message: &'a str,
    pub sent_at: DateTime<Utc>,
}

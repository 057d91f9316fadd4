//! Chat history and membership endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::SessionUser;
use crate::error::{ApiError, FieldError};
use crate::models::message::Message;
use crate::store::ChatOverview;
use crate::AppState;

/// Page size for message history queries.
const HISTORY_PAGE_SIZE: i64 = 20;

/// Maximum message body length in characters (matches the gateway limit).
const MAX_MESSAGE_CHARS: usize = 2048;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats).post(create_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(list_older_messages).post(send_message),
        )
        .route("/chats/{chat_id}/read", post(mark_read))
}

// ---------------------------------------------------------------------------
// GET /api/v1/chats
// ---------------------------------------------------------------------------

#[utoipa::path(get, path = "/api/v1/chats", tag = "Chats",
    responses((status = 200, body = Vec<ChatOverview>)))]
pub async fn list_chats(
    SessionUser { user_id }: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatOverview>>, ApiError> {
    let overviews = state.store.chat_overview(user_id).await?;
    Ok(Json(overviews))
}

// ---------------------------------------------------------------------------
// GET /api/v1/chats/{chat_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub before: Option<i64>,
}

#[utoipa::path(get, path = "/api/v1/chats/{chat_id}/messages", tag = "Chats",
    responses((status = 200, body = Vec<Message>)))]
pub async fn list_older_messages(
    SessionUser { user_id }: SessionUser,
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    require_participant(&state, chat_id, user_id).await?;

    let messages = state
        .store
        .messages_before(chat_id, params.before, HISTORY_PAGE_SIZE)
        .await?;
    Ok(Json(messages))
}

// ---------------------------------------------------------------------------
// POST /api/v1/chats/{chat_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
}

#[utoipa::path(post, path = "/api/v1/chats/{chat_id}/messages", tag = "Chats",
    responses((status = 201, body = Message)))]
pub async fn send_message(
    SessionUser { user_id }: SessionUser,
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    require_participant(&state, chat_id, user_id).await?;

    let mut errors = Vec::new();
    if body.message.is_empty() {
        errors.push(FieldError {
            field: "message".to_string(),
            message: "Message cannot be empty".to_string(),
        });
    } else if body.message.chars().count() > MAX_MESSAGE_CHARS {
        errors.push(FieldError {
            field: "message".to_string(),
            message: "Message must be at most 2048 characters".to_string(),
        });
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let message = state
        .store
        .insert_message(chat_id, user_id, &body.message, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

// ---------------------------------------------------------------------------
// POST /api/v1/chats/{chat_id}/read
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkReadRequest {
    pub message_id: i64,
}

#[utoipa::path(post, path = "/api/v1/chats/{chat_id}/read", tag = "Chats",
    responses((status = 204)))]
pub async fn mark_read(
    SessionUser { user_id }: SessionUser,
    State(state): State<AppState>,
    Path(chat_id): Path<i32>,
    Json(body): Json<MarkReadRequest>,
) -> Result<StatusCode, ApiError> {
    require_participant(&state, chat_id, user_id).await?;

    state.store.mark_read(chat_id, user_id, body.message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /api/v1/chats
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChatRequest {
    /// Other participants; the caller is always included.
    pub participants: Vec<i32>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct CreateChatResponse {
    pub chat_id: i32,
}

#[utoipa::path(post, path = "/api/v1/chats", tag = "Chats",
    responses((status = 201, body = CreateChatResponse)))]
pub async fn create_chat(
    SessionUser { user_id }: SessionUser,
    State(state): State<AppState>,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<CreateChatResponse>), ApiError> {
    let mut participants: Vec<i32> = body.participants;
    participants.push(user_id);
    participants.sort_unstable();
    participants.dedup();

    if participants.len() < 2 {
        return Err(ApiError::validation(vec![FieldError {
            field: "participants".to_string(),
            message: "A chat needs at least one other participant".to_string(),
        }]));
    }

    let chat_id = state.store.create_chat(&participants).await?;

    // New membership reaches the gateway on the participants' next
    // reconnect; live connections keep their connect-time snapshot.
    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id })))
}

async fn require_participant(
    state: &AppState,
    chat_id: i32,
    user_id: i32,
) -> Result<(), ApiError> {
    if !state.store.is_participant(chat_id, user_id).await? {
        return Err(ApiError::forbidden(
            "User is not a participant in this chat",
        ));
    }
    Ok(())
}

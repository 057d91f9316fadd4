pub mod chats;
pub mod health;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest("/api/v1", chats::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Chats
        chats::list_chats,
        chats::list_older_messages,
        chats::send_message,
        chats::mark_read,
        chats::create_chat,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::message::Message,
            crate::store::ChatOverview,
            // Route request/response types
            health::HealthResponse,
            chats::SendMessageRequest,
            chats::MarkReadRequest,
            chats::CreateChatRequest,
            chats::CreateChatResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Chats", description = "Chat history and membership"),
    )
)]
pub struct ApiDoc;

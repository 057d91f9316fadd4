//! Wire-format frames for the chat WebSocket.

use serde::{Deserialize, Serialize};

/// WebSocket close code for authorization and policy failures (invalid
/// session, unauthorized chat, storage failure mid-send).
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// WebSocket close code for frames the server cannot parse.
pub const CLOSE_CANNOT_ACCEPT: u16 = 1003;

/// A frame received from the client.
///
/// `id` is the chat the frame targets. `isMessage` distinguishes a message
/// send from a typing indicator; `content` is only meaningful for sends.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub id: i32,
    #[serde(rename = "isMessage")]
    pub is_message: bool,
    #[serde(default)]
    pub content: Option<String>,
}

/// A frame sent to the client, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// A persisted chat message. Sent to the sender as the acknowledgment
    /// and broadcast to every other subscriber.
    Message {
        chat_id: i32,
        message_id: i64,
        sender_id: i32,
        message: String,
        /// Epoch milliseconds.
        sent_at: i64,
    },
    /// Best-effort typing indicator; never stored.
    Typing { chat_id: i32, user_id: i32 },
    /// Recoverable validation failure, sent to the offending connection only.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_accepts_wire_field_names() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"id":7,"isMessage":true,"content":"hello"}"#).unwrap();
        assert_eq!(frame.id, 7);
        assert!(frame.is_message);
        assert_eq!(frame.content.as_deref(), Some("hello"));
    }

    #[test]
    fn client_frame_content_is_optional() {
        let frame: ClientFrame = serde_json::from_str(r#"{"id":3,"isMessage":false}"#).unwrap();
        assert!(!frame.is_message);
        assert!(frame.content.is_none());
    }

    #[test]
    fn server_events_are_tagged_by_type() {
        let json = serde_json::to_value(ServerEvent::Typing {
            chat_id: 7,
            user_id: 42,
        })
        .unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["chat_id"], 7);
        assert_eq!(json["user_id"], 42);

        let json = serde_json::to_value(ServerEvent::Message {
            chat_id: 7,
            message_id: 12,
            sender_id: 42,
            message: "hi".to_string(),
            sent_at: 1700000000000,
        })
        .unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["message_id"], 12);
        assert_eq!(json["sent_at"], 1700000000000i64);
    }
}

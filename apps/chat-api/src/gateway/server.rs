//! WebSocket upgrade handler and per-connection event loop.
//!
//! Each connection walks UNAUTHENTICATED → AUTHENTICATED → CLOSED. The
//! session token is validated and the membership snapshot loaded before the
//! connection is registered; after that the loop processes inbound frames
//! strictly in order while draining the connection's outbound fanout queue.
//! Every exit path funnels through a single unregister call.

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::AppState;

use super::events::{ClientFrame, ServerEvent, CLOSE_CANNOT_ACCEPT, CLOSE_POLICY_VIOLATION};
use super::registry::ConnId;

/// Maximum message body length in characters.
const MAX_MESSAGE_CHARS: usize = 2048;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/chat", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, params, state))
}

async fn handle_connection(socket: WebSocket, params: HashMap<String, String>, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();

    // UNAUTHENTICATED: no frame is read until the handshake checks out.
    let identity = params
        .get("id")
        .and_then(|v| v.parse::<i32>().ok())
        .zip(params.get("session_id"));
    let Some((user_id, session_token)) = identity else {
        let _ = send_close(&mut ws_tx, CLOSE_POLICY_VIOLATION, "Invalid session ID").await;
        return;
    };

    // Fail closed: a credential-store error is treated as an invalid token.
    let valid = state
        .credentials
        .validate(user_id, session_token)
        .await
        .unwrap_or(false);
    if !valid {
        tracing::debug!(user_id, "session validation failed");
        let _ = send_close(&mut ws_tx, CLOSE_POLICY_VIOLATION, "Invalid session ID").await;
        return;
    }

    // Membership snapshot, loaded once. A chat joined after this point is
    // not delivered to this connection until it reconnects.
    let chats = match state.store.chats_for_user(user_id).await {
        Ok(chats) => chats,
        Err(_) => {
            let _ =
                send_close(&mut ws_tx, CLOSE_POLICY_VIOLATION, "Failed to subscribe to chats").await;
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let conn = state.registry.register(user_id, chats, tx);

    tracing::info!(%conn, user_id, "chat connection established");

    // AUTHENTICATED until the transport closes or a protocol violation.
    run_connection(&state, conn, user_id, &mut ws_tx, ws_rx, rx).await;

    // CLOSED: teardown runs exactly once, regardless of which path broke
    // the loop, so the registry never leaks a subscription.
    state.registry.unregister(conn);

    tracing::info!(%conn, user_id, "chat connection closed");
}

async fn run_connection(
    state: &AppState,
    conn: ConnId,
    user_id: i32,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut rx: mpsc::UnboundedReceiver<ServerEvent>,
) {
    loop {
        tokio::select! {
            // Frames from this client, processed strictly in order.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_frame(state, conn, user_id, text.as_str(), ws_tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%conn, ?e, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Fanout from other connections' handlers.
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Process one inbound frame. Returns `false` when the connection must
/// close; the caller owns teardown.
async fn handle_frame(
    state: &AppState,
    conn: ConnId,
    user_id: i32,
    text: &str,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) -> bool {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(%conn, %e, "malformed frame");
            let _ = send_close(ws_tx, CLOSE_CANNOT_ACCEPT, "Invalid message format").await;
            return false;
        }
    };

    // Hard authorization boundary: membership comes from the registry
    // snapshot taken at connect time, never from the frame itself.
    if !state.registry.is_member(conn, frame.id) {
        tracing::debug!(%conn, user_id, chat_id = frame.id, "frame for unauthorized chat");
        let _ = send_close(
            ws_tx,
            CLOSE_POLICY_VIOLATION,
            "User is not a participant in this chat",
        )
        .await;
        return false;
    }

    if !frame.is_message {
        // Typing indicators are fire-and-forget: no storage, no ack.
        broadcast(
            state,
            frame.id,
            user_id,
            &ServerEvent::Typing {
                chat_id: frame.id,
                user_id,
            },
        );
        return true;
    }

    let body = frame.content.unwrap_or_default();
    if let Err(reason) = validate_body(&body) {
        // Recoverable: report to the sender only, connection stays open.
        let event = ServerEvent::Error {
            message: reason.to_string(),
        };
        return send_event(ws_tx, &event).await.is_ok();
    }

    let stored = match state
        .store
        .insert_message(frame.id, user_id, &body, Utc::now())
        .await
    {
        Ok(message) => message,
        Err(e) => {
            // The send may not be durable; close rather than ack it.
            tracing::error!(%conn, chat_id = frame.id, ?e, "message insert failed");
            let _ = send_close(ws_tx, CLOSE_POLICY_VIOLATION, "Database error").await;
            return false;
        }
    };

    let event = ServerEvent::Message {
        chat_id: stored.chat_id,
        message_id: stored.id,
        sender_id: stored.sender_id,
        message: stored.message,
        sent_at: stored.sent_at.timestamp_millis(),
    };

    // Persistence is done: ack the sender first, then fan out. The fanout
    // happens even when the ack write fails, since the stored message must
    // still reach the other subscribers.
    let ack = send_event(ws_tx, &event).await;
    broadcast(state, frame.id, user_id, &event);
    ack.is_ok()
}

fn validate_body(body: &str) -> Result<(), &'static str> {
    if body.is_empty() {
        return Err("Message cannot be empty");
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err("Message must be at most 2048 characters");
    }
    Ok(())
}

/// Deliver an event to every subscriber of a chat except the sender's own
/// connections. The subscriber snapshot is taken under the registry lock;
/// delivery is not, so a connection closing mid-fanout just misses the
/// event.
fn broadcast(state: &AppState, chat_id: i32, sender_id: i32, event: &ServerEvent) {
    for sub in state.registry.subscribers_of(chat_id) {
        if sub.user_id == sender_id {
            continue;
        }
        if sub.tx.send(event.clone()).is_err() {
            tracing::debug!(conn = %sub.conn, chat_id, "dropping event for closing connection");
        }
    }
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

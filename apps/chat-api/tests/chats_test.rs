mod common;

use std::net::SocketAddr;

use chat_api::store::ChatStore;
use chrono::Utc;
use reqwest::StatusCode;

fn api(addr: SocketAddr, path: &str, user_id: i32, token: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("http://{addr}/api/v1{path}{sep}id={user_id}&session_id={token}")
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");

    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/v1/chats"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .get(api(addr, "/chats", 1, "wrong-token"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn credential_outage_reads_as_unauthorized() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    backend.credentials.set_unavailable(true);

    let resp = reqwest::Client::new()
        .get(api(addr, "/chats", 1, "tok-1"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overview_lists_chats_with_recent_messages_and_read_marker() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let chat_id = backend.store.seed_chat(&[1, 2]);
    backend.store.seed_chat(&[2, 3]);

    for i in 0..25 {
        backend
            .store
            .insert_message(chat_id, 2, &format!("msg {i}"), Utc::now())
            .await
            .expect("seed message");
    }
    backend
        .store
        .mark_read(chat_id, 1, 5)
        .await
        .expect("seed read marker");

    let resp = reqwest::Client::new()
        .get(api(addr, "/chats", 1, "tok-1"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = resp.json().await.expect("json body");
    let chats = body.as_array().expect("array");
    // Only the caller's own chat shows up.
    assert_eq!(chats.len(), 1);
    let chat = &chats[0];
    assert_eq!(chat["chat_id"], chat_id);
    assert_eq!(chat["last_read_message_id"], 5);
    assert_eq!(chat["participants"], serde_json::json!([1, 2]));

    // Last 20 messages, oldest first.
    let messages = chat["messages"].as_array().expect("messages");
    assert_eq!(messages.len(), 20);
    assert_eq!(messages[0]["message"], "msg 5");
    assert_eq!(messages[19]["message"], "msg 24");
}

// ---------------------------------------------------------------------------
// Message history pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_pages_backwards_through_the_before_cursor() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let chat_id = backend.store.seed_chat(&[1, 2]);

    for i in 0..45 {
        backend
            .store
            .insert_message(chat_id, 2, &format!("msg {i}"), Utc::now())
            .await
            .expect("seed message");
    }

    let client = reqwest::Client::new();
    let resp = client
        .get(api(addr, &format!("/chats/{chat_id}/messages"), 1, "tok-1"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let page: serde_json::Value = resp.json().await.expect("json body");
    let page = page.as_array().expect("array");
    assert_eq!(page.len(), 20);
    assert_eq!(page[19]["message"], "msg 44");

    // Page before the oldest id of the first page.
    let oldest = page[0]["id"].as_i64().expect("id");
    let resp = client
        .get(api(
            addr,
            &format!("/chats/{chat_id}/messages?before={oldest}"),
            1,
            "tok-1",
        ))
        .send()
        .await
        .expect("request");
    let older: serde_json::Value = resp.json().await.expect("json body");
    let older = older.as_array().expect("array");
    assert_eq!(older.len(), 20);
    assert!(older[19]["id"].as_i64().expect("id") < oldest);
}

#[tokio::test]
async fn history_of_a_foreign_chat_is_forbidden() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let foreign_chat = backend.store.seed_chat(&[2, 3]);

    let resp = reqwest::Client::new()
        .get(api(
            addr,
            &format!("/chats/{foreign_chat}/messages"),
            1,
            "tok-1",
        ))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(
        body["error"]["message"],
        "User is not a participant in this chat"
    );
}

// ---------------------------------------------------------------------------
// Sending over REST
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rest_send_persists_and_returns_the_stored_message() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let chat_id = backend.store.seed_chat(&[1, 2]);

    let resp = reqwest::Client::new()
        .post(api(addr, &format!("/chats/{chat_id}/messages"), 1, "tok-1"))
        .json(&serde_json::json!({ "message": "offline hello" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["chat_id"], chat_id);
    assert_eq!(body["sender_id"], 1);
    assert_eq!(body["message"], "offline hello");

    let stored = backend.store.messages_in(chat_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, body["id"].as_i64().expect("id"));
}

#[tokio::test]
async fn rest_send_rejects_an_empty_message() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let chat_id = backend.store.seed_chat(&[1, 2]);

    let resp = reqwest::Client::new()
        .post(api(addr, &format!("/chats/{chat_id}/messages"), 1, "tok-1"))
        .json(&serde_json::json!({ "message": "" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "message");
    assert_eq!(
        body["error"]["details"][0]["message"],
        "Message cannot be empty"
    );
    assert_eq!(backend.store.message_count(), 0);
}

// ---------------------------------------------------------------------------
// Read markers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mark_read_advances_the_read_marker() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");
    let chat_id = backend.store.seed_chat(&[1, 2]);
    let message = backend
        .store
        .insert_message(chat_id, 2, "unread", Utc::now())
        .await
        .expect("seed message");

    let resp = reqwest::Client::new()
        .post(api(addr, &format!("/chats/{chat_id}/read"), 1, "tok-1"))
        .json(&serde_json::json!({ "message_id": message.id }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert_eq!(backend.store.last_read(chat_id, 1), Some(message.id));
}

// ---------------------------------------------------------------------------
// Chat creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_chat_includes_the_caller_and_returns_the_id() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");

    let resp = reqwest::Client::new()
        .post(api(addr, "/chats", 1, "tok-1"))
        .json(&serde_json::json!({ "participants": [2, 2, 3] }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: serde_json::Value = resp.json().await.expect("json body");
    let chat_id = body["chat_id"].as_i64().expect("chat_id") as i32;

    for user_id in [1, 2, 3] {
        assert!(backend
            .store
            .is_participant(chat_id, user_id)
            .await
            .expect("participant check"));
    }
}

#[tokio::test]
async fn create_chat_with_no_other_participant_is_rejected() {
    let (addr, backend) = common::start_server().await;
    backend.credentials.grant(1, "tok-1");

    let resp = reqwest::Client::new()
        .post(api(addr, "/chats", 1, "tok-1"))
        .json(&serde_json::json!({ "participants": [1] }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

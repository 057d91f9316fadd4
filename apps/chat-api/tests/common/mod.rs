use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_api::gateway::registry::ChatRegistry;
use chat_api::store::memory::{MemoryChatStore, MemoryCredentialStore};
use chat_api::AppState;

/// Handles into the server's collaborators, for seeding and assertions.
pub struct TestBackend {
    pub store: Arc<MemoryChatStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub registry: Arc<ChatRegistry>,
}

/// Start a real TCP server on an ephemeral port, backed by the in-memory
/// stores. The server runs in the background for the rest of the test.
pub async fn start_server() -> (SocketAddr, TestBackend) {
    let store = Arc::new(MemoryChatStore::new());
    let credentials = Arc::new(MemoryCredentialStore::new());
    let registry = Arc::new(ChatRegistry::new());

    let state = AppState {
        store: store.clone(),
        credentials: credentials.clone(),
        registry: registry.clone(),
    };

    let app = chat_api::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (
        addr,
        TestBackend {
            store,
            credentials,
            registry,
        },
    )
}

/// Poll until `cond` holds or the deadline passes. Registry effects are
/// asynchronous relative to the client, so assertions on them need to wait.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use gateway::registry::ChatRegistry;
use store::{ChatStore, CredentialStore};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub registry: Arc<ChatRegistry>,
}

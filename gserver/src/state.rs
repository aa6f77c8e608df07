//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use gchat::{ChatSession, RoleRegistry};

use crate::auth::UserRegistry;
use crate::storage::BlobStore;

/// Read-only after startup; handlers share it behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub session: ChatSession,
    pub roles: RoleRegistry,
    pub users: UserRegistry,
    /// `None` when no storage endpoint is configured; citations then always 404.
    pub storage: Option<Arc<dyn BlobStore>>,
    /// `<resource endpoint>/<container>`, used to scope role filters by blob path.
    pub storage_base_url: String,
    /// Roles allowed to use the chat endpoints.
    pub chat_roles: Vec<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session", &self.session)
            .field("roles", &self.roles.len())
            .field("users", &self.users.len())
            .field("storage", &self.storage.is_some())
            .field("storage_base_url", &self.storage_base_url)
            .field("chat_roles", &self.chat_roles)
            .finish()
    }
}

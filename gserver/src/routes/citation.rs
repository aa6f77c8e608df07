//! Passthrough for documents referenced by citations.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::auth::AuthenticatedUser;
use crate::error::ServerError;
use crate::state::AppState;
use crate::storage::is_plain_blob_path;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/citation/{account}/{container}/{*blob}", get(get_citation))
}

/// `GET /api/citation/{account}/{container}/{*blob}`: raw document bytes.
///
/// 404 unless storage is configured, the account and container name it, the blob path has
/// no empty or dot segments, it lies under the caller role's path prefix and the blob exists.
pub async fn get_citation(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path((account, container, blob)): Path<(String, String, String)>,
) -> Result<Response, ServerError> {
    let not_found = || ServerError::NotFound("document not found".to_string());

    let store = state.storage.as_ref().ok_or_else(not_found)?;
    let blob = blob.trim_start_matches('/');
    if !is_plain_blob_path(blob) {
        return Err(not_found());
    }

    let role = state.roles.lookup(&user.role);
    if let Some(prefix) = role.blob_path_prefix() {
        if !blob.starts_with(prefix.trim_start_matches('/')) {
            return Err(not_found());
        }
    }

    if !store.has_full_path(&account, &container, blob).await? {
        return Err(not_found());
    }

    let document = store.download(blob).await?.ok_or_else(not_found)?;
    let content_type = document
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(([(header::CONTENT_TYPE, content_type)], document.content).into_response())
}

//! Unified gateway error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] and renders `{"success": false, "error": "..."}`.
//! Provider and storage failures are logged in full but only summarized to the caller.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use gchat::{ChatError, ChatErrorKind};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or wrong credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Authenticated, but the role may not use this endpoint.
    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            ServerError::Forbidden => (StatusCode::FORBIDDEN, "Unauthorized".to_owned()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::Chat(e) => match e.kind {
                ChatErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, e.message.clone()),
                ChatErrorKind::Provider => {
                    error!(error = %e, provider_error_kind = ?e.provider_kind, "chat provider error");
                    (StatusCode::BAD_GATEWAY, "chat provider request failed".to_owned())
                }
                ChatErrorKind::Configuration => {
                    error!(error = %e, "chat configuration error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_owned(),
                    )
                }
            },
            ServerError::Storage(e) => {
                error!(error = %e, "object storage error");
                (StatusCode::BAD_GATEWAY, "object storage request failed".to_owned())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };

        let mut response =
            (status, Json(json!({ "success": false, "error": client_message }))).into_response();
        if matches!(self, ServerError::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"groundchat\""),
            );
        }

        response
    }
}

//! Axum router construction.
//!
//! [`build`] assembles the application router:
//! - health route (no credentials)
//! - chat and streamed chat routes (Basic auth, chat roles only)
//! - citation passthrough (Basic auth)
//! - per-request trace-ID middleware and the `tower-http` trace layer

mod chat;
mod citation;
mod health;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::middleware::trace_middleware;
use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(chat::router())
        .merge(citation::router())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
}

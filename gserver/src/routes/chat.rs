//! Search-grounded chat routes.
//!
//! Both endpoints take `{"messages": [{"role", "content"}, ...]}`. The caller's role picks
//! the search filter for this request only; the shared session settings are never mutated.

use std::sync::Arc;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use futures_util::{Stream, StreamExt, stream};
use gchat::{ChatRequestBody, ChatTurn, NormalizedResponse, RequestContext, StreamItem};
use gcommon::TraceId;
use tracing::{debug, warn};

use crate::auth::AuthenticatedUser;
use crate::error::ServerError;
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
}

/// `POST /api/chat`: one normalized completion.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<NormalizedResponse>, ServerError> {
    user.require_role(&state.chat_roles)?;
    let turns = parse_turns(&body)?;
    let context = request_context(&state, &user, trace_id);
    debug!(username = %user.username, turns = turns.len(), "chat request");

    let response = state.session.chat_with(&context, &turns).await?;
    Ok(Json(response))
}

/// `POST /api/chat/stream`: newline-delimited JSON, one normalized chunk per line.
///
/// The first line is awaited before the response starts so a provider failure while
/// opening the stream still gets a proper error status. A later failure ends the body
/// abruptly.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Extension(trace_id): Extension<TraceId>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Response, ServerError> {
    user.require_role(&state.chat_roles)?;
    let turns = parse_turns(&body)?;
    let context = request_context(&state, &user, trace_id);
    debug!(username = %user.username, turns = turns.len(), "streamed chat request");

    let mut lines = Box::pin(ndjson_lines(state, context, turns));
    let first = match lines.next().await {
        Some(Ok(line)) => Some(Ok::<_, ServerError>(line)),
        Some(Err(error)) => return Err(error),
        None => None,
    };

    let body = Body::from_stream(stream::iter(first).chain(lines));
    Ok(([(header::CONTENT_TYPE, NDJSON)], body).into_response())
}

fn parse_turns(body: &[u8]) -> Result<Vec<ChatTurn>, ServerError> {
    let body: ChatRequestBody = serde_json::from_slice(body)
        .map_err(|err| ServerError::BadRequest(format!("invalid request body: {err}")))?;
    Ok(body.into_turns()?)
}

fn request_context(state: &AppState, user: &AuthenticatedUser, trace_id: TraceId) -> RequestContext {
    state
        .session
        .request_context()
        .with_role_filter(state.roles.lookup(&user.role), &state.storage_base_url)
        .with_trace_id(trace_id)
}

/// Owns everything the provider stream borrows so the body can outlive the handler.
fn ndjson_lines(
    state: Arc<AppState>,
    context: RequestContext,
    turns: Vec<ChatTurn>,
) -> impl Stream<Item = Result<Bytes, ServerError>> + Send + 'static {
    stream! {
        let mut items = match state.session.stream_chat_with(&context, &turns, "json").await {
            Ok(items) => items,
            Err(error) => {
                yield Err(ServerError::from(error));
                return;
            }
        };

        while let Some(item) = items.next().await {
            match item {
                Ok(StreamItem::Line(line)) => yield Ok(Bytes::from(line)),
                Ok(StreamItem::Object(response)) => match serde_json::to_vec(&response) {
                    Ok(mut line) => {
                        line.push(b'\n');
                        yield Ok(Bytes::from(line));
                    }
                    Err(err) => {
                        yield Err(ServerError::Internal(format!("failed to encode chunk: {err}")));
                        return;
                    }
                },
                Err(error) => {
                    warn!(error = %error, trace_id = ?context.trace_id(), "chat stream failed mid-response");
                    yield Err(ServerError::from(error));
                    return;
                }
            }
        }
    }
}

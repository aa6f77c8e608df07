//! Per-request trace-ID middleware.
//!
//! Reuses an inbound `x-trace-id` when it is a valid UUID, otherwise mints one. The id is
//! placed in the request extensions as a [`TraceId`], echoed on the response, and recorded
//! on the request span. Bodies pass through untouched so streamed responses stay streamed.

use std::time::Instant;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use gcommon::TraceId;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

pub async fn trace_middleware(mut req: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
        .to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("request started");
        req.extensions_mut().insert(TraceId::new(trace_id.clone()));

        let mut response = next.run(req).await;

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "response headers sent"
        );

        response
    }
    .instrument(span)
    .await
}

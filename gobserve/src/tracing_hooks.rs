//! Tracing-based hooks for chat dispatch.
//!
//! ```rust
//! use gchat::ChatHooks;
//! use gobserve::TracingChatHooks;
//!
//! fn accepts_chat_hooks(_hooks: &dyn ChatHooks) {}
//!
//! accepts_chat_hooks(&TracingChatHooks);
//! ```

use std::time::Duration;

use gchat::{ChatError, ChatHooks, ChatOperation};
use gcommon::TraceId;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChatHooks;

impl ChatHooks for TracingChatHooks {
    fn on_dispatch_start(&self, operation: ChatOperation, trace_id: Option<&TraceId>) {
        tracing::info!(
            phase = "chat",
            event = "dispatch_start",
            operation = operation.as_str(),
            trace_id = trace_id.map(|id| id.as_str())
        );
    }

    fn on_chunk(&self, trace_id: Option<&TraceId>, index: usize) {
        tracing::trace!(
            phase = "chat",
            event = "chunk",
            trace_id = trace_id.map(|id| id.as_str()),
            index
        );
    }

    fn on_success(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        chunks: usize,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "chat",
            event = "success",
            operation = operation.as_str(),
            trace_id = trace_id.map(|id| id.as_str()),
            chunks,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_failure(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        error: &ChatError,
        elapsed: Duration,
    ) {
        tracing::error!(
            phase = "chat",
            event = "failure",
            operation = operation.as_str(),
            trace_id = trace_id.map(|id| id.as_str()),
            elapsed_ms = elapsed.as_millis() as u64,
            error_kind = ?error.kind,
            provider_error_kind = ?error.provider_kind,
            error = %error
        );
    }
}

//! Metrics-based hooks for chat dispatch.

use std::time::Duration;

use gchat::{ChatError, ChatHooks, ChatOperation};
use gcommon::TraceId;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsChatHooks;

impl ChatHooks for MetricsChatHooks {
    fn on_dispatch_start(&self, operation: ChatOperation, _trace_id: Option<&TraceId>) {
        metrics::counter!(
            "groundchat_chat_dispatch_start_total",
            "operation" => operation.as_str()
        )
        .increment(1);
    }

    fn on_chunk(&self, _trace_id: Option<&TraceId>, _index: usize) {
        metrics::counter!("groundchat_chat_chunks_total").increment(1);
    }

    fn on_success(
        &self,
        operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        chunks: usize,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "groundchat_chat_success_total",
            "operation" => operation.as_str()
        )
        .increment(1);
        metrics::histogram!(
            "groundchat_chat_duration_seconds",
            "operation" => operation.as_str()
        )
        .record(elapsed.as_secs_f64());
        metrics::histogram!(
            "groundchat_chat_chunks_per_success",
            "operation" => operation.as_str()
        )
        .record(chunks as f64);
    }

    fn on_failure(
        &self,
        operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        error: &ChatError,
        elapsed: Duration,
    ) {
        metrics::counter!(
            "groundchat_chat_failure_total",
            "operation" => operation.as_str(),
            "error_kind" => format!("{:?}", error.kind)
        )
        .increment(1);
        metrics::histogram!(
            "groundchat_chat_failure_duration_seconds",
            "operation" => operation.as_str()
        )
        .record(elapsed.as_secs_f64());
    }
}

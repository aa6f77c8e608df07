use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use gchat::{ChatError, ChatHooks, ChatOperation};
use gcommon::TraceId;

/// Runs the inner hooks with panics contained, so a faulty hook never aborts a chat.
pub struct SafeChatHooks<H> {
    inner: H,
}

impl<H> SafeChatHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ChatHooks for SafeChatHooks<H>
where
    H: ChatHooks,
{
    fn on_dispatch_start(&self, operation: ChatOperation, trace_id: Option<&TraceId>) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_dispatch_start(operation, trace_id)
        }));
    }

    fn on_chunk(&self, trace_id: Option<&TraceId>, index: usize) {
        let _ = catch_unwind(AssertUnwindSafe(|| self.inner.on_chunk(trace_id, index)));
    }

    fn on_success(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        chunks: usize,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(operation, trace_id, chunks, elapsed)
        }));
    }

    fn on_failure(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        error: &ChatError,
        elapsed: Duration,
    ) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_failure(operation, trace_id, error, elapsed)
        }));
    }
}

use std::sync::Arc;
use std::time::Duration;

use gchat::{ChatError, ChatHooks, ChatOperation};
use gcommon::TraceId;

/// Forwards every callback to each registered hook, in registration order.
#[derive(Clone, Default)]
pub struct FanoutChatHooks {
    hooks: Vec<Arc<dyn ChatHooks>>,
}

impl FanoutChatHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hooks: impl ChatHooks + 'static) -> Self {
        self.hooks.push(Arc::new(hooks));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ChatHooks for FanoutChatHooks {
    fn on_dispatch_start(&self, operation: ChatOperation, trace_id: Option<&TraceId>) {
        for hook in &self.hooks {
            hook.on_dispatch_start(operation, trace_id);
        }
    }

    fn on_chunk(&self, trace_id: Option<&TraceId>, index: usize) {
        for hook in &self.hooks {
            hook.on_chunk(trace_id, index);
        }
    }

    fn on_success(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        chunks: usize,
        elapsed: Duration,
    ) {
        for hook in &self.hooks {
            hook.on_success(operation, trace_id, chunks, elapsed);
        }
    }

    fn on_failure(
        &self,
        operation: ChatOperation,
        trace_id: Option<&TraceId>,
        error: &ChatError,
        elapsed: Duration,
    ) {
        for hook in &self.hooks {
            hook.on_failure(operation, trace_id, error, elapsed);
        }
    }
}

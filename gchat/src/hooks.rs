//! Observation points around provider dispatch.

use std::time::Duration;

use gcommon::TraceId;

use crate::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatOperation {
    Chat,
    StreamChat,
}

impl ChatOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::StreamChat => "stream_chat",
        }
    }
}

pub trait ChatHooks: Send + Sync {
    fn on_dispatch_start(&self, _operation: ChatOperation, _trace_id: Option<&TraceId>) {}

    fn on_chunk(&self, _trace_id: Option<&TraceId>, _index: usize) {}

    fn on_success(
        &self,
        _operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        _chunks: usize,
        _elapsed: Duration,
    ) {
    }

    fn on_failure(
        &self,
        _operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        _error: &ChatError,
        _elapsed: Duration,
    ) {
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChatHooks;

impl ChatHooks for NoopChatHooks {}

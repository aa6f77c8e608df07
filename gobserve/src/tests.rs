use std::sync::{Arc, Mutex};
use std::time::Duration;

use gchat::{ChatError, ChatHooks, ChatOperation};
use gcommon::TraceId;

use crate::{FanoutChatHooks, MetricsChatHooks, SafeChatHooks, TracingChatHooks};

fn exercise(hooks: &dyn ChatHooks) {
    let trace_id = TraceId::from("trace-1");
    let error = ChatError::provider("deployment offline");

    hooks.on_dispatch_start(ChatOperation::Chat, Some(&trace_id));
    hooks.on_chunk(Some(&trace_id), 0);
    hooks.on_success(
        ChatOperation::StreamChat,
        Some(&trace_id),
        3,
        Duration::from_millis(40),
    );
    hooks.on_failure(ChatOperation::Chat, None, &error, Duration::from_millis(5));
}

#[test]
fn tracing_hooks_smoke_test_all_callbacks() {
    exercise(&TracingChatHooks);
}

#[test]
fn metrics_hooks_smoke_test_all_callbacks() {
    exercise(&MetricsChatHooks);
}

#[derive(Default, Clone)]
struct RecordingChatHooks {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl ChatHooks for RecordingChatHooks {
    fn on_dispatch_start(&self, _operation: ChatOperation, _trace_id: Option<&TraceId>) {
        self.events.lock().expect("events lock").push("dispatch_start");
    }

    fn on_chunk(&self, _trace_id: Option<&TraceId>, _index: usize) {
        self.events.lock().expect("events lock").push("chunk");
    }

    fn on_success(
        &self,
        _operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        _chunks: usize,
        _elapsed: Duration,
    ) {
        self.events.lock().expect("events lock").push("success");
    }

    fn on_failure(
        &self,
        _operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        _error: &ChatError,
        _elapsed: Duration,
    ) {
        self.events.lock().expect("events lock").push("failure");
    }
}

struct PanickingChatHooks;

impl ChatHooks for PanickingChatHooks {
    fn on_dispatch_start(&self, _operation: ChatOperation, _trace_id: Option<&TraceId>) {
        panic!("dispatch_start panic");
    }

    fn on_failure(
        &self,
        _operation: ChatOperation,
        _trace_id: Option<&TraceId>,
        _error: &ChatError,
        _elapsed: Duration,
    ) {
        panic!("failure panic");
    }
}

#[test]
fn safe_hooks_forward_all_callbacks() {
    let recording = RecordingChatHooks::default();
    let hooks = SafeChatHooks::new(recording.clone());

    exercise(&hooks);

    assert_eq!(
        *recording.events.lock().expect("events lock"),
        vec!["dispatch_start", "chunk", "success", "failure"]
    );
}

#[test]
fn safe_hooks_contain_panics() {
    exercise(&SafeChatHooks::new(PanickingChatHooks));
}

#[test]
fn fanout_reaches_every_hook_in_order() {
    let first = RecordingChatHooks::default();
    let second = RecordingChatHooks::default();
    let hooks = FanoutChatHooks::new()
        .with(first.clone())
        .with(SafeChatHooks::new(PanickingChatHooks))
        .with(second.clone());

    exercise(&hooks);

    assert_eq!(hooks.len(), 3);
    assert_eq!(first.events.lock().expect("events lock").len(), 4);
    assert_eq!(
        *second.events.lock().expect("events lock"),
        vec!["dispatch_start", "chunk", "success", "failure"]
    );
}

//! Chat sessions: mutable prompt settings plus single-shot and streamed chat.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use gprovider::ChatDispatch;

use crate::hooks::{ChatHooks, ChatOperation, NoopChatHooks};
use crate::normalize::{NormalizedResponse, normalize};
use crate::request::{RequestContext, SearchConfig, build_request};
use crate::role::{Role, search_filter};
use crate::{ChatError, ChatTurn, OutputFormat};

pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are an helpful assistant that helps finding information from documents.";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

const FEW_SHOT_HEADER: &str = "\n\nFew-shot examples:\n";

/// Prompt settings owned by one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    system_message: String,
    few_shot_examples: Vec<String>,
    temperature: f32,
    search_filter: String,
    final_system_message: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            few_shot_examples: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
            search_filter: String::new(),
            final_system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn few_shot_examples(&self) -> &[String] {
        &self.few_shot_examples
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn search_filter(&self) -> &str {
        &self.search_filter
    }

    /// System message followed by the few-shot block, when there is one.
    pub fn final_system_message(&self) -> &str {
        &self.final_system_message
    }

    fn refresh_final_system_message(&mut self) {
        let mut message = self.system_message.clone();
        if !self.few_shot_examples.is_empty() {
            message.push_str(FEW_SHOT_HEADER);
            message.push_str(&self.few_shot_examples.join("\n"));
        }

        self.final_system_message = message;
    }
}

/// One item of a streamed chat, shaped by the requested output format.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Object(NormalizedResponse),
    /// One serialized JSON document terminated by `\n`.
    Line(String),
}

pub type ChatStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamItem, ChatError>> + Send + 'a>>;

#[derive(Clone)]
pub struct ChatSession {
    search: SearchConfig,
    config: SessionConfig,
    dispatch: Arc<dyn ChatDispatch>,
    hooks: Arc<dyn ChatHooks>,
}

impl ChatSession {
    pub fn new(search: SearchConfig, dispatch: Arc<dyn ChatDispatch>) -> Self {
        Self {
            search,
            config: SessionConfig::default(),
            dispatch,
            hooks: Arc::new(NoopChatHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ChatHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_system_message(&mut self, message: impl Into<String>) {
        self.config.system_message = message.into();
        self.config.refresh_final_system_message();
    }

    pub fn system_message(&self) -> &str {
        self.config.system_message()
    }

    pub fn set_few_shot_examples<I, S>(&mut self, examples: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.few_shot_examples = examples.into_iter().map(Into::into).collect();
        self.config.refresh_final_system_message();
    }

    pub fn few_shot_examples(&self) -> &[String] {
        self.config.few_shot_examples()
    }

    pub fn final_system_message(&self) -> &str {
        self.config.final_system_message()
    }

    /// Accepts values in `[0, 2]`; anything else keeps the current temperature.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ChatError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ChatError::invalid_argument(format!(
                "temperature must be between 0 and 2, got {temperature}"
            )));
        }

        self.config.temperature = temperature;
        Ok(())
    }

    pub fn temperature(&self) -> f32 {
        self.config.temperature()
    }

    pub fn set_search_filter(&mut self, filter: impl Into<String>) {
        self.config.search_filter = filter.into();
    }

    pub fn set_search_filter_from_role(&mut self, role: &Role, storage_base_url: &str) {
        self.config.search_filter = search_filter(role, storage_base_url);
    }

    pub fn search_filter(&self) -> &str {
        self.config.search_filter()
    }

    /// Snapshot of the current settings for one request.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(
            self.config.final_system_message(),
            self.config.temperature(),
            self.config.search_filter(),
        )
    }

    pub async fn chat(&self, turns: &[ChatTurn]) -> Result<NormalizedResponse, ChatError> {
        self.chat_with(&self.request_context(), turns).await
    }

    pub async fn chat_with(
        &self,
        context: &RequestContext,
        turns: &[ChatTurn],
    ) -> Result<NormalizedResponse, ChatError> {
        let started = Instant::now();
        let trace_id = context.trace_id();
        self.hooks.on_dispatch_start(ChatOperation::Chat, trace_id);

        let request = build_request(&self.search, context, turns, false);
        match self.dispatch.complete(request).await {
            Ok(completion) => {
                let normalized = normalize(completion.into());
                self.hooks
                    .on_success(ChatOperation::Chat, trace_id, 1, started.elapsed());
                Ok(normalized)
            }
            Err(error) => {
                let error = ChatError::from(error);
                self.hooks
                    .on_failure(ChatOperation::Chat, trace_id, &error, started.elapsed());
                Err(error)
            }
        }
    }

    pub async fn stream_chat<'a>(
        &'a self,
        turns: &[ChatTurn],
        output_format: &str,
    ) -> Result<ChatStream<'a>, ChatError> {
        self.stream_chat_with(&self.request_context(), turns, output_format)
            .await
    }

    /// Opens a streamed completion and normalizes chunks lazily, one per poll.
    ///
    /// An unknown `output_format` fails before the provider is contacted. A provider error
    /// after the stream opened is yielded once and ends the stream.
    pub async fn stream_chat_with<'a>(
        &'a self,
        context: &RequestContext,
        turns: &[ChatTurn],
        output_format: &str,
    ) -> Result<ChatStream<'a>, ChatError> {
        let format: OutputFormat = output_format.parse()?;

        let started = Instant::now();
        let trace_id = context.trace_id().cloned();
        self.hooks
            .on_dispatch_start(ChatOperation::StreamChat, trace_id.as_ref());

        let request = build_request(&self.search, context, turns, true);
        let mut chunks = match self.dispatch.stream(request).await {
            Ok(chunks) => chunks,
            Err(error) => {
                let error = ChatError::from(error);
                self.hooks.on_failure(
                    ChatOperation::StreamChat,
                    trace_id.as_ref(),
                    &error,
                    started.elapsed(),
                );
                return Err(error);
            }
        };

        let hooks = &self.hooks;
        let items = stream! {
            let mut emitted = 0_usize;

            while let Some(chunk) = chunks.next().await {
                let item = chunk
                    .map_err(ChatError::from)
                    .and_then(|chunk| into_item(normalize(chunk.into()), format));

                match item {
                    Ok(item) => {
                        hooks.on_chunk(trace_id.as_ref(), emitted);
                        emitted += 1;
                        yield Ok(item);
                    }
                    Err(error) => {
                        hooks.on_failure(
                            ChatOperation::StreamChat,
                            trace_id.as_ref(),
                            &error,
                            started.elapsed(),
                        );
                        yield Err(error);
                        return;
                    }
                }
            }

            hooks.on_success(
                ChatOperation::StreamChat,
                trace_id.as_ref(),
                emitted,
                started.elapsed(),
            );
        };

        Ok(Box::pin(items))
    }
}

fn into_item(response: NormalizedResponse, format: OutputFormat) -> Result<StreamItem, ChatError> {
    match format {
        OutputFormat::Dict => Ok(StreamItem::Object(response)),
        OutputFormat::Json => {
            let mut line = serde_json::to_string(&response).map_err(|err| {
                ChatError::provider(format!("failed to serialize normalized chunk: {err}"))
            })?;
            line.push('\n');
            Ok(StreamItem::Line(line))
        }
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("search", &self.search)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::StreamExt;
    use gprovider::{
        ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChunkChoice, ChunkStream,
        CompletionChoice, ProviderError, ProviderFuture, ReplyMessage, VecChunkStream,
    };

    use super::*;
    use crate::ChatErrorKind;

    #[derive(Default)]
    struct FakeDispatch {
        requests: Mutex<Vec<ChatCompletionRequest>>,
        stream_calls: AtomicUsize,
        chunks: Mutex<Vec<Result<ChatCompletionChunk, ProviderError>>>,
        fail_complete: bool,
    }

    impl FakeDispatch {
        fn with_chunks(chunks: Vec<Result<ChatCompletionChunk, ProviderError>>) -> Self {
            Self {
                chunks: Mutex::new(chunks),
                ..Self::default()
            }
        }
    }

    impl ChatDispatch for FakeDispatch {
        fn complete<'a>(
            &'a self,
            request: ChatCompletionRequest,
        ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>> {
            Box::pin(async move {
                self.requests.lock().expect("requests lock").push(request);
                if self.fail_complete {
                    return Err(ProviderError::unavailable("deployment offline"));
                }

                Ok(ChatCompletion {
                    id: "cmpl-1".to_string(),
                    object: Some("chat.completion".to_string()),
                    created: 10,
                    model: "gpt-4o".to_string(),
                    system_fingerprint: None,
                    choices: vec![CompletionChoice {
                        index: 0,
                        finish_reason: Some("stop".to_string()),
                        message: ReplyMessage {
                            role: Some("assistant".to_string()),
                            content: Some("answer".to_string()),
                            ..ReplyMessage::default()
                        },
                    }],
                    usage: None,
                })
            })
        }

        fn stream<'a>(
            &'a self,
            request: ChatCompletionRequest,
        ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>> {
            Box::pin(async move {
                self.stream_calls.fetch_add(1, Ordering::SeqCst);
                self.requests.lock().expect("requests lock").push(request);
                let chunks = std::mem::take(&mut *self.chunks.lock().expect("chunks lock"));
                Ok(Box::pin(VecChunkStream::new(chunks)) as ChunkStream<'a>)
            })
        }
    }

    fn chunk(id: &str, content: &str) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: id.to_string(),
            object: Some("chat.completion.chunk".to_string()),
            created: 11,
            model: "gpt-4o".to_string(),
            system_fingerprint: None,
            choices: vec![ChunkChoice {
                index: 0,
                finish_reason: None,
                end_turn: None,
                delta: ReplyMessage {
                    content: Some(content.to_string()),
                    ..ReplyMessage::default()
                },
            }],
            usage: None,
        }
    }

    fn session(dispatch: Arc<FakeDispatch>) -> ChatSession {
        let search = SearchConfig::new("https://search.example.net").expect("valid endpoint");
        ChatSession::new(search, dispatch)
    }

    #[test]
    fn defaults_match_documented_values() {
        let session = session(Arc::new(FakeDispatch::default()));

        assert_eq!(session.system_message(), DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(session.final_system_message(), DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(session.temperature(), 0.1);
        assert_eq!(session.search_filter(), "");
    }

    #[test]
    fn few_shot_examples_are_appended_in_order() {
        let mut session = session(Arc::new(FakeDispatch::default()));
        session.set_system_message("Base.");

        session.set_few_shot_examples(["Q: a\nA: b", "Q: c\nA: d"]);
        assert_eq!(
            session.final_system_message(),
            "Base.\n\nFew-shot examples:\nQ: a\nA: b\nQ: c\nA: d"
        );

        session.set_system_message("Other.");
        assert!(session.final_system_message().starts_with("Other.\n\nFew-shot"));

        session.set_few_shot_examples(Vec::<String>::new());
        assert_eq!(session.final_system_message(), "Other.");
    }

    #[test]
    fn temperature_outside_range_is_rejected_and_prior_value_kept() {
        let mut session = session(Arc::new(FakeDispatch::default()));

        for valid in [0.0, 0.7, 2.0] {
            session.set_temperature(valid).expect("valid temperature");
            assert_eq!(session.temperature(), valid);
        }

        for invalid in [-0.01, 2.01, f32::NAN] {
            let error = session
                .set_temperature(invalid)
                .expect_err("out of range temperature");
            assert_eq!(error.kind, ChatErrorKind::InvalidArgument);
            assert_eq!(session.temperature(), 2.0);
        }
    }

    #[test]
    fn role_filter_is_stored_on_the_session() {
        let mut session = session(Arc::new(FakeDispatch::default()));
        let role = Role::new("ops", "Ops").with_filter("team eq 'ops'");

        session.set_search_filter_from_role(&role, "");

        assert_eq!(session.search_filter(), "team eq 'ops'");
        assert_eq!(session.request_context().filter(), "team eq 'ops'");
    }

    #[tokio::test]
    async fn chat_sends_non_streamed_request_and_normalizes_reply() {
        let dispatch = Arc::new(FakeDispatch::default());
        let session = session(dispatch.clone());

        let response = session
            .chat(&[ChatTurn::user("where?")])
            .await
            .expect("chat should succeed");

        assert_eq!(response.id, "cmpl-1");
        assert!(!response.choices[0].payload.is_delta());

        let requests = dispatch.requests.lock().expect("requests lock");
        assert!(!requests[0].stream);
        assert_eq!(requests[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn chat_propagates_provider_failure() {
        let dispatch = Arc::new(FakeDispatch {
            fail_complete: true,
            ..FakeDispatch::default()
        });

        let error = session(dispatch)
            .chat(&[ChatTurn::user("x")])
            .await
            .expect_err("provider failure should surface");

        assert_eq!(error.kind, ChatErrorKind::Provider);
    }

    #[tokio::test]
    async fn stream_yields_one_normalized_item_per_chunk_in_order() {
        let dispatch = Arc::new(FakeDispatch::with_chunks(vec![
            Ok(chunk("c1", "a")),
            Ok(chunk("c2", "b")),
            Ok(chunk("c3", "c")),
        ]));
        let session = session(dispatch.clone());

        let items: Vec<_> = session
            .stream_chat(&[ChatTurn::user("x")], "dict")
            .await
            .expect("stream should open")
            .collect()
            .await;

        let ids: Vec<String> = items
            .into_iter()
            .map(|item| match item.expect("item should be ok") {
                StreamItem::Object(response) => response.id,
                StreamItem::Line(line) => panic!("unexpected line {line}"),
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert!(dispatch.requests.lock().expect("requests lock")[0].stream);
    }

    #[tokio::test]
    async fn json_format_yields_newline_terminated_documents() {
        let dispatch = Arc::new(FakeDispatch::with_chunks(vec![Ok(chunk("c1", "hi"))]));
        let session = session(dispatch);

        let mut stream = session
            .stream_chat(&[ChatTurn::user("x")], "json")
            .await
            .expect("stream should open");

        let Some(Ok(StreamItem::Line(line))) = stream.next().await else {
            panic!("expected one json line");
        };
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: NormalizedResponse = serde_json::from_str(line.trim_end()).expect("valid json");
        assert_eq!(parsed.choices[0].payload.fields().content.as_deref(), Some("hi"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unknown_output_format_fails_before_dispatch() {
        let dispatch = Arc::new(FakeDispatch::with_chunks(vec![Ok(chunk("c1", "a"))]));
        let session = session(dispatch.clone());

        let error = match session.stream_chat(&[ChatTurn::user("x")], "xml").await {
            Ok(_) => panic!("xml is not a supported format"),
            Err(error) => error,
        };

        assert_eq!(error.kind, ChatErrorKind::InvalidArgument);
        assert_eq!(dispatch.stream_calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatch.chunks.lock().expect("chunks lock").len(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_truncates_after_emitted_chunks() {
        let dispatch = Arc::new(FakeDispatch::with_chunks(vec![
            Ok(chunk("c1", "a")),
            Err(ProviderError::transport("connection reset")),
            Ok(chunk("c3", "never")),
        ]));
        let session = session(dispatch);

        let items: Vec<_> = session
            .stream_chat(&[ChatTurn::user("x")], "dict")
            .await
            .expect("stream should open")
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let error = items[1].as_ref().expect_err("second item is the failure");
        assert_eq!(error.kind, ChatErrorKind::Provider);
    }

    #[tokio::test]
    async fn request_scoped_filter_does_not_touch_session_state() {
        let dispatch = Arc::new(FakeDispatch::default());
        let session = session(dispatch.clone());
        let role = Role::new("hr", "HR").with_filter("dept eq 'hr'");

        let context = session.request_context().with_role_filter(&role, "");
        session
            .chat_with(&context, &[ChatTurn::user("x")])
            .await
            .expect("chat should succeed");
        session
            .chat(&[ChatTurn::user("y")])
            .await
            .expect("chat should succeed");

        let requests = dispatch.requests.lock().expect("requests lock");
        let filters: Vec<Option<String>> = requests
            .iter()
            .map(|request| {
                let gprovider::DataSource::AzureSearch(parameters) = &request.data_sources[0];
                parameters.filter.clone()
            })
            .collect();
        assert_eq!(filters, vec![Some("dept eq 'hr'".to_string()), None]);
        assert_eq!(session.search_filter(), "");
    }
}

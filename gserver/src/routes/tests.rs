use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gchat::{ChatSession, NormalizedResponse, RoleRegistry, SearchConfig};
use gcommon::BoxFuture;
use gprovider::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatDispatch, ChunkStream,
    DataSource, ProviderError, ProviderFuture, VecChunkStream,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::build;
use crate::auth::{User, UserRegistry};
use crate::state::AppState;
use crate::storage::{Blob, BlobStore, StorageError};

const STORAGE_BASE: &str = "https://acct.blob.core.windows.net/documents";

#[derive(Debug, Default)]
struct FakeDispatch {
    requests: Mutex<Vec<ChatCompletionRequest>>,
    fail_open: bool,
}

impl FakeDispatch {
    fn filters(&self) -> Vec<Option<String>> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|request| match &request.data_sources[0] {
                DataSource::AzureSearch(parameters) => parameters.filter.clone(),
            })
            .collect()
    }
}

fn completion() -> Result<ChatCompletion, ProviderError> {
    Ok(serde_json::from_value(json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_718_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": "See [doc1].", "end_turn": true}
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
    }))?)
}

fn chunk(index: usize, content: &str) -> Result<ChatCompletionChunk, ProviderError> {
    Ok(serde_json::from_value(json!({
        "id": format!("chunk-{index}"),
        "object": "chat.completion.chunk",
        "created": 1_718_000_001,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": content}, "end_turn": false}]
    }))?)
}

impl ChatDispatch for FakeDispatch {
    fn complete<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChatCompletion, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            completion()
        })
    }

    fn stream<'a>(
        &'a self,
        request: ChatCompletionRequest,
    ) -> ProviderFuture<'a, Result<ChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            self.requests.lock().expect("requests lock").push(request);
            if self.fail_open {
                return Err(ProviderError::unavailable("deployment is overloaded"));
            }

            let chunks = vec![chunk(0, "Hello"), chunk(1, " there")];
            Ok(Box::pin(VecChunkStream::new(chunks)) as ChunkStream<'a>)
        })
    }
}

#[derive(Debug, Default)]
struct FakeBlobStore {
    blobs: HashMap<String, Blob>,
    requested: Mutex<Vec<String>>,
}

impl FakeBlobStore {
    fn record(&self, path: &str) {
        self.requested
            .lock()
            .expect("store mutex poisoned")
            .push(path.to_string());
    }
}

impl BlobStore for FakeBlobStore {
    fn account_name(&self) -> &str {
        "acct"
    }

    fn container(&self) -> &str {
        "documents"
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.record(path);
            Ok(self.blobs.contains_key(path))
        })
    }

    fn download<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>> {
        Box::pin(async move {
            self.record(path);
            Ok(self.blobs.get(path).cloned())
        })
    }
}

fn app_with(dispatch: Arc<FakeDispatch>, storage: Option<Arc<dyn BlobStore>>) -> Router {
    let roles = RoleRegistry::from_json(
        r#"[
            {"role": "admin", "description": "Administrators", "filter": "department eq 'it'"},
            {"role": "hr", "description": "HR", "blobPathStartsWith": "/hr/"}
        ]"#,
    )
    .expect("roles should parse");
    let users = UserRegistry::from_users(
        [
            User::new("alice", "wonderland", "admin"),
            User::new("bob", "builder", "user"),
            User::new("hank", "hill", "hr"),
        ],
        &roles,
    );
    let search = SearchConfig::new("https://search.example.net").expect("endpoint");

    build(Arc::new(AppState {
        session: ChatSession::new(search, dispatch),
        roles,
        users,
        storage,
        storage_base_url: STORAGE_BASE.to_string(),
        chat_roles: vec!["admin".to_string(), "user".to_string()],
    }))
}

fn documents() -> Arc<FakeBlobStore> {
    let mut blobs = HashMap::new();
    blobs.insert(
        "hr/travel policy.pdf".to_string(),
        Blob {
            content: Bytes::from_static(b"%PDF-1.7"),
            content_type: Some("application/pdf".to_string()),
        },
    );
    blobs.insert(
        "finance/q1.pdf".to_string(),
        Blob {
            content: Bytes::from_static(b"%PDF-1.4"),
            content_type: None,
        },
    );

    Arc::new(FakeBlobStore {
        blobs,
        ..FakeBlobStore::default()
    })
}

fn app(dispatch: Arc<FakeDispatch>) -> Router {
    app_with(dispatch, Some(documents()))
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn chat_request(path: &str, auth: Option<String>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn get_request(path: &str, auth: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).expect("request should build")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    (status, headers, body)
}

fn hello() -> Value {
    json!({"messages": [{"role": "user", "content": "hello"}]})
}

#[tokio::test]
async fn health_needs_no_credentials_and_echoes_trace_id() {
    let trace = "6f2c7a4e-3a8b-4d5e-9f1a-2b3c4d5e6f70";
    let request = Request::builder()
        .uri("/health")
        .header("x-trace-id", trace)
        .body(Body::empty())
        .expect("request should build");

    let (status, headers, body) = send(app(Arc::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-trace-id"], trace);
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn invalid_trace_header_is_replaced() {
    let request = Request::builder()
        .uri("/health")
        .header("x-trace-id", "not-a-uuid")
        .body(Body::empty())
        .expect("request should build");

    let (_, headers, _) = send(app(Arc::default()), request).await;

    let trace = headers["x-trace-id"].to_str().expect("ascii header");
    assert_ne!(trace, "not-a-uuid");
    assert!(uuid::Uuid::parse_str(trace).is_ok());
}

#[tokio::test]
async fn chat_without_credentials_is_unauthorized() {
    let dispatch = Arc::new(FakeDispatch::default());
    let (status, headers, body) =
        send(app(dispatch.clone()), chat_request("/api/chat", None, hello())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.contains_key(header::WWW_AUTHENTICATE));
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body, json!({"success": false, "error": "Unauthorized"}));
    assert!(dispatch.filters().is_empty());
}

#[tokio::test]
async fn chat_with_wrong_password_is_unauthorized() {
    let request = chat_request("/api/chat", Some(basic("alice", "looking-glass")), hello());
    let (status, _, _) = send(app(Arc::default()), request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_from_role_outside_allow_list_is_forbidden() {
    let dispatch = Arc::new(FakeDispatch::default());
    let request = chat_request("/api/chat", Some(basic("hank", "hill")), hello());

    let (status, _, body) = send(app(dispatch.clone()), request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body, json!({"success": false, "error": "Unauthorized"}));
    assert!(dispatch.filters().is_empty());
}

#[tokio::test]
async fn chat_returns_normalized_response_with_role_filter() {
    let dispatch = Arc::new(FakeDispatch::default());
    let request = chat_request("/api/chat", Some(basic("Alice", "wonderland")), hello());

    let (status, _, body) = send(app(dispatch.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    let response: NormalizedResponse = serde_json::from_slice(&body).expect("normalized body");
    assert_eq!(response.id, "chatcmpl-1");
    assert_eq!(response.usage.total_tokens, Some(13));
    assert_eq!(
        response.choices[0].payload.fields().content.as_deref(),
        Some("See [doc1].")
    );
    assert_eq!(dispatch.filters(), vec![Some("department eq 'it'".to_string())]);
}

#[tokio::test]
async fn filters_differ_per_caller_on_a_shared_session() {
    let dispatch = Arc::new(FakeDispatch::default());
    let app = app(dispatch.clone());

    send(
        app.clone(),
        chat_request("/api/chat", Some(basic("alice", "wonderland")), hello()),
    )
    .await;
    send(
        app,
        chat_request("/api/chat", Some(basic("bob", "builder")), hello()),
    )
    .await;

    assert_eq!(
        dispatch.filters(),
        vec![Some("department eq 'it'".to_string()), None]
    );
}

#[tokio::test]
async fn malformed_body_and_bad_roles_are_bad_requests() {
    let auth = || Some(basic("bob", "builder"));
    let dispatch = Arc::new(FakeDispatch::default());

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::AUTHORIZATION, basic("bob", "builder"))
        .body(Body::from("{not json"))
        .expect("request should build");
    let (status, _, body) = send(app(dispatch.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["success"], false);

    let request = chat_request(
        "/api/chat",
        auth(),
        json!({"messages": [{"role": "tool", "content": "hi"}]}),
    );
    let (status, _, _) = send(app(dispatch.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(dispatch.filters().is_empty());
}

#[tokio::test]
async fn stream_returns_one_normalized_chunk_per_line() {
    let dispatch = Arc::new(FakeDispatch::default());
    let request = chat_request("/api/chat/stream", Some(basic("bob", "builder")), hello());

    let (status, headers, body) = send(app(dispatch), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/x-ndjson");
    let body = String::from_utf8(body.to_vec()).expect("utf-8 body");
    assert!(body.ends_with('\n'));

    let contents: Vec<String> = body
        .lines()
        .map(|line| {
            let chunk: NormalizedResponse = serde_json::from_str(line).expect("json line");
            assert!(chunk.choices[0].payload.is_delta());
            chunk.choices[0]
                .payload
                .fields()
                .content
                .clone()
                .expect("delta content")
        })
        .collect();
    assert_eq!(contents, vec!["Hello", " there"]);
}

#[tokio::test]
async fn stream_open_failure_is_reported_as_bad_gateway() {
    let dispatch = Arc::new(FakeDispatch {
        fail_open: true,
        ..FakeDispatch::default()
    });
    let request = chat_request("/api/chat/stream", Some(basic("bob", "builder")), hello());

    let (status, headers, body) = send(app(dispatch), request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let body: Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn citation_serves_blob_for_matching_account_and_container() {
    let request = get_request(
        "/api/citation/ACCT.blob.core.windows.net/Documents/hr/travel%20policy.pdf",
        Some(basic("hank", "hill")),
    );

    let (status, headers, body) = send(app(Arc::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(body.as_ref(), b"%PDF-1.7");
}

#[tokio::test]
async fn citation_defaults_to_octet_stream() {
    let request = get_request(
        "/api/citation/acct/documents/finance/q1.pdf",
        Some(basic("alice", "wonderland")),
    );

    let (status, headers, _) = send(app(Arc::default()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
}

#[tokio::test]
async fn citation_outside_store_or_role_prefix_is_not_found() {
    let hank = || Some(basic("hank", "hill"));
    let cases = [
        "/api/citation/other/documents/hr/travel%20policy.pdf",
        "/api/citation/acct/archive/hr/travel%20policy.pdf",
        "/api/citation/acct/documents/hr/missing.pdf",
        "/api/citation/acct/documents/finance/q1.pdf",
    ];

    for path in cases {
        let (status, _, _) = send(app(Arc::default()), get_request(path, hank())).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn citation_with_dot_segments_is_rejected_before_storage() {
    let store = documents();
    let cases = [
        "/api/citation/acct/documents/hr/%2E%2E/finance/q1.pdf",
        "/api/citation/acct/documents/hr/%2e%2e/finance/q1.pdf",
        "/api/citation/acct/documents/hr/./travel%20policy.pdf",
        "/api/citation/acct/documents/hr//travel%20policy.pdf",
    ];

    for path in cases {
        let app = app_with(Arc::default(), Some(store.clone()));
        let (status, _, _) = send(app, get_request(path, Some(basic("hank", "hill")))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
    }

    assert!(store.requested.lock().expect("store mutex poisoned").is_empty());
}

#[tokio::test]
async fn citation_requires_credentials_and_configured_storage() {
    let path = "/api/citation/acct/documents/finance/q1.pdf";

    let (status, _, _) = send(app(Arc::default()), get_request(path, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        app_with(Arc::default(), None),
        get_request(path, Some(basic("alice", "wonderland"))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

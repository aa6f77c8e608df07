//! Read-only access to cited documents in blob storage.

use std::sync::Arc;

use bytes::Bytes;
use gcommon::BoxFuture;
use gprovider::{SecretString, TokenSource};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use thiserror::Error;

/// Token audience for blob data access with a managed identity.
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com";

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Characters escaped inside a blob path; `/` keeps separating virtual directories.
const BLOB_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("authorization failed: {0}")]
    Auth(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content: Bytes,
    pub content_type: Option<String>,
}

pub trait BlobStore: Send + Sync {
    /// Storage account name, without the host suffix.
    fn account_name(&self) -> &str;

    fn container(&self) -> &str;

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StorageError>>;

    /// `None` when the blob does not exist.
    fn download<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>>;

    /// True when `account` and `container` name this store (case-insensitive, account
    /// compared up to its first `.`) and the blob exists.
    fn has_full_path<'a>(
        &'a self,
        account: &'a str,
        container: &'a str,
        path: &'a str,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            if !same_account(account, self.account_name()) {
                return Ok(false);
            }

            if !container.eq_ignore_ascii_case(self.container()) {
                return Ok(false);
            }

            self.exists(path).await
        })
    }
}

/// True when every `/`-separated segment is a plain name: no empty, `.` or `..` segments.
pub fn is_plain_blob_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('/')
            .all(|segment| !matches!(segment, "" | "." | ".."))
}

fn same_account(left: &str, right: &str) -> bool {
    let left = left.split('.').next().unwrap_or_default();
    let right = right.split('.').next().unwrap_or_default();
    left.eq_ignore_ascii_case(right)
}

/// Account name from a blob endpoint such as `https://acct.blob.core.windows.net`.
pub fn account_from_endpoint(endpoint: &str) -> String {
    let host = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    host.split(['.', '/', ':'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Blob REST endpoint client.
///
/// A SAS token, when set, authorizes every request through the query string. Otherwise a
/// token source, when set, supplies a bearer token. With neither, requests are anonymous.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: Client,
    endpoint: String,
    account_name: String,
    container: String,
    sas_token: Option<SecretString>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl std::fmt::Debug for HttpBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobStore")
            .field("endpoint", &self.endpoint)
            .field("account_name", &self.account_name)
            .field("container", &self.container)
            .field("sas_token", &self.sas_token)
            .field("token_source", &self.token_source.is_some())
            .finish()
    }
}

impl HttpBlobStore {
    pub fn new(client: Client, endpoint: impl Into<String>, container: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            account_name: account_from_endpoint(&endpoint),
            client,
            endpoint,
            container: container.into(),
            sas_token: None,
            token_source: None,
        }
    }

    pub fn with_sas_token(mut self, sas_token: Option<SecretString>) -> Self {
        self.sas_token = sas_token;
        self
    }

    pub fn with_token_source(mut self, token_source: Option<Arc<dyn TokenSource>>) -> Self {
        self.token_source = token_source;
        self
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, StorageError> {
        let builder = self
            .client
            .request(method, self.blob_url(path))
            .header("x-ms-version", STORAGE_API_VERSION);

        match &self.token_source {
            Some(source) if self.sas_token.is_none() => {
                let token = source
                    .token()
                    .await
                    .map_err(|err| StorageError::Auth(err.to_string()))?;
                Ok(builder.bearer_auth(token.secret.expose()))
            }
            _ => Ok(builder),
        }
    }

    fn blob_url(&self, path: &str) -> String {
        let path = utf8_percent_encode(path.trim_start_matches('/'), BLOB_PATH);
        let mut url = format!("{}/{}/{}", self.endpoint, self.container, path);
        if let Some(token) = &self.sas_token {
            url.push('?');
            url.push_str(token.expose().trim_start_matches('?'));
        }
        url
    }
}

impl BlobStore for HttpBlobStore {
    fn account_name(&self) -> &str {
        &self.account_name
    }

    fn container(&self) -> &str {
        &self.container
    }

    fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            if !is_plain_blob_path(path) {
                return Ok(false);
            }

            let response = self
                .request(Method::HEAD, path)
                .await?
                .send()
                .await
                .map_err(|err| StorageError::Request(err.to_string()))?;

            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                status => Err(StorageError::Status(status.as_u16())),
            }
        })
    }

    fn download<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Blob>, StorageError>> {
        Box::pin(async move {
            if !is_plain_blob_path(path) {
                return Ok(None);
            }

            let response = self
                .request(Method::GET, path)
                .await?
                .send()
                .await
                .map_err(|err| StorageError::Request(err.to_string()))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(StorageError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let content = response
                .bytes()
                .await
                .map_err(|err| StorageError::Request(err.to_string()))?;

            Ok(Some(Blob {
                content,
                content_type,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use gprovider::StaticTokenSource;

    use super::*;

    const ACCOUNT_ENDPOINT: &str = "https://acct.blob.core.windows.net";

    #[test]
    fn account_is_first_host_label() {
        assert_eq!(account_from_endpoint("https://acct.blob.core.windows.net/"), "acct");
        assert_eq!(account_from_endpoint("http://127.0.0.1:10000/devacct"), "127");
        assert_eq!(account_from_endpoint("acct.blob.core.windows.net"), "acct");
    }

    #[test]
    fn blob_url_encodes_path_and_appends_sas() {
        let store = HttpBlobStore::new(
            Client::new(),
            "https://acct.blob.core.windows.net/",
            "documents",
        )
        .with_sas_token(Some(SecretString::new("?sv=2022&sig=abc")));

        assert_eq!(
            store.blob_url("hr/travel policy.pdf"),
            "https://acct.blob.core.windows.net/documents/hr/travel%20policy.pdf?sv=2022&sig=abc"
        );
        assert_eq!(store.account_name(), "acct");
    }

    #[test]
    fn dot_and_empty_segments_are_not_plain_paths() {
        assert!(is_plain_blob_path("hr/travel policy.pdf"));
        assert!(is_plain_blob_path("hr/v1.2/notes..txt"));

        for path in ["", "hr/../finance/q1.pdf", "./q1.pdf", "hr//q1.pdf", "hr/", ".."] {
            assert!(!is_plain_blob_path(path), "{path}");
        }
    }

    #[tokio::test]
    async fn dot_segments_never_reach_the_endpoint() {
        let store = HttpBlobStore::new(Client::new(), "http://127.0.0.1:9", "documents");

        assert!(!store.exists("hr/../finance/q1.pdf").await.expect("no request is sent"));
        assert!(
            store
                .download("hr/./q1.pdf")
                .await
                .expect("no request is sent")
                .is_none()
        );
    }

    #[tokio::test]
    async fn token_source_adds_bearer_authorization() {
        let store = HttpBlobStore::new(Client::new(), ACCOUNT_ENDPOINT, "documents")
            .with_token_source(Some(Arc::new(StaticTokenSource::new("storage-token"))));

        let request = store
            .request(Method::GET, "hr/q1.pdf")
            .await
            .expect("token resolves")
            .build()
            .expect("request builds");

        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer storage-token"
        );
        assert_eq!(request.headers()["x-ms-version"], STORAGE_API_VERSION);
    }

    #[tokio::test]
    async fn sas_token_takes_precedence_over_bearer() {
        let store = HttpBlobStore::new(Client::new(), ACCOUNT_ENDPOINT, "documents")
            .with_sas_token(Some(SecretString::new("sv=2022&sig=abc")))
            .with_token_source(Some(Arc::new(StaticTokenSource::new("storage-token"))));

        let request = store
            .request(Method::HEAD, "hr/q1.pdf")
            .await
            .expect("no token needed")
            .build()
            .expect("request builds");

        assert!(!request.headers().contains_key(reqwest::header::AUTHORIZATION));
        assert_eq!(request.url().query(), Some("sv=2022&sig=abc"));
    }

    #[test]
    fn account_comparison_ignores_case_and_host_suffix() {
        assert!(same_account("ACCT.blob.core.windows.net", "acct"));
        assert!(!same_account("other", "acct"));
    }
}

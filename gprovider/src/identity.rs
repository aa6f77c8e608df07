//! Managed-identity bearer tokens for the chat provider.

use std::future::Future;
use std::time::{Duration, SystemTime};

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{AccessToken, ProviderError, ProviderFuture, TokenSource};

pub const COGNITIVE_SERVICES_RESOURCE: &str = "https://cognitiveservices.azure.com";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
enum IdentityEndpoint {
    InstanceMetadata,
    AppService { endpoint: String, header: String },
}

/// Last fetched token, reused until it comes within [`REFRESH_MARGIN`] of expiry.
#[derive(Debug, Default)]
struct TokenCache {
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    async fn get_or_fetch<F, Fut>(
        &self,
        now: SystemTime,
        fetch: F,
    ) -> Result<AccessToken, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken, ProviderError>>,
    {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.expires_within(now, REFRESH_MARGIN)
        {
            return Ok(token.clone());
        }

        let token = fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Fetches tokens from the host's managed identity endpoint and caches them
/// until shortly before they expire.
///
/// Supports the instance metadata service and the App Service identity endpoint,
/// with an optional user-assigned client id. Other credential kinds are supplied
/// through [`crate::StaticTokenSource`] or a custom [`TokenSource`].
#[derive(Debug)]
pub struct ManagedIdentityTokenSource {
    client: Client,
    endpoint: IdentityEndpoint,
    resource: String,
    client_id: Option<String>,
    cache: TokenCache,
}

impl ManagedIdentityTokenSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: IdentityEndpoint::InstanceMetadata,
            resource: COGNITIVE_SERVICES_RESOURCE.to_string(),
            client_id: None,
            cache: TokenCache::default(),
        }
    }

    /// Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
    /// `IDENTITY_HEADER` are present, the instance metadata service otherwise.
    pub fn from_env(client: Client) -> Self {
        let mut source = Self::new(client);
        if let (Ok(endpoint), Ok(header)) = (
            std::env::var("IDENTITY_ENDPOINT"),
            std::env::var("IDENTITY_HEADER"),
        ) {
            source.endpoint = IdentityEndpoint::AppService { endpoint, header };
        }

        source.client_id = std::env::var("AZURE_CLIENT_ID")
            .ok()
            .filter(|value| !value.trim().is_empty());
        source
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    async fn fetch(&self) -> Result<AccessToken, ProviderError> {
        let mut query = vec![("resource", self.resource.clone())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }

        let builder = match &self.endpoint {
            IdentityEndpoint::InstanceMetadata => {
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                self.client.get(IMDS_ENDPOINT).header("Metadata", "true")
            }
            IdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                self.client
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", header)
            }
        };

        let response = builder.query(&query).send().await.map_err(|err| {
            if err.is_timeout() {
                ProviderError::timeout(err.to_string())
            } else {
                ProviderError::transport(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "managed identity endpoint returned status {status}"
            )));
        }

        let body: IdentityTokenResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::authentication(err.to_string()))?;

        Ok(AccessToken::new(
            body.access_token,
            parse_expires_on(&body.expires_on),
        ))
    }
}

impl TokenSource for ManagedIdentityTokenSource {
    fn token<'a>(&'a self) -> ProviderFuture<'a, Result<AccessToken, ProviderError>> {
        Box::pin(async move {
            self.cache
                .get_or_fetch(SystemTime::now(), || self.fetch())
                .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct IdentityTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Value,
}

// IMDS reports epoch seconds as a string, App Service as a number.
fn parse_expires_on(value: &Value) -> Option<SystemTime> {
    let seconds = match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }?;

    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds))
}

//! Provider credentials and per-call authentication resolution.
//!
//! ```rust
//! use gprovider::{ProviderAuth, ProviderCredential};
//!
//! let credential = ProviderCredential::from_optional_api_key(Some("  ".to_string()));
//! assert!(credential.is_none());
//!
//! let credential = ProviderCredential::api_key("key-123").expect("non-empty key");
//! assert_eq!(format!("{credential:?}"), "ProviderCredential::ApiKey([REDACTED])");
//! # let _ = ProviderAuth::ApiKey(gprovider::SecretString::new("k"));
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Serialize, Serializer};

use crate::{ProviderError, ProviderFuture};

pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        self.value.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SecretString {}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// Wire payloads carry the search key verbatim.
impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.value)
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        unsafe {
            self.value.as_mut_vec().fill(0);
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: SecretString,
    pub expires_at: Option<SystemTime>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            secret: SecretString::new(secret),
            expires_at,
        }
    }

    /// True when the token expires within `margin` of `now`. Tokens without an expiry never do.
    pub fn expires_within(&self, now: SystemTime, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + margin >= expires_at,
            None => false,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Produces bearer tokens tied to ambient credentials.
pub trait TokenSource: Send + Sync {
    fn token<'a>(&'a self) -> ProviderFuture<'a, Result<AccessToken, ProviderError>>;
}

/// Hands out one fixed token; used for tests and pre-issued service tokens.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token, None),
        }
    }
}

impl TokenSource for StaticTokenSource {
    fn token<'a>(&'a self) -> ProviderFuture<'a, Result<AccessToken, ProviderError>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[derive(Clone)]
pub enum ProviderCredential {
    ApiKey(SecretString),
    BearerToken(Arc<dyn TokenSource>),
}

impl ProviderCredential {
    pub fn api_key(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = SecretString::new(api_key);
        if api_key.expose().trim().is_empty() {
            return Err(ProviderError::authentication("api key must not be empty"));
        }

        Ok(Self::ApiKey(api_key))
    }

    /// Returns an API-key credential when a non-blank key was configured.
    pub fn from_optional_api_key(api_key: Option<String>) -> Option<Self> {
        api_key.and_then(|key| Self::api_key(key).ok())
    }

    pub fn bearer<T>(source: T) -> Self
    where
        T: TokenSource + 'static,
    {
        Self::BearerToken(Arc::new(source))
    }

    pub async fn resolve(&self) -> Result<ProviderAuth, ProviderError> {
        match self {
            Self::ApiKey(key) => Ok(ProviderAuth::ApiKey(key.clone())),
            Self::BearerToken(source) => {
                let token = source.token().await?;
                if token.secret.is_empty() {
                    return Err(ProviderError::authentication(
                        "token source returned an empty token",
                    ));
                }

                Ok(ProviderAuth::Bearer(token.secret))
            }
        }
    }
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ProviderCredential::ApiKey([REDACTED])"),
            Self::BearerToken(_) => f.write_str("ProviderCredential::BearerToken(..)"),
        }
    }
}

/// Authentication attached to one outgoing provider call.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderAuth {
    ApiKey(SecretString),
    Bearer(SecretString),
}

impl std::fmt::Debug for ProviderAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ProviderAuth::ApiKey([REDACTED])"),
            Self::Bearer(_) => f.write_str("ProviderAuth::Bearer([REDACTED])"),
        }
    }
}

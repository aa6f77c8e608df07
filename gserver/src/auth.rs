//! Users loaded at startup and HTTP Basic authentication against them.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gchat::{DEFAULT_ROLE, RoleRegistry};
use gcommon::Registry;
use gprovider::SecretString;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    username: String,
    password: SecretString,
    role: String,
}

impl User {
    /// Username and role are trimmed and lower-cased; the password is kept verbatim.
    pub fn new(username: &str, password: impl Into<String>, role: &str) -> Self {
        Self {
            username: username.trim().to_lowercase(),
            password: SecretString::new(password),
            role: role.trim().to_lowercase(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    fn password_matches(&self, candidate: &str) -> bool {
        let expected = self.password.expose().as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0_u8, |diff, (left, right)| diff | (left ^ right))
            == 0
    }
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    username: Option<serde_json::Value>,
    password: Option<serde_json::Value>,
    role: Option<serde_json::Value>,
}

fn text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: Registry<String, User>,
}

impl UserRegistry {
    /// Registers users, downgrading roles the role registry does not know to `user`.
    /// A later record replaces an earlier one with the same username.
    pub fn from_users(users: impl IntoIterator<Item = User>, roles: &RoleRegistry) -> Self {
        let mut registry = Registry::new();
        for mut user in users {
            if user.username.is_empty() {
                continue;
            }
            if !roles.contains(&user.role) {
                user.role = DEFAULT_ROLE.to_string();
            }
            info!(username = %user.username, role = %user.role, "registered user");
            registry.insert(user.username.clone(), user);
        }

        Self { users: registry }
    }

    /// Parses a JSON array of `{username, password, role}`; records missing any of the
    /// three fields are skipped.
    pub fn from_json(json: &str, roles: &RoleRegistry) -> Result<Self, serde_json::Error> {
        let records: Vec<UserRecord> = serde_json::from_str(json)?;
        let users = records.into_iter().filter_map(|record| {
            match (record.username, record.password, record.role) {
                (Some(username), Some(password), Some(role)) => {
                    Some(User::new(&text(&username), text(&password), &text(&role)))
                }
                _ => None,
            }
        });

        Ok(Self::from_users(users, roles))
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username.trim().to_lowercase().as_str())
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<&User> {
        self.get(username)
            .filter(|user| user.password_matches(password))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Decodes an `Authorization: Basic ...` header value into `(username, password)`.
pub fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Caller identity resolved from Basic credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: String,
}

impl AuthenticatedUser {
    /// Rejects callers whose role is not in `allowed`.
    pub fn require_role(&self, allowed: &[String]) -> Result<(), ServerError> {
        if allowed.iter().any(|role| role == &self.role) {
            Ok(())
        } else {
            debug!(username = %self.username, role = %self.role, "role not allowed");
            Err(ServerError::Forbidden)
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (username, password) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic)
            .ok_or(ServerError::Unauthorized)?;

        let user = state
            .users
            .authenticate(&username, &password)
            .ok_or(ServerError::Unauthorized)?;

        Ok(Self {
            username: user.username().to_string(),
            role: user.role().to_string(),
        })
    }
}

//! Roles, the role registry and role-scoped retrieval filters.
//!
//! ```rust
//! use gchat::{Role, search_filter};
//!
//! let role = Role::new("finance", "Finance team").with_blob_path_prefix("/finance/");
//! let filter = search_filter(&role, "https://acct.blob.core.windows.net/documents");
//!
//! assert!(filter.starts_with("search.ismatch('\"https\\:\\/\\/acct"));
//! assert!(filter.ends_with("finance\\/*\"', 'metadata_storage_path')"));
//! ```

use gcommon::Registry;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

use crate::ChatError;

pub const DEFAULT_ROLE: &str = "user";
pub const DEFAULT_ROLE_DESCRIPTION: &str = "User role";

/// Index field holding each document's storage URL.
pub const METADATA_PATH_FIELD: &str = "metadata_storage_path";

/// Characters left untouched when encoding a blob path prefix.
const PATH_PREFIX: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    description: String,
    filter: Option<String>,
    blob_path_prefix: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            filter: None,
            blob_path_prefix: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_blob_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_path_prefix = Some(prefix.into());
        self
    }

    pub fn default_user() -> Self {
        Self::new(DEFAULT_ROLE, DEFAULT_ROLE_DESCRIPTION)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn blob_path_prefix(&self) -> Option<&str> {
        self.blob_path_prefix.as_deref()
    }
}

/// Builds the search filter expression that scopes retrieval to `role`.
///
/// The raw role filter and a `search.ismatch` clause over the blob path prefix are joined
/// with ` and `. A role with neither yields an empty string, meaning no restriction.
pub fn search_filter(role: &Role, storage_base_url: &str) -> String {
    let mut filter = role.filter().unwrap_or_default().to_string();

    if let Some(prefix) = role.blob_path_prefix() {
        if !filter.is_empty() {
            filter.push_str(" and ");
        }

        let encoded = utf8_percent_encode(prefix.trim_start_matches('/'), PATH_PREFIX);
        let path = format!("{storage_base_url}/{encoded}*")
            .replace('/', "\\/")
            .replace(':', "\\:");
        filter.push_str(&format!("search.ismatch('\"{path}\"', '{METADATA_PATH_FIELD}')"));
    }

    filter
}

pub(crate) fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Deserialize)]
struct RoleRecord {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default, rename = "blobPathStartsWith")]
    blob_path_starts_with: Option<String>,
}

/// Read-only role table loaded once at startup.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: Registry<String, Role>,
    fallback: Role,
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::from_roles(Vec::new())
    }
}

impl RoleRegistry {
    /// Registers roles under their normalized names; the first role for a name wins.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut registry = Registry::new();
        for role in roles {
            let key = normalize_key(role.name());
            if key.is_empty() {
                continue;
            }

            registry.insert_if_absent(key, role);
        }

        registry.insert_if_absent(DEFAULT_ROLE.to_string(), Role::default_user());
        let fallback = registry
            .get(DEFAULT_ROLE)
            .cloned()
            .unwrap_or_else(Role::default_user);

        Self {
            roles: registry,
            fallback,
        }
    }

    /// Parses a JSON array of `{role, description, filter, blobPathStartsWith}` records.
    pub fn from_json(json: &str) -> Result<Self, ChatError> {
        let records: Vec<RoleRecord> = serde_json::from_str(json)
            .map_err(|err| ChatError::configuration(format!("invalid role registry: {err}")))?;

        let roles = records.into_iter().filter_map(|record| {
            let name = record.role.filter(|name| !name.is_empty())?;
            let mut role = Role::new(name, record.description.unwrap_or_default());
            role.filter = record.filter;
            role.blob_path_prefix = record.blob_path_starts_with;
            Some(role)
        });

        Ok(Self::from_roles(roles))
    }

    pub fn get(&self, name: &str) -> Option<&Role> {
        self.roles.get(normalize_key(name).as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Resolves `name`, falling back to the default `user` role.
    pub fn lookup(&self, name: &str) -> &Role {
        self.get(name).unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

//! Gateway configuration, loaded from environment variables at startup.

use std::path::PathBuf;

use gchat::SearchConfig;
use gprovider::SecretString;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,

    /// JSON array of role definitions.
    pub roles_file: PathBuf,

    /// JSON array of `{username, password, role}` records.
    pub users_file: PathBuf,

    /// Roles allowed to use the chat endpoints.
    pub chat_roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    /// Absent means the ambient managed identity is used.
    pub api_key: Option<SecretString>,
    pub deployment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub resource_endpoint: Option<String>,
    pub sas_token: Option<SecretString>,
    pub container: String,
}

impl StorageConfig {
    /// `<resource endpoint>/<container>`, or empty when no storage is configured.
    pub fn base_url(&self) -> String {
        match &self.resource_endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.container),
            None => String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let openai_endpoint = get("OPENAI_API_BASE").ok_or(ConfigError::Missing("OPENAI_API_BASE"))?;
        let search_endpoint =
            get("AZURESEARCH_API_BASE").ok_or(ConfigError::Missing("AZURESEARCH_API_BASE"))?;

        let search = SearchConfig::new(search_endpoint)
            .map_err(|err| ConfigError::Invalid {
                key: "AZURESEARCH_API_BASE",
                reason: err.message,
            })?
            .with_index_name(get("AZURESEARCH_INDEX_NAME").unwrap_or_default())
            .with_semantic_configuration(get("AZURESEARCH_SEMANTIC_CONFIGURATION").unwrap_or_default())
            .with_embedding_deployment(get("OPENAI_EMBEDDING_DEPLOYMENT_NAME").unwrap_or_default())
            .with_api_key(get("AZURESEARCH_API_KEY"));

        let chat_roles = get("GROUNDCHAT_CHAT_ROLES")
            .unwrap_or_else(|| "admin,user".to_string())
            .split(',')
            .map(|role| role.trim().to_lowercase())
            .filter(|role| !role.is_empty())
            .collect::<Vec<_>>();
        if chat_roles.is_empty() {
            return Err(ConfigError::Invalid {
                key: "GROUNDCHAT_CHAT_ROLES",
                reason: "at least one role is required".to_string(),
            });
        }

        Ok(Self {
            bind_address: get("GROUNDCHAT_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            log_level: get("GROUNDCHAT_LOG").unwrap_or_else(|| "info".to_string()),
            log_json: get("GROUNDCHAT_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            openai: OpenAiConfig {
                endpoint: openai_endpoint,
                api_key: get("OPENAI_API_KEY").map(SecretString::new),
                deployment: get("OPENAI_DEPLOYMENT_NAME").unwrap_or_else(|| "gpt-4o".to_string()),
            },
            search,
            storage: StorageConfig {
                resource_endpoint: get("AZURE_STORAGEBLOB_RESOURCEENDPOINT"),
                sas_token: get("AZURE_STORAGEBLOB_SAS_TOKEN").map(SecretString::new),
                container: get("AZURE_STORAGEBLOB_CONTAINER")
                    .unwrap_or_else(|| "documents".to_string()),
            },
            roles_file: get("GROUNDCHAT_ROLES_FILE")
                .unwrap_or_else(|| "roles.json".to_string())
                .into(),
            users_file: get("GROUNDCHAT_USERS_FILE")
                .unwrap_or_else(|| "users.json".to_string())
                .into(),
            chat_roles,
        })
    }
}

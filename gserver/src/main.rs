//! groundchat gateway entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON when `GROUNDCHAT_LOG_JSON` is set).
//! 3. Load the role and user registries.
//! 4. Build the provider client, chat session and optional blob store.
//! 5. Build the Axum router and serve with graceful shutdown.

mod auth;
mod config;
mod error;
mod middleware;
mod routes;
mod state;
mod storage;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gchat::{ChatSession, RoleRegistry};
use gobserve::{FanoutChatHooks, MetricsChatHooks, SafeChatHooks, TracingChatHooks};
use gprovider::{
    AzureOpenAiClient, AzureOpenAiHttpTransport, ManagedIdentityTokenSource, ProviderCredential,
    TokenSource,
};
use tracing::{info, warn};

use crate::auth::UserRegistry;
use crate::config::Config;
use crate::state::AppState;
use crate::storage::{BlobStore, HttpBlobStore, STORAGE_RESOURCE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env().context("invalid gateway configuration")?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: GROUNDCHAT_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "groundchat starting");

    // ── 3. Roles and users ─────────────────────────────────────────────────────
    let roles = match read_optional(&cfg.roles_file).await? {
        Some(json) => RoleRegistry::from_json(&json)
            .with_context(|| format!("failed to parse {}", cfg.roles_file.display()))?,
        None => RoleRegistry::default(),
    };
    let users = match read_optional(&cfg.users_file).await? {
        Some(json) => UserRegistry::from_json(&json, &roles)
            .with_context(|| format!("failed to parse {}", cfg.users_file.display()))?,
        None => UserRegistry::default(),
    };
    if users.is_empty() {
        warn!("no users are registered; every authenticated route will answer 401");
    }
    info!(roles = roles.len(), users = users.len(), "registries loaded");

    // ── 4. Provider, session, storage ──────────────────────────────────────────
    let client = reqwest::Client::new();
    let credential = match &cfg.openai.api_key {
        Some(key) => ProviderCredential::api_key(key.expose())?,
        None => {
            info!("OPENAI_API_KEY unset; using managed identity");
            ProviderCredential::bearer(ManagedIdentityTokenSource::from_env(client.clone()))
        }
    };
    let transport = AzureOpenAiHttpTransport::new(
        client.clone(),
        cfg.openai.endpoint.clone(),
        cfg.openai.deployment.clone(),
    );
    let dispatch = AzureOpenAiClient::new(credential, Arc::new(transport));

    let hooks = SafeChatHooks::new(
        FanoutChatHooks::new()
            .with(TracingChatHooks)
            .with(MetricsChatHooks),
    );
    let session =
        ChatSession::new(cfg.search.clone(), Arc::new(dispatch)).with_hooks(Arc::new(hooks));

    let storage = cfg.storage.resource_endpoint.as_ref().map(|endpoint| {
        let identity = cfg.storage.sas_token.is_none().then(|| {
            info!("AZURE_STORAGEBLOB_SAS_TOKEN unset; using managed identity for blobs");
            Arc::new(
                ManagedIdentityTokenSource::from_env(client.clone())
                    .with_resource(STORAGE_RESOURCE),
            ) as Arc<dyn TokenSource>
        });
        let store =
            HttpBlobStore::new(client.clone(), endpoint.clone(), cfg.storage.container.clone())
                .with_sas_token(cfg.storage.sas_token.clone())
                .with_token_source(identity);
        Arc::new(store) as Arc<dyn BlobStore>
    });
    if storage.is_none() {
        warn!("AZURE_STORAGEBLOB_RESOURCEENDPOINT unset; citations will not be served");
    }

    let state = Arc::new(AppState {
        session,
        roles,
        users,
        storage,
        storage_base_url: cfg.storage.base_url(),
        chat_roles: cfg.chat_roles.clone(),
    });

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("groundchat stopped");
    Ok(())
}

/// Reads a registry file; a missing file means an empty registry.
async fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "registry file not found; using defaults");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

//! Webhook HTTP server: verification handshake and event intake.
//!
//! The intake handler acknowledges with 200 as soon as classification and
//! synchronous dispatch of the whole batch completes; any network work a
//! listener triggers runs fire-and-forget. The platform enforces a hard
//! response-time deadline, so nothing on this path blocks on the remote API.

use crate::config::{self, Config, Credentials};
use crate::dispatch::{Dispatcher, EventMeta};
use crate::events::{self, WebhookBody};
use crate::profile::{NoopUserSink, ProfileCache, UserSink};
use crate::send::SendClient;
use crate::signature;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state for the webhook endpoints and everything a listener needs.
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub credentials: Arc<Credentials>,
    pub dispatcher: Arc<Dispatcher>,
    pub client: SendClient,
    pub profiles: Arc<ProfileCache>,
}

impl BotState {
    /// Build state from config: resolve credentials fail-fast, load the
    /// profile cache mirror, wire the send client to the dispatcher. The
    /// default user sink is a no-op; hosts with a durable store use
    /// [`BotState::from_config_with_sink`].
    pub fn from_config(config: Config) -> Result<Self> {
        Self::from_config_with_sink(config, Arc::new(NoopUserSink))
    }

    pub fn from_config_with_sink(config: Config, sink: Arc<dyn UserSink>) -> Result<Self> {
        let credentials = config::resolve_credentials(&config).context("resolving credentials")?;
        let cache_path = config::resolve_data_dir(&config).join("profiles.json");
        let profiles =
            Arc::new(ProfileCache::load(&cache_path, sink).context("loading profile cache")?);
        let dispatcher = Arc::new(Dispatcher::new());
        let client = SendClient::new(
            credentials.access_token.clone(),
            config.platform.api_base.clone(),
            dispatcher.clone(),
        );
        Ok(Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            dispatcher,
            client,
            profiles,
        })
    }
}

/// Build the webhook router. Hosts can merge this into their own app; the
/// handshake and intake handlers share the configured mount path.
pub fn router(state: BotState) -> Router {
    let path = state.config.webhook.path.clone();
    Router::new()
        .route(&path, get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Run the webhook server; binds to config.webhook.bind:config.webhook.port.
/// Blocks until shutdown (Ctrl+C or SIGTERM), then flushes the profile cache.
pub async fn run_server(state: BotState) -> Result<()> {
    let bind_addr = format!(
        "{}:{}",
        state.config.webhook.bind, state.config.webhook.port
    );
    let profiles = state.profiles.clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("webhook listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited")?;

    if let Err(e) = profiles.flush().await {
        log::warn!("profile cache flush on shutdown failed: {}", e);
    }
    log::info!("webhook stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// GET handshake: `hub.mode=subscribe` with a matching `hub.verify_token`
/// echoes `hub.challenge` verbatim with 200; anything else is 403.
async fn verify_webhook(
    State(state): State<BotState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    if mode == Some("subscribe") && token == Some(state.credentials.verify_token.as_str()) {
        let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
        (StatusCode::OK, challenge)
    } else {
        log::warn!("webhook verification failed (mode {:?})", mode);
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// POST intake: verify the signature over the raw body, parse the batch, and
/// dispatch every messaging event in array order. Non-"page" objects are
/// acknowledged without dispatch.
async fn receive_webhook(
    State(state): State<BotState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let header = headers
        .get("x-hub-signature")
        .or_else(|| headers.get("x-hub-signature-256"))
        .and_then(|v| v.to_str().ok());
    if let Err(e) = signature::verify(&body, header, &state.credentials.app_secret) {
        log::warn!("rejecting webhook delivery: {}", e);
        return StatusCode::FORBIDDEN;
    }

    let batch: WebhookBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("rejecting malformed webhook body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    if batch.object != "page" {
        log::debug!("ignoring webhook object {:?}", batch.object);
        return StatusCode::OK;
    }

    let broadcast_echoes = state.config.platform.broadcast_echoes;
    let meta = EventMeta::default();
    for entry in &batch.entry {
        for event in &entry.messaging {
            for key in events::classify(event, broadcast_echoes) {
                state.dispatcher.emit(&key, event, &meta);
            }
        }
    }
    StatusCode::OK
}

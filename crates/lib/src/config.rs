//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Required platform credentials are checked fail-fast at startup; everything else
//! has a default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::BotError;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Messaging platform credentials and flags.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Webhook server settings.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Local data (profile cache mirror) settings.
    #[serde(default)]
    pub data: DataConfig,
}

/// Platform credentials: access token for the Send API, verify token for the
/// webhook handshake, app secret for payload signing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    /// Page access token. Overridden by PARLEY_ACCESS_TOKEN env when set.
    pub access_token: Option<String>,

    /// Webhook verification token. Overridden by PARLEY_VERIFY_TOKEN env when set.
    pub verify_token: Option<String>,

    /// App secret used to verify payload signatures. Overridden by PARLEY_APP_SECRET.
    pub app_secret: Option<String>,

    /// When true, echo events (messages sent by the page itself) are dispatched
    /// like any other message. Default: echoes are discarded.
    #[serde(default)]
    pub broadcast_echoes: bool,

    /// Base URL of the remote messaging API. Defaults to the platform Graph URL;
    /// point it at a local mock in tests.
    pub api_base: Option<String>,
}

/// Webhook bind, port, and mount path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_webhook_bind")]
    pub bind: String,

    /// Port for the webhook endpoints (default 8080).
    #[serde(default = "default_webhook_port")]
    pub port: u16,

    /// Mount path for both the handshake and the event endpoint (default "/webhook").
    #[serde(default = "default_webhook_path")]
    pub path: String,
}

fn default_webhook_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    8080
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind: default_webhook_bind(),
            port: default_webhook_port(),
            path: default_webhook_path(),
        }
    }
}

/// Local data directory config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    /// Directory for the profile cache mirror (default ~/.parley/data).
    pub dir: Option<PathBuf>,
}

/// Resolved required credentials, checked fail-fast at startup.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub verify_token: String,
    pub app_secret: String,
}

fn env_or_config(env_key: &str, config_value: Option<&str>) -> Option<String> {
    std::env::var(env_key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            config_value
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the page access token: env PARLEY_ACCESS_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    env_or_config("PARLEY_ACCESS_TOKEN", config.platform.access_token.as_deref())
}

/// Resolve the webhook verify token: env PARLEY_VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_or_config("PARLEY_VERIFY_TOKEN", config.platform.verify_token.as_deref())
}

/// Resolve the app secret: env PARLEY_APP_SECRET overrides config.
pub fn resolve_app_secret(config: &Config) -> Option<String> {
    env_or_config("PARLEY_APP_SECRET", config.platform.app_secret.as_deref())
}

/// Resolve all required credentials or fail fast naming the missing one.
pub fn resolve_credentials(config: &Config) -> std::result::Result<Credentials, BotError> {
    let access_token = resolve_access_token(config).ok_or_else(|| {
        BotError::Configuration(
            "access token missing (set platform.accessToken or PARLEY_ACCESS_TOKEN)".to_string(),
        )
    })?;
    let verify_token = resolve_verify_token(config).ok_or_else(|| {
        BotError::Configuration(
            "verify token missing (set platform.verifyToken or PARLEY_VERIFY_TOKEN)".to_string(),
        )
    })?;
    let app_secret = resolve_app_secret(config).ok_or_else(|| {
        BotError::Configuration(
            "app secret missing (set platform.appSecret or PARLEY_APP_SECRET)".to_string(),
        )
    })?;
    Ok(Credentials {
        access_token,
        verify_token,
        app_secret,
    })
}

/// Resolve the data directory for the profile cache mirror.
pub fn resolve_data_dir(config: &Config) -> PathBuf {
    config.data.dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .map(|h| h.join(".parley").join("data"))
            .unwrap_or_else(|| PathBuf::from("data"))
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".parley").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or PARLEY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

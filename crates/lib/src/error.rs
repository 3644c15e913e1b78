//! Error taxonomy for the connector.
//!
//! Inbound-path errors (signature, malformed batch) short-circuit before dispatch.
//! Outbound-path errors are swallowed at the network boundary and surfaced via logs
//! so the webhook response is never blocked by a downstream failure.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    /// Missing required credential or setting at construction. Fatal, never recovered.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inbound request failed the authenticity check; must be rejected and not dispatched.
    #[error("webhook signature invalid: {0}")]
    SignatureInvalid(String),

    /// Network or transport error talking to the remote API.
    #[error("remote call failed: {0}")]
    RemoteCallFailed(String),

    /// A say-style message matched none of the recognized shapes.
    #[error("unrecognized message shape")]
    UnrecognizedMessageShape,

    /// On-disk profile cache failed to parse. Fatal at startup.
    #[error("malformed cache file {}: {}", path.display(), source)]
    MalformedCacheFile {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

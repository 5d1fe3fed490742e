//! VaultLink Core Library
//!
//! Shared building blocks of the native messaging bridge: the framed wire
//! protocol, the fixed-window rate limiter, input validation, secret
//! handling, the native messaging host and the extension-side messenger.

pub mod host;
pub mod messenger;
pub mod pending;
pub mod platform;
pub mod protocol;
pub mod rate_limit;
pub mod secret;
pub mod validation;

pub use host::{HostConfig, NativeMessagingHost};
pub use messenger::{Badge, ConnectionState, Messenger, MessengerConfig};
pub use pending::PendingMap;
pub use protocol::{Action, AppStatus, BridgeReply, Credential, Message, StatusReply};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use secret::SecretString;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Boxed future used at the trait seams (channel connectors, page relays).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error type shared by every hop of the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Rate limit exceeded, retry in {}s", .wait.as_secs())]
    RateLimited { wait: Duration },

    /// Error reported by the far side of the channel, relayed verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

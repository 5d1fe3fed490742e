//! HTTP client for the desktop application's loopback bridge.

use super::HostConfig;
use crate::protocol::{BridgeReply, Message, NATIVE_HOST_HEADER, NATIVE_MESSAGE_PATH};
use crate::{BridgeError, Result};
use std::time::Duration;

/// Forwards native messages to the bridge server.
#[derive(Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    endpoint: String,
    identity: String,
    timeout: Duration,
}

impl BridgeClient {
    pub fn new(config: &HostConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .no_proxy()
            .build()
            .map_err(|e| BridgeError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.bridge_url, NATIVE_MESSAGE_PATH),
            identity: config.identity.clone(),
            timeout: config.http_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `message` to the bridge and return its reply body.
    pub async fn forward(&self, message: &Message) -> Result<BridgeReply> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(NATIVE_HOST_HEADER, &self.identity)
            .json(message)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let reply: Option<BridgeReply> = serde_json::from_slice(&body).ok();

        if !status.is_success() {
            let error = reply
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("Bridge returned {}", status));
            return Err(BridgeError::Remote(error));
        }

        reply.ok_or_else(|| BridgeError::Protocol("Invalid bridge response".to_string()))
    }

    fn transport_error(&self, error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::Timeout(self.timeout)
        } else if error.is_connect() {
            BridgeError::Connection(format!("Desktop app not reachable: {}", error))
        } else {
            BridgeError::Connection(error.to_string())
        }
    }
}

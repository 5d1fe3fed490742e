//! Bridge server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultlink_core::platform::get_port_file_path;
use vaultlink_core::protocol::{
    BRIDGE_MAX_BODY, DEFAULT_BRIDGE_PORT, DEFAULT_PORT_ATTEMPTS, NATIVE_HOST_IDENTITY,
};
use vaultlink_core::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// First loopback port tried
    pub base_port: u16,
    /// Consecutive ports tried when the previous one is in use
    pub port_attempts: u16,
    pub max_body_size: usize,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    /// How long a request waits for the vault to answer
    pub vault_timeout_ms: u64,
    /// Expected value of the native host identity header
    pub identity: String,
    pub write_port_file: bool,
    /// Overrides the platform port file location
    pub port_file: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BRIDGE_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
            max_body_size: BRIDGE_MAX_BODY,
            rate_limit_max_requests: DEFAULT_MAX_REQUESTS,
            rate_limit_window_secs: DEFAULT_WINDOW.as_secs(),
            vault_timeout_ms: 4000,
            identity: NATIVE_HOST_IDENTITY.to_string(),
            write_port_file: true,
            port_file: None,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn vault_timeout(&self) -> Duration {
        Duration::from_millis(self.vault_timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn port_file_path(&self) -> PathBuf {
        self.port_file.clone().unwrap_or_else(get_port_file_path)
    }
}

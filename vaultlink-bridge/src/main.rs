//! VaultLink Bridge
//!
//! Runs the loopback bridge backed by an in-memory vault. The bridge is
//! optional: if no port can be bound the process keeps running without it.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vaultlink_bridge::{attach_controller, server, BridgeConfig, MemoryVault, VaultBridge};

#[derive(Parser)]
#[command(name = "vaultlink-bridge", about = "VaultLink loopback bridge for the native messaging host")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bridge.toml")]
    config: PathBuf,

    /// Base port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not record the bound port for the native host
    #[arg(long)]
    no_port_file: bool,

    /// Start with the vault locked
    #[arg(long)]
    locked: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut cfg = if cli.config.exists() {
        BridgeConfig::load(&cli.config)?
    } else {
        tracing::info!("No config file found, using defaults");
        BridgeConfig::default()
    };

    if let Some(port) = cli.port {
        cfg.base_port = port;
    }
    if cli.no_port_file {
        cfg.write_port_file = false;
    }

    let vault = Arc::new(VaultBridge::new(cfg.vault_timeout()));
    let memory = MemoryVault::new();
    if cli.locked {
        memory.lock();
    }
    let _controller = attach_controller(&vault, memory);

    tracing::info!("Starting VaultLink bridge from port {}", cfg.base_port);

    let bridge = match server::start(cfg, vault).await {
        Ok(bridge) => Some(bridge),
        Err(e) => {
            tracing::error!("Bridge unavailable, continuing without it: {}", e);
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(bridge) = bridge {
        bridge.shutdown().await?;
    }

    Ok(())
}

//! VaultLink bridge server
//!
//! Loopback-only HTTP service inside the desktop application. It accepts
//! requests from the native messaging host, checks where they come from,
//! rate-limits them and correlates each one with a vault completion event.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod server;
pub mod vault;

pub use config::BridgeConfig;
pub use error::ApiError;
pub use listener::{bind_loopback, BindError};
pub use server::{build_router, start, AppState, RunningBridge};
pub use vault::{
    attach_controller, MemoryVault, SaveCompleted, SearchCompleted, VaultBridge,
    VaultController, VaultError, VaultEvent,
};

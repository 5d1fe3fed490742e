//! Axum router setup and server lifecycle.

use crate::auth::access_guard;
use crate::cleanup::spawn_cleanup_task;
use crate::config::BridgeConfig;
use crate::error::ApiError;
use crate::handlers::{native_message, status};
use crate::listener::{bind_loopback, BindError};
use crate::vault::VaultBridge;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use vaultlink_core::platform::{remove_port_file, write_port_file};
use vaultlink_core::protocol::{NATIVE_MESSAGE_PATH, STATUS_PATH};
use vaultlink_core::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub limiter: RateLimiter,
    pub vault: Arc<VaultBridge>,
}

impl AppState {
    pub fn new(config: BridgeConfig, vault: Arc<VaultBridge>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window());
        Self {
            config: Arc::new(config),
            limiter,
            vault,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status::status))
        .route(NATIVE_MESSAGE_PATH, post(native_message::native_message))
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn_with_state(state.clone(), access_guard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// A bridge server running on a background task.
pub struct RunningBridge {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    cleanup: JoinHandle<()>,
    port_file: Option<PathBuf>,
}

impl RunningBridge {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Stop accepting connections, let in-flight requests finish and remove
    /// the port file.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.await??;
        }
        if let Some(path) = self.port_file.take() {
            remove_port_file(&path)?;
        }
        info!(port = self.port, "Bridge server stopped");
        Ok(())
    }
}

impl Drop for RunningBridge {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.cleanup.abort();
    }
}

/// Bind a loopback port and serve the bridge API on it.
pub async fn start(config: BridgeConfig, vault: Arc<VaultBridge>) -> Result<RunningBridge, BindError> {
    let listener = bind_loopback(config.base_port, config.port_attempts).await?;
    let port = listener
        .local_addr()
        .map_err(|source| BindError::Io {
            port: config.base_port,
            source,
        })?
        .port();

    let port_file = if config.write_port_file {
        let path = config.port_file_path();
        match write_port_file(&path, port) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!(path = %path.display(), "Failed to write port file: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(config, vault);
    let cleanup = spawn_cleanup_task(state.limiter.clone());
    let app = build_router(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await;
        if let Err(e) = &result {
            error!("Bridge server error: {}", e);
        }
        result
    });

    info!("Bridge server listening on 127.0.0.1:{}", port);

    Ok(RunningBridge {
        port,
        shutdown: Some(shutdown_tx),
        server: Some(server),
        cleanup,
        port_file,
    })
}

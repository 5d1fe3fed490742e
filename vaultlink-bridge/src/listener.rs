//! Loopback listener with port hopping.

use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BindError {
    #[error("no free loopback port in {first}..={last}")]
    Exhausted { first: u16, last: u16 },

    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Bind `127.0.0.1`, starting at `base_port` and moving up one port each
/// time the candidate is already in use. Any other bind error stops the
/// search immediately.
pub async fn bind_loopback(base_port: u16, attempts: u16) -> Result<TcpListener, BindError> {
    let attempts = attempts.max(1);
    let mut last = base_port;

    for offset in 0..attempts {
        let Some(port) = base_port.checked_add(offset) else {
            break;
        };
        last = port;

        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => {
                if offset > 0 {
                    info!(base_port, port, "Base port busy, bound a later port");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!(port, "Port in use, trying the next one");
            }
            Err(source) => return Err(BindError::Io { port, source }),
        }
    }

    Err(BindError::Exhausted {
        first: base_port,
        last,
    })
}

//! Access guard for the bridge server.
//!
//! Runs before routing, in order: loopback peer check, per-peer rate limit,
//! native host identity header. `GET /api/status` skips only the header
//! check.
//!
//! The header value is a shared constant, so any local process that knows it
//! can pass as the native host.

use crate::error::ApiError;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::warn;
use vaultlink_core::protocol::{NATIVE_HOST_HEADER, STATUS_PATH};

pub async fn access_guard(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .ok_or_else(|| ApiError::Forbidden("Unknown peer".to_string()))?;

    if !is_loopback(peer.ip()) {
        warn!(peer = %peer, "Rejected non-loopback peer");
        return Err(ApiError::Forbidden("Loopback connections only".to_string()));
    }

    let decision = state.limiter.check(&peer.ip().to_string());
    if !decision.allowed {
        warn!(peer = %peer, wait_ms = decision.wait_time.as_millis() as u64, "Rate limit exceeded");
        return Err(ApiError::RateLimited {
            wait: decision.wait_time,
        });
    }

    let is_status = request.method() == Method::GET && request.uri().path() == STATUS_PATH;
    if !is_status && !has_identity(request.headers(), &state.config.identity) {
        warn!(peer = %peer, path = %request.uri().path(), "Missing or invalid native host header");
        return Err(ApiError::Forbidden("Forbidden".to_string()));
    }

    Ok(next.run(request).await)
}

/// 127.0.0.1, ::1 or the IPv4-mapped form of 127.0.0.1.
pub fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => {
            v6 == Ipv6Addr::LOCALHOST || v6.to_ipv4_mapped() == Some(Ipv4Addr::LOCALHOST)
        }
    }
}

fn has_identity(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(NATIVE_HOST_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
}

//! Caller origin resolution for rate-limit keys.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Origin used when nothing identifies the caller's address.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Resolve the caller's network origin.
///
/// Precedence: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer address, then [`UNKNOWN_ORIGIN`]. Forwarding headers are
/// trusted as-is, so the gateway is expected to sit behind a proxy that
/// overwrites them.
pub fn client_origin(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(ToString::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

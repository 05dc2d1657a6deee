// ────────────────────────────────
// src/server/listener.rs
// TCP bind kept separate so the server can run on an ephemeral port.
// ────────────────────────────────
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Bind `addr` and report the address actually bound (port 0 resolves here).
pub async fn bind_tcp(addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

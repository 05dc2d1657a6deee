// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::{anyhow, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::Service;

/// Builder so `main.rs` can inject the forwarding handler.
pub struct ServerBuilder<H> {
    addr: SocketAddr,
    handler: Option<H>,
}

/// A bound listener waiting to be served.
pub struct BoundServer<H> {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: H,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, handler: None }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub async fn bind(self) -> Result<BoundServer<H>> {
        let handler = self
            .handler
            .ok_or_else(|| anyhow!("handler must be set via with_handler()"))?;
        let (listener, local_addr) = bind_tcp(self.addr).await?;

        Ok(BoundServer {
            listener,
            local_addr,
            handler,
        })
    }

    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        self.bind().await?.serve(shutdown).await
    }
}

impl<H> BoundServer<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `shutdown` fires; one task per connection.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!("HTTP server listening on {}", self.local_addr);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("HTTP server on {} shutting down", self.local_addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted?,
            };
            let svc = self.handler.clone();

            tokio::spawn(async move {
                if let Err(err) = Http::new().serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }
    }
}

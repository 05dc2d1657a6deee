// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rust_lb_forwarder::{
    config::{self, Config, SourceConfig},
    forwarder::{HyperTransport, LoadBalancingForwarder},
    metrics::MetricsRegistry,
    registry::{HttpSource, InstanceRegistry, InstanceSource, RegistryRefresher, StaticSource},
    retry::RetryPolicy,
    server::{RequestHandler, Routes, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_lb_forwarder=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();
    let shutdown = CancellationToken::new();

    // Registry, seeded from the config before the first refresh
    let registry = Arc::new(InstanceRegistry::new());
    registry.publish_all(config.service_table()?);

    let source = build_source(&config)?;
    let refresher = RegistryRefresher::new(registry.clone(), source, config.discovery.refresh_interval())
        .with_metrics(metrics.clone());
    if let Err(e) = refresher.refresh().await {
        warn!("Initial registry refresh failed, serving configured instances: {}", e);
    }
    let refresher_task = refresher.spawn(shutdown.clone());

    let forwarder = Arc::new(
        LoadBalancingForwarder::new(
            registry,
            Arc::new(HyperTransport::new(config.forwarder.scheme)),
            RetryPolicy::new(config.forwarder.retry()),
        )
        .with_request_timeout(config.forwarder.request_timeout())
        .with_metrics(metrics.clone()),
    );

    if config.metrics.enabled {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, metrics_registry, config.metrics.path.clone(), shutdown.clone())?;
    }

    let handler = RequestHandler::new(forwarder, Routes::from_config(&config)?, shutdown.clone())
        .with_metrics(metrics);

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let addr = config.listen_addr()?;
    info!("Starting forwarder on {}", addr);

    ServerBuilder::new(addr)
        .with_handler(handler)
        .serve(shutdown)
        .await?;

    if let Err(e) = refresher_task.await {
        error!("Registry refresher task failed: {}", e);
    }
    Ok(())
}

fn build_source(config: &Config) -> Result<Arc<dyn InstanceSource>> {
    let source: Arc<dyn InstanceSource> = match &config.discovery.source {
        SourceConfig::Static => Arc::new(StaticSource::new(config.service_table()?)),
        SourceConfig::Http { url, timeout_secs } => Arc::new(HttpSource::new(
            url.clone(),
            std::time::Duration::from_secs(*timeout_secs),
        )?),
    };
    Ok(source)
}

fn start_metrics_server(
    addr: SocketAddr,
    registry: MetricsRegistry,
    path: String,
    shutdown: CancellationToken,
) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let mut response = Response::new(Body::empty());
                    if req.uri().path() != path.as_str() {
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        *response.body_mut() = Body::from("Not Found");
                        return Ok::<_, Infallible>(response);
                    }

                    match registry.gather() {
                        Ok(metrics) => {
                            response.headers_mut().insert(
                                hyper::header::CONTENT_TYPE,
                                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            *response.body_mut() = Body::from(metrics);
                        }
                        Err(e) => {
                            error!("Failed to encode metrics: {}", e);
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                        }
                    }
                    Ok(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

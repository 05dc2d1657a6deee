// src/registry/refresher.rs
use super::snapshot::InstanceRegistry;
use super::source::InstanceSource;
use crate::metrics::MetricsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Republishes the registry from an [`InstanceSource`] on a fixed interval.
pub struct RegistryRefresher {
    registry: Arc<InstanceRegistry>,
    source: Arc<dyn InstanceSource>,
    interval: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RegistryRefresher {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        source: Arc<dyn InstanceSource>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            source,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fetch once and publish. On error the current snapshot is left as is.
    pub async fn refresh(&self) -> anyhow::Result<u64> {
        let table = self.source.fetch().await?;
        self.registry.publish_all(table);

        let snapshot = self.registry.snapshot();
        if let Some(metrics) = &self.metrics {
            for (service, instances) in snapshot.services() {
                metrics.update_service_instances(service.as_str(), instances.len());
            }
        }
        debug!(
            version = snapshot.version(),
            published_at = %snapshot.published_at(),
            "registry snapshot published"
        );
        Ok(snapshot.version())
    }

    /// Refresh immediately, then every interval until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Starting registry refresher ({} source) with interval: {:?}",
            self.source.name(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Registry refresher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(version) => info!("Registry refreshed to version {}", version),
                        Err(e) => warn!("Registry refresh failed, keeping current snapshot: {}", e),
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

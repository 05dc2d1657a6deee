// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Inbound requests served by the hosting server
    pub requests_total: IntCounterVec,

    // forward() outcomes
    pub forwards_total: IntCounterVec,
    pub forward_duration_seconds: HistogramVec,

    // Per-instance attempts
    pub attempts_total: IntCounterVec,
    pub attempt_duration_seconds: HistogramVec,

    // Registry
    pub service_instances: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("lbf_requests_total", "Total inbound requests"),
            &["method", "status_code"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let forwards_total = IntCounterVec::new(
            Opts::new("lbf_forwards_total", "Total forward calls by outcome"),
            &["service", "policy", "outcome"],
        )?;
        registry.register(Box::new(forwards_total.clone()))?;

        let forward_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lbf_forward_duration_seconds",
                "Forward call duration in seconds, retries included",
            ),
            &["service"],
        )?;
        registry.register(Box::new(forward_duration_seconds.clone()))?;

        let attempts_total = IntCounterVec::new(
            Opts::new("lbf_attempts_total", "Attempts against individual instances"),
            &["service", "instance", "result"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let attempt_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "lbf_attempt_duration_seconds",
                "Single attempt duration in seconds",
            ),
            &["service", "instance"],
        )?;
        registry.register(Box::new(attempt_duration_seconds.clone()))?;

        let service_instances = IntGaugeVec::new(
            Opts::new("lbf_service_instances", "Published instances per service"),
            &["service"],
        )?;
        registry.register(Box::new(service_instances.clone()))?;

        Ok(Self {
            requests_total,
            forwards_total,
            forward_duration_seconds,
            attempts_total,
            attempt_duration_seconds,
            service_instances,
        })
    }

    pub fn record_request(&self, method: &str, status_code: u16) {
        self.requests_total
            .with_label_values(&[method, &status_code.to_string()])
            .inc();
    }

    pub fn record_forward(&self, service: &str, policy: &str, outcome: &str, duration: Duration) {
        self.forwards_total
            .with_label_values(&[service, policy, outcome])
            .inc();

        self.forward_duration_seconds
            .with_label_values(&[service])
            .observe(duration.as_secs_f64());
    }

    pub fn record_attempt(&self, service: &str, instance: &str, result: &str, duration: Duration) {
        self.attempts_total
            .with_label_values(&[service, instance, result])
            .inc();

        self.attempt_duration_seconds
            .with_label_values(&[service, instance])
            .observe(duration.as_secs_f64());
    }

    pub fn update_service_instances(&self, service: &str, count: usize) {
        self.service_instances
            .with_label_values(&[service])
            .set(count as i64);
    }

    /// Drop the single-label series kept for `service`.
    pub fn forget_service(&self, service: &str) {
        let _ = self.service_instances.remove_label_values(&[service]);
        let _ = self.forward_duration_seconds.remove_label_values(&[service]);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

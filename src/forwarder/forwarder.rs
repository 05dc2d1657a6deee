// src/forwarder/forwarder.rs
use super::error::{AttemptFailure, FailureReason, ForwardError};
use super::request::{ForwardRequest, ForwardResponse};
use super::transport::{HttpTransport, TransportError};
use crate::load_balancer::{Balancers, SelectionPolicy};
use crate::metrics::{MetricsCollector, Timer};
use crate::registry::{InstanceAddress, InstanceRegistry, ServiceName};
use crate::retry::{RetryDecision, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type ForwardResult = Result<ForwardResponse, ForwardError>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Metric label for names that are not in the registry.
pub const UNKNOWN_SERVICE_LABEL: &str = "<unknown>";

/// Resolves a logical service name to an instance per call and forwards the
/// request, failing over to other instances on retryable errors.
pub struct LoadBalancingForwarder {
    registry: Arc<InstanceRegistry>,
    transport: Arc<dyn HttpTransport>,
    balancers: Balancers,
    retry: RetryPolicy,
    request_timeout: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl LoadBalancingForwarder {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        transport: Arc<dyn HttpTransport>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            transport,
            balancers: Balancers::new(),
            retry,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Forget round-robin position (and any other selection state) for `service`.
    pub fn clear_selection_state(&self, service: &str) {
        self.balancers.reset(service);
    }

    /// Remove `service` from the registry along with its selection state and
    /// per-service gauges. Returns false if it was not registered.
    pub fn deregister(&self, service: &str) -> bool {
        let removed = self.registry.deregister(service);
        self.balancers.reset(service);
        if let Some(metrics) = &self.metrics {
            metrics.forget_service(service);
        }
        removed
    }

    pub async fn forward(
        &self,
        service: &str,
        request: ForwardRequest,
        policy: SelectionPolicy,
        key: Option<&str>,
    ) -> ForwardResult {
        self.forward_with_cancel(service, request, policy, key, &CancellationToken::new())
            .await
    }

    /// Like [`forward`](Self::forward), but stops as soon as `cancel` fires:
    /// the in-flight request is dropped and no further attempt is made.
    pub async fn forward_with_cancel(
        &self,
        service: &str,
        request: ForwardRequest,
        policy: SelectionPolicy,
        key: Option<&str>,
        cancel: &CancellationToken,
    ) -> ForwardResult {
        let timer = Timer::new();
        let result = self.execute(service, &request, policy, key, cancel).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "success",
                Err(e) => e.kind(),
            };
            let label = if self.registry.contains(service) {
                service
            } else {
                UNKNOWN_SERVICE_LABEL
            };
            metrics.record_forward(label, policy.as_str(), outcome, timer.elapsed());
        }
        result
    }

    async fn execute(
        &self,
        service: &str,
        request: &ForwardRequest,
        policy: SelectionPolicy,
        key: Option<&str>,
        cancel: &CancellationToken,
    ) -> ForwardResult {
        let cancelled = || ForwardError::Cancelled(ServiceName::from(service));

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let instances = self.registry.get(service)?;
        if instances.is_empty() {
            debug!(service, "no instances published");
            return Err(ForwardError::NoInstancesAvailable(ServiceName::from(service)));
        }

        let balancer = self.balancers.for_policy(policy);
        let max_attempts = self.retry.max_attempts(instances.len());
        let mut tried: Vec<InstanceAddress> = Vec::with_capacity(max_attempts);
        let mut failures: Vec<AttemptFailure> = Vec::with_capacity(max_attempts);

        while tried.len() < max_attempts {
            if cancel.is_cancelled() {
                info!(service, attempts = tried.len(), "forward cancelled before retry");
                return Err(cancelled());
            }

            if !tried.is_empty() {
                let delay = self.retry.backoff(tried.len() as u32);
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = sleep(delay) => {}
                    }
                }
            }

            let Some(instance) = balancer.select(service, instances.instances(), key, &tried) else {
                break;
            };
            tried.push(instance.clone());
            let attempt = tried.len();

            debug!(
                service,
                %instance,
                attempt,
                policy = balancer.name(),
                method = %request.method,
                path = %request.path,
                "forwarding request"
            );

            let timer = Timer::new();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(service, %instance, attempt, "forward cancelled mid-request");
                    return Err(cancelled());
                }
                outcome = timeout(self.request_timeout, self.transport.send(&instance, request)) => outcome,
            };

            let reason = match outcome {
                Ok(Ok(response)) => match self.retry.decide_status(response.status) {
                    RetryDecision::NoRetry => {
                        self.record_attempt(service, &instance, "success", timer.elapsed());
                        debug!(service, %instance, status = response.status.as_u16(), "forward complete");
                        return Ok(response);
                    }
                    RetryDecision::Retry => FailureReason::RetryableStatus(response.status),
                },
                Ok(Err(TransportError::InvalidRequest(msg))) => FailureReason::InvalidRequest(msg),
                Ok(Err(e)) => FailureReason::Transport(e.to_string()),
                Err(_) => FailureReason::Timeout(self.request_timeout),
            };

            self.record_attempt(service, &instance, reason.label(), timer.elapsed());
            warn!(
                service,
                %instance,
                attempt,
                max_attempts,
                "attempt failed: {}",
                reason
            );

            let retryable = reason.is_retryable();
            failures.push(AttemptFailure { instance, reason });
            if !retryable {
                break;
            }
        }

        warn!(
            service,
            attempts = failures.len(),
            max_retries = self.retry.max_retries(),
            "all attempted instances failed"
        );
        Err(ForwardError::AllInstancesFailed {
            service: ServiceName::from(service),
            attempts: failures,
        })
    }

    fn record_attempt(&self, service: &str, instance: &InstanceAddress, result: &str, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(service, &instance.to_string(), result, elapsed);
        }
    }
}

// src/forwarder/error.rs
use crate::registry::{InstanceAddress, RegistryError, ServiceName};
use hyper::StatusCode;
use std::fmt;
use std::time::Duration;

/// Why a single attempt against one instance failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout(Duration),
    Transport(String),
    RetryableStatus(StatusCode),
    /// The request could not be built for the instance; never retried.
    InvalidRequest(String),
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureReason::InvalidRequest(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::Timeout(_) => "timeout",
            FailureReason::Transport(_) => "transport",
            FailureReason::RetryableStatus(_) => "retryable_status",
            FailureReason::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout(after) => write!(f, "timed out after {:?}", after),
            FailureReason::Transport(msg) => write!(f, "transport error: {}", msg),
            FailureReason::RetryableStatus(status) => write!(f, "HTTP {}", status.as_u16()),
            FailureReason::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub instance: InstanceAddress,
    pub reason: FailureReason,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.instance, self.reason)
    }
}

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("unknown service '{0}'")]
    UnknownService(ServiceName),

    #[error("no instances available for service '{0}'")]
    NoInstancesAvailable(ServiceName),

    #[error("all instances failed for service '{service}': {}", join_attempts(.attempts))]
    AllInstancesFailed {
        service: ServiceName,
        attempts: Vec<AttemptFailure>,
    },

    #[error("forward to service '{0}' was cancelled")]
    Cancelled(ServiceName),
}

impl ForwardError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::UnknownService(_) => "unknown_service",
            ForwardError::NoInstancesAvailable(_) => "no_instances",
            ForwardError::AllInstancesFailed { .. } => "all_instances_failed",
            ForwardError::Cancelled(_) => "cancelled",
        }
    }
}

impl From<RegistryError> for ForwardError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownService(name) => ForwardError::UnknownService(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_attempt() {
        let err = ForwardError::AllInstancesFailed {
            service: "svc".into(),
            attempts: vec![
                AttemptFailure {
                    instance: InstanceAddress::new("10.0.0.1", 80),
                    reason: FailureReason::RetryableStatus(StatusCode::BAD_GATEWAY),
                },
                AttemptFailure {
                    instance: InstanceAddress::new("10.0.0.2", 80),
                    reason: FailureReason::Timeout(Duration::from_millis(250)),
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "all instances failed for service 'svc': 10.0.0.1:80: HTTP 502; 10.0.0.2:80: timed out after 250ms"
        );
        assert_eq!(err.kind(), "all_instances_failed");
    }
}

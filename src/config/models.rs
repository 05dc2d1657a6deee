// src/config/models.rs
use crate::load_balancer::SelectionPolicy;
use crate::registry::{InstanceAddress, ServiceName, ServiceTable};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: ServiceName,
    #[serde(default)]
    pub policy: SelectionPolicy,
    #[serde(default)]
    pub instances: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub max_retries: u32,
    pub request_timeout_ms: u64,
    pub retryable_statuses: Vec<u16>,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub scheme: Scheme,
    pub sticky_key_header: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub refresh_interval_secs: u64,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Static,
    Http {
        url: Url,
        #[serde(default = "default_source_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

/// Retry settings handed to the forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retryable_statuses: Vec<u16>,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_source_timeout() -> u64 {
    5
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            request_timeout_ms: 5_000,
            retryable_statuses: vec![502, 503, 504],
            backoff_base_ms: 0,
            backoff_max_ms: 1_000,
            scheme: Scheme::Http,
            sticky_key_header: "x-sticky-key".to_string(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            source: SourceConfig::Static,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        ForwarderConfig::default().retry()
    }
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl ForwarderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            retryable_statuses: self.retryable_statuses.clone(),
            backoff_base_ms: self.backoff_base_ms,
            backoff_max_ms: self.backoff_max_ms,
        }
    }
}

impl DiscoveryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl ServiceConfig {
    pub fn addresses(&self) -> Result<Vec<InstanceAddress>> {
        self.instances
            .iter()
            .map(|raw| {
                raw.parse::<InstanceAddress>()
                    .with_context(|| format!("service '{}': bad instance '{}'", self.name, raw))
            })
            .collect()
    }
}

impl Config {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .with_context(|| format!("invalid listen address '{}'", self.listen))
    }

    /// Service table as declared in the file.
    pub fn service_table(&self) -> Result<ServiceTable> {
        self.services
            .iter()
            .map(|s| Ok((s.name.clone(), s.addresses()?)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.trim().is_empty() {
            bail!("listen address must not be empty");
        }
        self.listen_addr()?;

        if self.forwarder.request_timeout_ms == 0 {
            bail!("forwarder.request_timeout_ms must be greater than zero");
        }
        if self.forwarder.backoff_base_ms > self.forwarder.backoff_max_ms {
            bail!(
                "forwarder.backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.forwarder.backoff_base_ms,
                self.forwarder.backoff_max_ms
            );
        }
        if let Some(status) = self
            .forwarder
            .retryable_statuses
            .iter()
            .find(|s| !(100..=599).contains(*s))
        {
            bail!("forwarder.retryable_statuses contains invalid status {}", status);
        }
        if self.forwarder.sticky_key_header.trim().is_empty() {
            bail!("forwarder.sticky_key_header must not be empty");
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.as_str().is_empty() || service.name.as_str().contains('/') {
                bail!("invalid service name '{}'", service.name);
            }
            if !seen.insert(service.name.clone()) {
                bail!("duplicate service '{}'", service.name);
            }
            service.addresses()?;
        }

        if self.discovery.refresh_interval_secs == 0 {
            bail!("discovery.refresh_interval_secs must be greater than zero");
        }

        Ok(())
    }
}

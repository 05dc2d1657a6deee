// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a file (YAML or JSON)
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config = parse_config(&contents, path.extension().and_then(|s| s.to_str()))?;
    config.validate()?;
    Ok(config)
}

/// Parse config text; `yaml`/`yml` extensions select YAML, anything else JSON.
pub fn parse_config(contents: &str, extension: Option<&str>) -> Result<Config> {
    let config: Config = match extension {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        }
        _ => serde_json::from_str(contents).context("Failed to parse JSON config")?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::SelectionPolicy;
    use crate::registry::InstanceAddress;

    const YAML: &str = r#"
listen: "127.0.0.1:8080"
forwarder:
  max_retries: 3
  request_timeout_ms: 250
services:
  - name: microservice1
    policy: sticky_by_key
    instances: ["127.0.0.1:8001", "http://127.0.0.1:8002"]
  - name: microservice2
    instances: []
discovery:
  refresh_interval_secs: 10
  source:
    kind: http
    url: "http://registry.local/instances"
metrics:
  enabled: false
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let config = parse_config(YAML, Some("yaml")).unwrap();
        config.validate().unwrap();

        assert_eq!(config.forwarder.max_retries, 3);
        assert_eq!(config.forwarder.retryable_statuses, vec![502, 503, 504]);
        assert_eq!(config.forwarder.sticky_key_header, "x-sticky-key");
        assert_eq!(config.services[0].policy, SelectionPolicy::StickyByKey);
        assert_eq!(config.services[1].policy, SelectionPolicy::RoundRobin);
        assert!(matches!(
            config.discovery.source,
            SourceConfig::Http { timeout_secs: 5, .. }
        ));
        assert!(!config.metrics.enabled);

        let table = config.service_table().unwrap();
        assert_eq!(
            table.get("microservice1").unwrap(),
            &vec![
                InstanceAddress::new("127.0.0.1", 8001),
                InstanceAddress::new("127.0.0.1", 8002)
            ]
        );
        assert!(table.get("microservice2").unwrap().is_empty());
    }

    #[test]
    fn parses_minimal_json() {
        let config = parse_config(
            r#"{"services": [{"name": "svc", "instances": ["10.0.0.1:80"]}]}"#,
            Some("json"),
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(matches!(config.discovery.source, SourceConfig::Static));
        assert_eq!(config.forwarder.retry(), RetryConfig::default());
    }

    #[test]
    fn rejects_invalid_configs() {
        let cases = [
            r#"{"forwarder": {"request_timeout_ms": 0}}"#,
            r#"{"forwarder": {"retryable_statuses": [700]}}"#,
            r#"{"forwarder": {"backoff_base_ms": 500, "backoff_max_ms": 100}}"#,
            r#"{"services": [{"name": "a"}, {"name": "a"}]}"#,
            r#"{"services": [{"name": "a", "instances": ["nope"]}]}"#,
            r#"{"services": [{"name": "a/b"}]}"#,
            r#"{"discovery": {"refresh_interval_secs": 0}}"#,
            r#"{"listen": "not-an-addr"}"#,
        ];

        for case in cases {
            let config = parse_config(case, None).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", case);
        }
    }
}

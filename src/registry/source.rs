// src/registry/source.rs
use super::instance::{InstanceAddress, ServiceName};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub type ServiceTable = HashMap<ServiceName, Vec<InstanceAddress>>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("instance source request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("instance source returned HTTP {0}")]
    Status(u16),
}

/// Supplies the full service table the refresher publishes.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    async fn fetch(&self) -> Result<ServiceTable, SourceError>;

    fn name(&self) -> &'static str;
}

/// Fixed table, typically built from the config file.
#[derive(Debug, Clone)]
pub struct StaticSource {
    table: ServiceTable,
}

impl StaticSource {
    pub fn new(table: ServiceTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl InstanceSource for StaticSource {
    async fn fetch(&self) -> Result<ServiceTable, SourceError> {
        Ok(self.table.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Pulls `{"service": ["host:port", ...]}` from an HTTP endpoint.
pub struct HttpSource {
    url: Url,
    client: Client,
}

impl HttpSource {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl InstanceSource for HttpSource {
    async fn fetch(&self) -> Result<ServiceTable, SourceError> {
        let response = self.client.get(self.url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response.json::<ServiceTable>().await?)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_source_parses_service_table() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/instances")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"microservice1": ["127.0.0.1:8001", "127.0.0.1:8002"]}"#)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/instances", server.url())).unwrap();
        let source = HttpSource::new(url, Duration::from_secs(2)).unwrap();
        let table = source.fetch().await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            table.get("microservice1").unwrap(),
            &vec![
                InstanceAddress::new("127.0.0.1", 8001),
                InstanceAddress::new("127.0.0.1", 8002)
            ]
        );
    }

    #[tokio::test]
    async fn http_source_reports_bad_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/instances")
            .with_status(503)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/instances", server.url())).unwrap();
        let source = HttpSource::new(url, Duration::from_secs(2)).unwrap();

        assert!(matches!(source.fetch().await, Err(SourceError::Status(503))));
    }
}

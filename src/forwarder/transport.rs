// src/forwarder/transport.rs
use super::request::{ForwardRequest, ForwardResponse};
use crate::config::Scheme;
use crate::registry::InstanceAddress;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::{HeaderName, CONNECTION, HOST};
use hyper::{Body, Client, HeaderMap, Request, Uri};
use hyper_tls::HttpsConnector;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot build request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Connection(#[from] hyper::Error),
}

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Sends one request to one concrete instance. Timeouts and retries are the
/// caller's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        instance: &InstanceAddress,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, TransportError>;
}

pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    scheme: Scheme,
}

impl HyperTransport {
    pub fn new(scheme: Scheme) -> Self {
        let client = Client::builder().build::<_, Body>(HttpsConnector::new());
        Self { client, scheme }
    }

    fn build(
        &self,
        instance: &InstanceAddress,
        request: &ForwardRequest,
    ) -> Result<Request<Body>, TransportError> {
        let uri: Uri = format!("{}://{}{}", self.scheme.as_str(), instance.authority(), request.path)
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| TransportError::InvalidRequest(e.to_string()))?;

        let mut outbound = Request::builder()
            .method(request.method.clone())
            .uri(uri)
            .body(Body::from(request.body.clone()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        // Host follows the selected instance.
        let headers = outbound.headers_mut();
        headers.extend(request.headers.clone());
        headers.remove(HOST);
        strip_hop_by_hop(headers);

        Ok(outbound)
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(Scheme::Http)
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn send(
        &self,
        instance: &InstanceAddress,
        request: &ForwardRequest,
    ) -> Result<ForwardResponse, TransportError> {
        let outbound = self.build(instance, request)?;
        let response = self.client.request(outbound).await?;

        let (parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body).await?;

        Ok(ForwardResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use hyper::Method;

    #[test]
    fn build_targets_instance_and_drops_host() {
        let transport = HyperTransport::default();
        let request = ForwardRequest::new(Method::POST, "/orders?id=7")
            .with_header(HOST, HeaderValue::from_static("gateway.local"))
            .with_header(
                hyper::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body("{}");

        let built = transport
            .build(&InstanceAddress::new("10.0.0.5", 8001), &request)
            .unwrap();

        assert_eq!(built.uri(), "http://10.0.0.5:8001/orders?id=7");
        assert_eq!(built.method(), Method::POST);
        assert!(built.headers().get(HOST).is_none());
        assert_eq!(built.headers()["content-type"], "application/json");
    }

    #[test]
    fn build_drops_hop_by_hop_headers() {
        let transport = HyperTransport::default();
        let request = ForwardRequest::get("/")
            .with_header(CONNECTION, HeaderValue::from_static("keep-alive, x-session-hop"))
            .with_header(HeaderName::from_static("keep-alive"), HeaderValue::from_static("timeout=5"))
            .with_header(HeaderName::from_static("x-session-hop"), HeaderValue::from_static("1"))
            .with_header(hyper::header::UPGRADE, HeaderValue::from_static("websocket"))
            .with_header(hyper::header::PROXY_AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"))
            .with_header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("abc"));

        let built = transport
            .build(&InstanceAddress::new("10.0.0.5", 8001), &request)
            .unwrap();

        let headers = built.headers();
        for gone in ["connection", "keep-alive", "x-session-hop", "upgrade", "proxy-authorization"] {
            assert!(headers.get(gone).is_none(), "{gone} was relayed");
        }
        assert_eq!(headers["x-request-id"], "abc");
    }

    #[test]
    fn bad_path_is_invalid_request() {
        let transport = HyperTransport::default();
        let request = ForwardRequest::get("/has space");

        let err = transport
            .build(&InstanceAddress::new("10.0.0.5", 8001), &request)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}

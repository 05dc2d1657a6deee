// src/server/handler.rs
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Body, Request, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::config::Config;
use crate::forwarder::{
    strip_hop_by_hop, ForwardError, ForwardRequest, ForwardResponse, LoadBalancingForwarder,
};
use crate::load_balancer::SelectionPolicy;
use crate::metrics::MetricsCollector;
use crate::registry::ServiceName;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-service policy and where to find the sticky key.
#[derive(Debug, Clone)]
pub struct Routes {
    policies: HashMap<ServiceName, SelectionPolicy>,
    sticky_key_header: HeaderName,
}

impl Routes {
    pub fn new(sticky_key_header: HeaderName) -> Self {
        Self {
            policies: HashMap::new(),
            sticky_key_header,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(config.forwarder.sticky_key_header.as_bytes())?;
        let mut routes = Self::new(header);
        for service in &config.services {
            routes = routes.with_policy(service.name.clone(), service.policy);
        }
        Ok(routes)
    }

    pub fn with_policy(mut self, service: impl Into<ServiceName>, policy: SelectionPolicy) -> Self {
        self.policies.insert(service.into(), policy);
        self
    }

    fn policy_for(&self, service: &str) -> SelectionPolicy {
        self.policies.get(service).copied().unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct RequestHandler {
    forwarder: Arc<LoadBalancingForwarder>,
    routes: Arc<Routes>,
    shutdown: CancellationToken,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestHandler {
    pub fn new(forwarder: Arc<LoadBalancingForwarder>, routes: Routes, shutdown: CancellationToken) -> Self {
        Self {
            forwarder,
            routes: Arc::new(routes),
            shutdown,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// `/{service}/{rest}` is forwarded to `service` as `/{rest}`.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let method = req.method().clone();
        let response = self.route(req).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_request(method.as_str(), response.status().as_u16());
        }
        response
    }

    async fn route(&self, req: Request<Body>) -> Response<Body> {
        let Some((service, path)) = split_service_path(req.uri().path()) else {
            return text_response(StatusCode::NOT_FOUND, "expected /{service}/{path}".to_string());
        };
        let path = match req.uri().query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };
        let service = service.to_string();

        let (parts, body) = req.into_parts();
        let body = match hyper::body::to_bytes(body).await {
            Ok(body) => body,
            Err(e) => {
                return text_response(StatusCode::BAD_REQUEST, format!("failed to read body: {}", e))
            }
        };

        let mut request = ForwardRequest::new(parts.method, path);
        request.headers = parts.headers;
        request.body = body;

        let request_id = ensure_request_id(&mut request);
        let key = request
            .headers
            .get(&self.routes.sticky_key_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let policy = self.routes.policy_for(&service);

        tracing::debug!(%service, request_id = ?request_id, ?policy, "inbound request");

        let cancel = self.shutdown.child_token();
        let result = self
            .forwarder
            .forward_with_cancel(&service, request, policy, key.as_deref(), &cancel)
            .await;

        let mut response = match result {
            Ok(forwarded) => into_response(forwarded),
            Err(err) => {
                tracing::warn!(%service, %err, "forward failed");
                error_response(&err)
            }
        };
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
        response
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Box<dyn std::error::Error + Send + Sync>;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}

fn split_service_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let (service, rest) = match trimmed.find('/') {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, "/"),
    };
    if service.is_empty() {
        None
    } else {
        Some((service, rest))
    }
}

fn ensure_request_id(request: &mut ForwardRequest) -> HeaderValue {
    if let Some(existing) = request.headers.get(REQUEST_ID_HEADER) {
        return existing.clone();
    }
    let id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
    request.headers.insert(REQUEST_ID_HEADER, id.clone());
    id
}

fn into_response(forwarded: ForwardResponse) -> Response<Body> {
    let mut response = Response::new(Body::from(forwarded.body));
    *response.status_mut() = forwarded.status;
    *response.headers_mut() = forwarded.headers;
    strip_hop_by_hop(response.headers_mut());
    response
}

fn text_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Status used when the caller went away; nginx's "client closed request".
fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

pub fn error_response(err: &ForwardError) -> Response<Body> {
    let status = match err {
        ForwardError::UnknownService(_) => StatusCode::NOT_FOUND,
        ForwardError::NoInstancesAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ForwardError::AllInstancesFailed { .. } => StatusCode::BAD_GATEWAY,
        ForwardError::Cancelled(_) => client_closed_request(),
    };
    text_response(status, err.to_string())
}

//! Request logging and request IDs.
//!
//! # Features
//!
//! - Generates UUIDv4 request IDs for incoming requests without one
//! - Propagates a well-formed client `X-Request-Id` and echoes it on the response
//! - Runs the inner stages inside a `request` span carrying the ID, so every
//!   event logged while handling the request is correlated
//! - Emits exactly one completion event per request, at `error` for 5xx,
//!   `warn` for 4xx and `info` otherwise
//!
//! The completion event is emitted from a drop guard, so requests that end in
//! a panic or whose connection is dropped are still logged (as 500).
//!
//! # Client Usage
//!
//! ```bash
//! curl -H "X-Request-Id: my-correlation-id" http://localhost:8080/health
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Method, Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::ip::{ClientIdentity, TrustedProxyConfig};

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request ID that is propagated.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Request logging layer for Tower middleware stack.
#[derive(Clone)]
pub struct LoggingLayer {
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl LoggingLayer {
    pub fn new(trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self { trusted_proxies }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Request logging service wrapper.
#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for LoggingService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = extract_or_generate_request_id(&req);
        let header_value = HeaderValue::from_str(&request_id).ok();
        if let Some(value) = &header_value {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        }

        let mut completion = CompletionLog {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            client_ip: ClientIdentity::of(&req, &self.trusted_proxies),
            request_id: request_id.clone(),
            started: Instant::now(),
            status: None,
        };

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %completion.method,
            path = %completion.path,
        );

        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let mut response = inner.call(req).await?;

                if let Some(value) = header_value {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                completion.status = Some(response.status().as_u16());

                Ok(response)
            }
            .instrument(span),
        )
    }
}

/// Emits the completion event when dropped.
struct CompletionLog {
    method: Method,
    path: String,
    client_ip: ClientIdentity,
    request_id: String,
    started: Instant,
    status: Option<u16>,
}

impl Drop for CompletionLog {
    fn drop(&mut self) {
        let status = self.status.unwrap_or(500);
        let completed = self.status.is_some();
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let (method, path, client_ip, request_id) =
            (&self.method, &self.path, &self.client_ip, &self.request_id);

        match status {
            500.. => error!(
                %method, %path, %client_ip, status, duration_ms, %request_id, completed,
                "Request completed"
            ),
            400..=499 => warn!(
                %method, %path, %client_ip, status, duration_ms, %request_id, completed,
                "Request completed"
            ),
            _ => info!(
                %method, %path, %client_ip, status, duration_ms, %request_id, completed,
                "Request completed"
            ),
        }
    }
}

/// Extract request ID from headers or generate a new one.
///
/// Client IDs are kept only when non-empty, at most 128 bytes, and made of
/// visible ASCII.
pub(crate) fn extract_or_generate_request_id<B>(req: &Request<B>) -> String {
    if let Some(header_value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(value) = header_value.to_str()
        && !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
    {
        return value.to_string();
    }

    Uuid::new_v4().to_string()
}

/// Extension trait to extract request ID from requests.
pub trait RequestIdExt {
    /// Get the request ID from the request headers.
    fn request_id(&self) -> Option<String>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<String> {
        self.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|req: Request<Body>| async move { req.request_id().unwrap_or_default() }),
            )
            .layer(LoggingLayer::new(Arc::new(TrustedProxyConfig::default())))
    }

    #[test]
    fn test_extract_existing_request_id() {
        let req = Request::builder()
            .header("x-request-id", "existing-id-123")
            .body(Body::empty())
            .unwrap();

        assert_eq!(extract_or_generate_request_id(&req), "existing-id-123");
    }

    #[test]
    fn test_generate_new_request_id() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let id = extract_or_generate_request_id(&req);
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_reject_oversized_or_spaced_request_id() {
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        let req = Request::builder()
            .header("x-request-id", long.as_str())
            .body(Body::empty())
            .unwrap();
        assert!(Uuid::parse_str(&extract_or_generate_request_id(&req)).is_ok());

        let req = Request::builder()
            .header("x-request-id", "has space")
            .body(Body::empty())
            .unwrap();
        assert!(Uuid::parse_str(&extract_or_generate_request_id(&req)).is_ok());
    }

    #[tokio::test]
    async fn test_request_id_propagated_to_handler_and_response() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("x-request-id", "corr-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "corr-42");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"corr-42");
    }

    #[tokio::test]
    async fn test_request_id_generated_on_response() {
        let response = app()
            .oneshot(Request::builder().uri("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}

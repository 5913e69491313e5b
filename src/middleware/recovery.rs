//! Panic recovery.
//!
//! The outermost pipeline stage. A panic anywhere below it, in middleware or
//! a handler, is caught, logged with the request's method, path and client
//! identity, and turned into a generic 500 JSON response. The panic payload
//! never reaches the client.
//!
//! This stage also resolves the client identity once and stores it as a
//! [`ClientIdentity`] extension for every inner stage. The request ID is
//! settled here too and written back to `X-Request-Id`, so the logging stage
//! reuses it and the recovered 500 can echo it.
//!
//! A panic unwinds past every inner stage, so the recovered response gets the
//! security header set and the request ID directly from this stage.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures::FutureExt;
use tower::{Layer, Service};
use tracing::error;

use super::ip::{ClientIdentity, TrustedProxyConfig, resolve_client_ip};
use super::logging::{REQUEST_ID_HEADER, extract_or_generate_request_id};
use super::security_headers::apply_security_headers;
use crate::error::ErrorResponse;

/// Panic recovery layer.
#[derive(Clone)]
pub struct RecoveryLayer {
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl RecoveryLayer {
    pub fn new(trusted_proxies: Arc<TrustedProxyConfig>) -> Self {
        Self { trusted_proxies }
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Panic recovery service wrapper.
#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
    trusted_proxies: Arc<TrustedProxyConfig>,
}

impl<S> Service<Request<Body>> for RecoveryService<S>
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
        let identity = ClientIdentity(resolve_client_ip(&req, &self.trusted_proxies).into_owned());
        req.extensions_mut().insert(identity.clone());

        let request_id = extract_or_generate_request_id(&req);
        let request_id_value = HeaderValue::from_str(&request_id).ok();
        if let Some(value) = &request_id_value {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        }

        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(req))) {
                Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                Err(panic) => Err(panic),
            };

            match outcome {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        method = %method,
                        path = %path,
                        client_ip = %identity,
                        request_id = %request_id,
                        panic = %panic_message(panic.as_ref()),
                        "Panic recovered"
                    );
                    Ok(internal_error_response(request_id_value))
                }
            }
        })
    }
}

fn internal_error_response(request_id: Option<HeaderValue>) -> Response<Body> {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut response = (
        status,
        Json(ErrorResponse::new(status, "An unexpected error occurred")),
    )
        .into_response();

    let headers = response.headers_mut();
    apply_security_headers(headers);
    if let Some(value) = request_id {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    response
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    async fn boom() -> &'static str {
        panic!("handler exploded with secret detail");
    }

    async fn fine() -> &'static str {
        "ok"
    }

    fn app() -> Router {
        Router::new()
            .route("/boom", get(boom))
            .route("/fine", get(fine))
            .layer(RecoveryLayer::new(Arc::new(TrustedProxyConfig::default())))
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["message"], "An unexpected error occurred");
        assert!(!String::from_utf8_lossy(&bytes).contains("secret detail"));
    }

    #[tokio::test]
    async fn test_recovered_500_carries_security_headers_and_request_id() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/boom")
                    .header(REQUEST_ID_HEADER, "trace-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["content-security-policy"], "default-src 'self'");
        assert_eq!(headers[REQUEST_ID_HEADER], "trace-42");
    }

    #[tokio::test]
    async fn test_request_id_generated_for_recovered_500() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_normal_response_passes_through() {
        let response = app()
            .oneshot(Request::builder().uri("/fine").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}

//! Bearer-token authentication guard.
//!
//! Applied with `route_layer` to the protected route subtree only. The guard
//! requires `Authorization: Bearer <token>`, validates the token through
//! [`TokenService`], and attaches the verified [`Claims`] to the request
//! extensions. Handlers read them with the [`AuthenticatedUser`] extractor.
//!
//! # Rejections
//!
//! Every rejection is a 401 with `WWW-Authenticate: Bearer` and the handler
//! is never invoked:
//!
//! | Cause | Message |
//! |---|---|
//! | No header | `Missing authorization header` |
//! | Not `Bearer <token>` | `Invalid authorization header format` |
//! | Bad signature, expired, malformed | `Invalid token` |
//!
//! The three token failures share one message so clients cannot tell them
//! apart; the distinction is only logged.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, Response, header};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::auth::{AuthError, Claims, TokenService, bearer_token};
use crate::error::AppError;
use crate::middleware::ip::ClientIdentity;

/// Bearer authentication layer.
#[derive(Clone)]
pub struct BearerAuth {
    tokens: Arc<TokenService>,
}

impl BearerAuth {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S> Layer<S> for BearerAuth {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

/// Bearer authentication service wrapper.
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    tokens: Arc<TokenService>,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
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
        let outcome = authenticate(&req, &self.tokens);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match outcome {
                Ok(claims) => {
                    debug!(user_id = claims.user_id, "Bearer authentication successful");
                    req.extensions_mut().insert(claims);
                    inner.call(req).await
                }
                Err(e) => {
                    warn!(
                        path = %req.uri().path(),
                        client_ip = %req
                            .extensions()
                            .get::<ClientIdentity>()
                            .map_or("unknown", ClientIdentity::as_str),
                        reason = e.kind(),
                        detail = %e,
                        "Authentication failed"
                    );
                    Ok(AppError::Unauthorized(e).into_response())
                }
            }
        })
    }
}

/// Validate the request's bearer token.
fn authenticate<B>(req: &Request<B>, tokens: &TokenService) -> Result<Claims, AuthError> {
    let header = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::BadFormat)?),
        None => None,
    };

    let token = bearer_token(header)?;
    Ok(tokens.validate_token(token)?)
}

/// Verified caller identity for handlers behind [`BearerAuth`].
///
/// Rejects with 401 if the guard did not run, so a route that forgot the
/// layer fails closed.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Claims);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AppError::Unauthorized(AuthError::MissingHeader))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::TokenError;

    fn tokens() -> Arc<TokenService> {
        Arc::new(
            TokenService::new(
                b"0123456789abcdef0123456789abcdef",
                Duration::from_secs(60),
                "account_service",
            )
            .unwrap(),
        )
    }

    async fn whoami(AuthenticatedUser(claims): AuthenticatedUser) -> String {
        claims.username
    }

    fn app(tokens: Arc<TokenService>) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route_layer(BearerAuth::new(tokens))
    }

    async fn message(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        body["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let tokens = tokens();
        let (token, _) = tokens.issue_token(1, "alice", "alice@example.com").unwrap();

        let response = app(tokens)
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"alice");
    }

    #[tokio::test]
    async fn test_missing_header() {
        let response = app(tokens())
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
        assert_eq!(message(response).await, "Missing authorization header");
    }

    #[tokio::test]
    async fn test_wrong_scheme() {
        let response = app(tokens())
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(response).await, "Invalid authorization header format");
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let response = app(tokens())
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header("authorization", "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(response).await, "Invalid token");
    }

    #[test]
    fn test_authenticate_expired() {
        let tokens = tokens();
        let (token, _) = tokens
            .issue_token_at(
                1,
                "alice",
                "alice@example.com",
                chrono::Utc::now() - chrono::TimeDelta::hours(1),
            )
            .unwrap();
        let req = Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            authenticate(&req, &tokens).unwrap_err(),
            AuthError::InvalidToken(TokenError::Expired)
        );
    }
}

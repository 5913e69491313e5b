//! Body size and content-type checks.
//!
//! Runs before any body is read. A declared `Content-Length` above the limit
//! is refused with 413; `POST`, `PUT` and `PATCH` requests declaring a
//! non-JSON `Content-Type` are refused with 415. Bodies sent without a
//! `Content-Length` are capped separately by `DefaultBodyLimit` on the router.

use axum::extract::{Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::ip::ClientIdentity;
use crate::error::AppError;

/// Use with `axum::middleware::from_fn_with_state(max_body_size, validate_request)`.
pub async fn validate_request(
    State(max_body_size): State<usize>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(length) = content_length(&req)
        && length > max_body_size as u64
    {
        warn!(
            content_length = length,
            limit = max_body_size,
            client_ip = %client_ip(&req),
            "Request too large"
        );
        return Err(AppError::PayloadTooLarge {
            limit: max_body_size,
        });
    }

    if matches!(*req.method(), Method::POST | Method::PUT | Method::PATCH)
        && let Some(content_type) = req.headers().get(header::CONTENT_TYPE)
    {
        let content_type = content_type.to_str().unwrap_or_default();
        if !is_json(content_type) {
            warn!(
                content_type,
                client_ip = %client_ip(&req),
                "Invalid content type"
            );
            return Err(AppError::UnsupportedMediaType(content_type.to_string()));
        }
    }

    Ok(next.run(req).await)
}

fn content_length(req: &Request) -> Option<u64> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// `application/json`, optionally with parameters such as `charset`.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
}

fn client_ip(req: &Request) -> &str {
    req.extensions()
        .get::<ClientIdentity>()
        .map_or(super::ip::UNKNOWN_IP, ClientIdentity::as_str)
}

//! Bearer-token authentication and credential hashing.
//!
//! - [`TokenService`] issues and validates HMAC-signed JWTs and owns the
//!   password hashing policy
//! - [`AuthError`] / [`TokenError`] describe why a request was not
//!   authenticated; all of them reach the client as a 401
//! - [`LoginThrottle`] bounds login attempts per client
//!
//! Tokens are stateless. There is no server-side revocation list, so a token
//! stays valid until it expires.

mod password;
mod throttle;
mod token;

use thiserror::Error;

pub use password::{hash_password, verify_password};
pub use throttle::LoginThrottle;
pub use token::{Claims, MIN_SECRET_LEN, TokenService};

/// Reasons a token failed validation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,
}

/// Reasons the auth guard rejected a request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid authorization header format")]
    BadFormat,

    #[error("invalid token: {0}")]
    InvalidToken(TokenError),
}

impl AuthError {
    /// Stable identifier used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing_header",
            AuthError::BadFormat => "invalid_format",
            AuthError::InvalidToken(_) => "invalid_token",
        }
    }

    /// Message sent to the client. Token failures are not distinguished.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "Missing authorization header",
            AuthError::BadFormat => "Invalid authorization header format",
            AuthError::InvalidToken(_) => "Invalid token",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::InvalidToken(e)
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively (`Bearer`, `bearer`); the token
/// must be non-empty and is returned with surrounding whitespace trimmed.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingHeader)?;
    if value.trim().is_empty() {
        return Err(AuthError::MissingHeader);
    }

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::BadFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::BadFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::BadFormat);
    }

    Ok(token)
}

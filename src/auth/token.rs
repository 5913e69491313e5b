use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::TokenError;
use super::password::{hash_password, verify_password};
use crate::error::{AppError, AppResult};

/// Minimum accepted length of a configured signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Algorithms a token header may declare. Anything outside the HMAC family is
/// rejected before the signature is checked.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Verified token payload, attached to the request once the auth guard passes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// `user_<id>`
    pub sub: String,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Issues and validates bearer tokens and hashes credentials.
///
/// The service is immutable after construction and shared as
/// `Arc<TokenService>`. Password hashing is CPU-bound; request handlers run
/// it on the blocking pool.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: TimeDelta,
    /// Hash checked against when a login names an unknown account, so both
    /// outcomes cost one full verification.
    dummy_hash: String,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build a service around a configured secret.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConfigError`] if the secret is shorter than
    /// [`MIN_SECRET_LEN`] or the TTL is zero or out of range.
    pub fn new(secret: &[u8], ttl: Duration, issuer: impl Into<String>) -> AppResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::ConfigError(format!(
                "JWT secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if ttl.is_zero() {
            return Err(AppError::ConfigError(
                "Token TTL must be greater than zero".to_string(),
            ));
        }
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|e| AppError::ConfigError(format!("Token TTL out of range: {e}")))?;

        let issuer = issuer.into();

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        let dummy_hash = hash_password("account-service-timing-equaliser")
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            ttl,
            dummy_hash,
        })
    }

    /// Build a service with a freshly generated random secret.
    ///
    /// Tokens signed by this instance cannot be verified after a restart or by
    /// another instance.
    pub fn with_random_secret(ttl: Duration, issuer: impl Into<String>) -> AppResult<Self> {
        warn!(
            "JWT_SECRET_KEY is not set; generated a random signing key. \
             Issued tokens will not survive a restart."
        );
        Self::new(random_secret().as_bytes(), ttl, issuer)
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Issue a token for the given account, valid from now for the TTL.
    pub fn issue_token(
        &self,
        user_id: i64,
        username: &str,
        email: &str,
    ) -> AppResult<(String, DateTime<Utc>)> {
        self.issue_token_at(user_id, username, email, Utc::now())
    }

    /// Issue a token as if it had been created at `issued_at`.
    ///
    /// Lets callers backdate a token, e.g. to produce one that has already
    /// expired.
    pub fn issue_token_at(
        &self,
        user_id: i64,
        username: &str,
        email: &str,
        issued_at: DateTime<Utc>,
    ) -> AppResult<(String, DateTime<Utc>)> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            sub: format!("user_{user_id}"),
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))?;

        Ok((token, expires_at))
    }

    /// Verify signature, algorithm family, issuer and expiry.
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        // The library accepts exp == now; require it to be strictly ahead.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        hash_password(password)
    }

    pub fn verify_password(&self, hash: &str, password: &str) -> bool {
        verify_password(hash, password)
    }

    /// Verify a login attempt. With no stored hash the password is checked
    /// against a dummy hash and the result is always `false`.
    pub fn verify_credentials(&self, stored_hash: Option<&str>, password: &str) -> bool {
        match stored_hash {
            Some(hash) => verify_password(hash, password),
            None => {
                let _ = verify_password(&self.dummy_hash, password);
                false
            }
        }
    }
}

fn random_secret() -> String {
    rand::random::<[u8; 32]>()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn service() -> TokenService {
        TokenService::new(SECRET, Duration::from_secs(3600), "account_service").unwrap()
    }

    #[test]
    fn test_issue_then_validate() {
        let tokens = service();
        let (token, expires_at) = tokens.issue_token(42, "alice", "alice@example.com").unwrap();

        let claims = tokens.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user_42");
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.iss, "account_service");
        assert_eq!(claims.exp, expires_at.timestamp());
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token() {
        let tokens = service();
        let issued_at = Utc::now() - TimeDelta::hours(2);
        let (token, _) = tokens
            .issue_token_at(1, "bob", "bob@example.com", issued_at)
            .unwrap();

        assert_eq!(tokens.validate_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_signature() {
        let tokens = service();
        let (token, _) = tokens.issue_token(7, "carol", "carol@example.com").unwrap();

        let sig_start = token.rfind('.').unwrap() + 1;
        let mid = sig_start + (token.len() - sig_start) / 2;
        let mut bytes = token.into_bytes();
        bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(
            tokens.validate_token(&tampered),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let (token, _) = service().issue_token(7, "carol", "carol@example.com").unwrap();
        let other = TokenService::new(
            b"ffffffffffffffffffffffffffffffff",
            Duration::from_secs(3600),
            "account_service",
        )
        .unwrap();

        assert_eq!(other.validate_token(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let tokens = service();
        let (token, _) = tokens.issue_token(7, "carol", "carol@example.com").unwrap();
        let rest = token.split_once('.').unwrap().1;

        // {"alg":"RS256","typ":"JWT"}
        let rs256 = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{rest}");
        assert_eq!(
            tokens.validate_token(&rs256),
            Err(TokenError::InvalidSignature)
        );

        // {"alg":"none","typ":"JWT"}
        let none = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{rest}");
        assert!(tokens.validate_token(&none).is_err());
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (token, _) = TokenService::new(SECRET, Duration::from_secs(3600), "someone_else")
            .unwrap()
            .issue_token(1, "dave", "dave@example.com")
            .unwrap();

        assert_eq!(service().validate_token(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = service();
        assert_eq!(tokens.validate_token("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(tokens.validate_token(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = TokenService::new(b"short", Duration::from_secs(60), "x");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_random_secret_service_round_trip() {
        let tokens =
            TokenService::with_random_secret(Duration::from_secs(60), "account_service").unwrap();
        let (token, _) = tokens.issue_token(3, "erin", "erin@example.com").unwrap();
        assert_eq!(tokens.validate_token(&token).unwrap().user_id, 3);
    }

    #[test]
    fn test_verify_credentials() {
        let tokens = service();
        let hash = tokens.hash_password("hunter2hunter2").unwrap();

        assert!(tokens.verify_credentials(Some(&hash), "hunter2hunter2"));
        assert!(!tokens.verify_credentials(Some(&hash), "wrong-password"));
        assert!(!tokens.verify_credentials(None, "hunter2hunter2"));
    }
}

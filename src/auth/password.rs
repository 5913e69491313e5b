use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Hash a password with Argon2id and a random salt (PHC string format).
///
/// Uses the crate's default cost parameters. This is deliberately slow; call
/// it from `spawn_blocking` on request paths.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Check `password` against a stored PHC hash.
///
/// The digest comparison inside `argon2` is constant-time. A stored hash that
/// cannot be parsed verifies as `false`.
pub fn verify_password(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Stored password hash is not a valid PHC string");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

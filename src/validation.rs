use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Minimum username length in characters.
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Maximum username length in characters.
pub const MAX_USERNAME_LENGTH: usize = 50;

/// Maximum email length in bytes (RFC 5321 path limit).
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate a username.
///
/// Rules:
/// - Must be between 3 and 50 characters
/// - Must not contain control characters
pub fn validate_username(username: &str) -> AppResult<()> {
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(AppError::Validation(format!(
            "Username must be between {MIN_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH} characters"
        )));
    }

    if let Some(pos) = username.chars().position(|c| c.is_control()) {
        return Err(AppError::Validation(format!(
            "Username contains invalid control character at position {pos}"
        )));
    }

    Ok(())
}

/// Validate an email address.
///
/// Deliberately shallow: at most 254 bytes, exactly one `@` with a non-empty
/// local part, and a domain containing a dot that neither starts nor ends
/// it. Deliverability is not checked.
pub fn validate_email(email: &str) -> AppResult<()> {
    let invalid = || AppError::Validation("Valid email is required".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid());
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }

    Ok(())
}

/// Validate a plaintext password before hashing.
pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Validate a complete registration.
pub fn validate_new_user(username: &str, email: &str, password: &str) -> AppResult<()> {
    validate_username(username)?;
    validate_email(email)?;
    validate_password(password)
}

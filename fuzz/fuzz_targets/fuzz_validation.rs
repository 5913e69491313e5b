//! Fuzz testing for account input validation.
//!
//! Feeds arbitrary strings to the registration validators and checks that
//! they never panic, and that anything accepted respects the length limits.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```

#![no_main]

use account_service::validation::{
    MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH, MIN_USERNAME_LENGTH,
    validate_email, validate_new_user, validate_password, validate_username,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if validate_username(s).is_ok() {
        let length = s.chars().count();
        assert!((MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length));
    }

    if validate_email(s).is_ok() {
        assert!(s.len() <= MAX_EMAIL_LENGTH);
        assert!(s.contains('@'));
    }

    if validate_password(s).is_ok() {
        assert!(s.chars().count() >= MIN_PASSWORD_LENGTH);
    }

    // Split the input three ways to exercise the combined check
    let mut parts = s.splitn(3, '\0');
    let _ = validate_new_user(
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
    );
});

//! Fuzz the `Authorization` header parser.
//!
//! ```bash
//! cargo +nightly fuzz run fuzz_bearer_header
//! ```

#![no_main]

use account_service::auth::bearer_token;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(token) = bearer_token(Some(header)) {
        assert!(!token.is_empty());
        assert!(header.len() > token.len());
    }
});

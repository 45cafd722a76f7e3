//! CSRF guard for the mutating setup endpoints
//!
//! One token is generated per server instance and embedded in the setup
//! page. Every POST must echo it back in the `X-CSRF-Token` header.

use rand::RngExt;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Header the browser script uses to echo the token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Supplied token did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid CSRF token")]
pub struct Forbidden;

/// Immutable per-instance CSRF token.
#[derive(Clone)]
pub struct CsrfGuard {
    token: String,
}

impl CsrfGuard {
    /// Generate a fresh guard from 32 bytes of OS randomness, hex-encoded
    /// to 64 characters.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        Self {
            token: hex::encode(bytes),
        }
    }

    /// The token to embed in rendered pages.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Compare `supplied` against the stored token.
    ///
    /// Both sides are hashed to fixed-length digests first, so timing does
    /// not depend on the supplied length or on where the first differing
    /// byte sits. An empty token fails like any other wrong token.
    pub fn validate(&self, supplied: &str) -> Result<(), Forbidden> {
        let expected = Sha256::digest(self.token.as_bytes());
        let actual = Sha256::digest(supplied.as_bytes());
        if bool::from(expected.as_slice().ct_eq(actual.as_slice())) {
            Ok(())
        } else {
            Err(Forbidden)
        }
    }
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_64_hex_chars() {
        let guard = CsrfGuard::generate();
        assert_eq!(guard.token().len(), 64);
        assert!(guard.token().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique_per_instance() {
        assert_ne!(CsrfGuard::generate().token(), CsrfGuard::generate().token());
    }

    #[test]
    fn matching_token_passes() {
        let guard = CsrfGuard::generate();
        let token = guard.token().to_string();
        assert_eq!(guard.validate(&token), Ok(()));
    }

    #[test]
    fn wrong_empty_and_prefix_tokens_fail() {
        let guard = CsrfGuard::generate();
        assert_eq!(guard.validate("invalid"), Err(Forbidden));
        assert_eq!(guard.validate(""), Err(Forbidden));
        assert_eq!(guard.validate(&guard.token()[..63]), Err(Forbidden));

        let mut longer = guard.token().to_string();
        longer.push('0');
        assert_eq!(guard.validate(&longer), Err(Forbidden));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let guard = CsrfGuard::generate();
        let debug = format!("{guard:?}");
        assert!(!debug.contains(guard.token()));
    }
}

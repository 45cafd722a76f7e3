//! Browser-based credential setup for command-line tools
//!
//! Runs a short-lived loopback HTTP listener, opens the user's browser at
//! it, and waits for the user to enter an account name, client ID, and API
//! key. Submitted credentials are checked by a `CredentialValidator`,
//! written to a `keystore::SecretStore`, and returned to the caller once the
//! browser confirms completion.
//!
//! Flow:
//! 1. Caller builds a `SetupServer` and awaits `start(cancel)`
//! 2. Browser loads `/` (setup form with the per-flow CSRF token)
//! 3. Optional test call to `/validate`
//! 4. `/submit` validates, persists, and remembers the result
//! 5. `/success` confirms from server-held state and fires `/complete`
//! 6. `start` returns the `SetupResult` and tears the listener down

pub mod browser;
pub mod config;
pub mod csrf;
pub mod error;
pub mod flow;
pub mod handlers;
pub mod metrics;
pub mod pages;
pub mod rate_limit;
pub mod server;
pub mod validation;

#[cfg(test)]
mod testing;

pub use browser::{BrowserError, BrowserLauncher, SystemBrowser};
pub use config::{RateLimitConfig, SetupConfig};
pub use csrf::CsrfGuard;
pub use error::{Error, Result};
pub use flow::{FlowPhase, SetupResult};
pub use rate_limit::{RateLimitExceeded, RateLimiter};
pub use server::SetupServer;
pub use validation::{CheckedCredentials, CredentialValidator, ValidationError, ValidatorError};

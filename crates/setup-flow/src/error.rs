//! Lifecycle errors returned by `SetupServer::start`
//!
//! Per-request failures (bad CSRF token, rate limiting, malformed bodies,
//! rejected credentials) are written straight into HTTP responses by the
//! handlers and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to bind setup listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error("setup cancelled by caller")]
    Cancelled,

    #[error("setup cancelled")]
    FlowCancelled,

    #[error("setup listener failed: {0}")]
    Server(String),
}

/// Result alias using the setup lifecycle Error
pub type Result<T> = std::result::Result<T, Error>;

//! Listener and rate-limit settings for one setup flow

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::Deserialize;

/// Settings for the ephemeral setup listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// Address the listener binds to. The port is always OS-assigned.
    pub bind_addr: IpAddr,
    /// Per-request deadline applied by the HTTP layer
    pub request_timeout_secs: u64,
    /// Upper bound on graceful shutdown once the flow has finished
    pub drain_timeout_secs: u64,
    pub rate_limit: RateLimitConfig,
}

/// Fixed-window limits applied per client and endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_secs: u64,
    /// How often the background sweep evicts expired windows
    pub cleanup_interval_secs: u64,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            request_timeout_secs: 30,
            drain_timeout_secs: 5,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window_secs: 15 * 60,
            cleanup_interval_secs: 60,
        }
    }
}

impl SetupConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

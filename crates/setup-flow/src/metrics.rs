//! Counters for the setup endpoints
//!
//! - `setup_requests_total` (counter): labels `endpoint`, `outcome`
//! - `setup_rejections_total` (counter): label `reason`
//!
//! No recorder is installed by this crate; without one these calls are no-ops.

/// Record a handled request on a mutating endpoint.
pub fn record_request(endpoint: &'static str, outcome: &'static str) {
    metrics::counter!("setup_requests_total", "endpoint" => endpoint, "outcome" => outcome)
        .increment(1);
}

/// Record a request rejected by the CSRF guard, rate limiter, or body decoder.
pub fn record_rejection(reason: &'static str) {
    metrics::counter!("setup_rejections_total", "reason" => reason).increment(1);
}

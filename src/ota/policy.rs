use serde::{Deserialize, Serialize};

/// Fixed retry and wait constants for the two retry points (initial request,
/// per-chunk stall) and the quiescence period between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra request attempts allowed when the status is 0.
    pub request_retry_count: u32,
    pub request_retry_delay_ms: u32,
    /// Consecutive empty reads tolerated; one more fails the download.
    pub stall_limit: u32,
    pub stall_backoff_ms: u32,
    /// Wait after ending a session before beginning the next.
    pub inter_request_cooldown_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_retry_count: 1,
            request_retry_delay_ms: 3000,
            stall_limit: 10,
            stall_backoff_ms: 100,
            inter_request_cooldown_ms: 5000,
        }
    }
}

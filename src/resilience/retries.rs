//! Retry policy for upstream dispatch.
//!
//! # Responsibilities
//! - Determine if a request may be retried (idempotent methods only)
//! - Bound attempts and compute the delay between them
//!
//! # Design Decisions
//! - Never retry POST/PUT/DELETE/PATCH
//! - Only connection failures are retried; an upstream that answered, or
//!   timed out after accepting the request, is not asked again
//! - Jittered backoff prevents thundering herd

use std::time::Duration;

use axum::http::Method;

use crate::config::schema::RetryConfig;
use crate::resilience::backoff::calculate_backoff;

/// Methods safe to send twice.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Whether a failed attempt may be repeated.
pub fn is_retryable(method: &Method, connection_error: bool) -> bool {
    connection_error && is_idempotent(method)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Total attempts allowed for `method`, including the first.
    pub fn max_attempts_for(&self, method: &Method) -> u32 {
        if self.enabled && is_idempotent(method) {
            self.max_attempts
        } else {
            1
        }
    }

    /// Delay before the attempt following attempt number `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold the connect, upstream response and whole-request deadlines
//! - Wrap upstream calls so a slow service cannot hold a request forever
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out upstream calls return 504, connect failures 502

use std::future::Future;
use std::time::Duration;

use crate::config::schema::TimeoutConfig;

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// TCP connect to an upstream.
    pub connect: Duration,
    /// Upstream response headers after the request is sent.
    pub upstream: Duration,
    /// Whole inbound request at the gateway.
    pub request: Duration,
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_millis(config.connect_ms),
            upstream: Duration::from_millis(config.upstream_ms),
            request: Duration::from_secs(config.request_secs),
        }
    }
}

/// Upstream deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Elapsed(deadline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_elapses() {
        let result = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert_eq!(result, Err(Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_fast_future_completes() {
        let result = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_from_config() {
        let timeouts = Timeouts::from(&TimeoutConfig::default());
        assert_eq!(timeouts.connect, Duration::from_millis(2_000));
        assert_eq!(timeouts.upstream, Duration::from_millis(10_000));
        assert_eq!(timeouts.request, Duration::from_secs(30));
    }
}

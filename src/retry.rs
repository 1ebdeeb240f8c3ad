use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::client::HotSearchSource;
use crate::error::CrawlError;
use crate::models::Snapshot;

/// Bounded, flat retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

/// Calls `source` up to `policy.max_attempts` times, sleeping `policy.backoff`
/// between failed attempts, then hands over to `fallback` once.
///
/// Only timeouts and upstream failures are retried. Any other error is
/// returned as soon as it is seen.
pub fn fetch_with_retry<S, F>(
    source: &S,
    fallback: Option<&dyn HotSearchSource>,
    policy: &RetryPolicy,
    mut sleep: F,
) -> Result<Snapshot, CrawlError>
where
    S: HotSearchSource + ?Sized,
    F: FnMut(Duration),
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        info!(action = "attempt", component = "retry", source = source.name(), attempt, max_attempts, "Fetching snapshot");

        match source.fetch() {
            Ok(snapshot) => {
                info!(
                    action = "complete",
                    component = "retry",
                    source = source.name(),
                    attempt,
                    entry_count = snapshot.len(),
                    duration_ms = start_time.elapsed().as_millis(),
                    "Snapshot fetched"
                );
                return Ok(snapshot);
            }
            Err(e) if e.is_retryable() => {
                warn!(action = "attempt", component = "retry", source = source.name(), attempt, error = %e, "Attempt failed");
                last_error = Some(e);
                if attempt < max_attempts {
                    sleep(policy.backoff);
                }
            }
            Err(e) => return Err(e),
        }
    }

    let last = last_error.unwrap_or_else(|| CrawlError::upstream(None, "no attempt was made"));

    let Some(fallback) = fallback else {
        error!(action = "exhausted", component = "retry", attempts = max_attempts, "All attempts failed, no fallback configured");
        return Err(CrawlError::FetchExhausted {
            attempts: max_attempts,
            last: Box::new(last),
        });
    };

    info!(action = "fallback", component = "retry", source = fallback.name(), primary_error = %last, "Primary source exhausted, trying fallback");
    fallback.fetch().map_err(|e| {
        error!(action = "exhausted", component = "retry", source = fallback.name(), error = %e, "Fallback failed");
        CrawlError::FetchExhausted {
            attempts: max_attempts,
            last: Box::new(e),
        }
    })
}

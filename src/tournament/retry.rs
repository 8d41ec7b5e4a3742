use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::error::TournamentError;
use super::storage::StoreError;

const LOG_TARGET: &str = "tournament::retry";

/// Bounded exponential backoff with full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Upper bound of the sleep before retry number `attempt` (1-based).
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Re-runs `op` while it fails with a store conflict, up to the policy bound.
///
/// Any other error is returned immediately.
pub async fn retry_on_conflict<T, F, Fut>(
    policy: &RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, TournamentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TournamentError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(TournamentError::Store(StoreError::Conflict)) if attempt < policy.max_attempts => {
                let delay = policy.jittered_delay(attempt);
                debug!(
                    target: LOG_TARGET,
                    op = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "store conflict; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

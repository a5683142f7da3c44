use std::time::Duration;
use tokio::time::sleep;

use super::{Journal, JournalError, PersistedEvent};

// ============================================================================
// Journal Append Retry
// ============================================================================
//
// A failed append is retried with exponential backoff before it is surfaced
// as an engine fault. Only appends are retried: they are idempotent here
// because the journal rejects a batch whose sequence does not line up, so a
// retry after an ambiguous failure cannot double-write.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries at all; useful in tests that assert on the first failure.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Append `batch` with bounded exponential backoff.
pub async fn append_with_retry(
    journal: &dyn Journal,
    actor_id: &str,
    batch: &[PersistedEvent],
    config: &RetryConfig,
) -> Result<(), JournalError> {
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match journal.append(actor_id, batch.to_vec()).await {
            Ok(()) => {
                if attempt > 1 {
                    tracing::info!(
                        actor_id = %actor_id,
                        attempt = attempt,
                        "Journal append succeeded after retry"
                    );
                }
                return Ok(());
            }
            Err(error) => {
                if attempt >= config.max_attempts {
                    tracing::error!(
                        actor_id = %actor_id,
                        attempt = attempt,
                        error = %error,
                        "Journal append failed after all retries"
                    );
                    return Err(error);
                }

                tracing::warn!(
                    actor_id = %actor_id,
                    attempt = attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "Journal append failed, retrying after delay"
                );

                sleep(delay).await;
                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier) as u64,
                )
                .min(config.max_delay);
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Used while bootstrapping long-lived clients (document store session, object
// store container probe). The message path never retries in-process; it
// relies on broker redelivery instead.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub multiplier: f64,
}

impl RetryConfig {
    /// Budget for waiting on backing services at process start.
    pub fn startup() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Still failing after `max_attempts`
    Failed(E),
    /// Failed with an error that retrying cannot fix
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(err) | RetryResult::PermanentFailure(err) => Err(err),
        }
    }
}

/// Classifies an error as worth retrying.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Retry `operation` with exponential backoff while it fails transiently.
pub async fn retry_on_transient<F, Fut, T, E>(config: RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(error = %error, "Permanent failure, not retrying");
                return RetryResult::PermanentFailure(error);
            }
            Err(error) if attempt >= config.max_attempts => {
                tracing::error!(attempt, error = %error, "Operation failed after all retries");
                return RetryResult::Failed(error);
            }
            Err(error) => {
                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying after delay"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

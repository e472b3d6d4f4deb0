use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the broker producer. After `failure_threshold` consecutive failures
// the breaker opens and calls fail fast; once `open_for` has elapsed a trial
// call is let through (HalfOpen) and `success_threshold` successes close it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding exported to Prometheus.
    pub fn as_gauge(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call
    pub open_for: Duration,
    /// Successes in HalfOpen needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<Mutex<Inner>>,
    config: CircuitBreakerConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("{0}")]
    OperationFailed(E),
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.admit().await?;

        let result = operation.await;
        let mut inner = self.inner.lock().await;
        match result {
            Ok(value) => {
                self.on_success(&mut inner);
                Ok(value)
            }
            Err(err) => {
                self.on_failure(&mut inner);
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
        if elapsed < self.config.open_for {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        tracing::info!(breaker = self.name, "Circuit breaker half-open, allowing trial call");
        inner.state = CircuitState::HalfOpen;
        inner.successes = 0;
        Ok(())
    }

    fn on_success(&self, inner: &mut Inner) {
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.config.success_threshold {
                    tracing::info!(breaker = self.name, "Circuit breaker closed");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Closed => inner.failures = 0,
            // a call admitted before another task opened the circuit
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner) {
        inner.failures += 1;
        match inner.state {
            CircuitState::Closed if inner.failures >= self.config.failure_threshold => {
                tracing::warn!(
                    breaker = self.name,
                    failures = inner.failures,
                    "Circuit breaker opened"
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = self.name, "Trial call failed, circuit breaker re-opened");
                inner.state = CircuitState::Open;
                inner.successes = 0;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_needs_three_trial_successes() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                open_for: Duration::ZERO,
                ..CircuitBreakerConfig::default()
            },
        );
        for _ in 0..5 {
            let _ = cb.call(async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        for _ in 0..2 {
            cb.call(async { Ok::<_, &str>(()) }).await.unwrap();
            assert_eq!(cb.state().await, CircuitState::HalfOpen);
        }
        cb.call(async { Ok::<_, &str>(()) }).await.unwrap();
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    fn breaker(failure_threshold: u32, open_for: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold,
                open_for,
                success_threshold: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let cb = breaker(3, Duration::from_secs(60));

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>("boom") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed("boom"))));
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = breaker(2, Duration::from_secs(60));

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        let _ = cb.call(async { Ok::<_, &str>(()) }).await;
        let _ = cb.call(async { Err::<(), _>("boom") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_circuit() {
        let cb = breaker(1, Duration::from_millis(50));

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_circuit() {
        let cb = breaker(1, Duration::from_millis(50));

        let _ = cb.call(async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = cb.call(async { Err::<(), _>("still down") }).await;

        assert_eq!(cb.state().await, CircuitState::Open);
    }
}

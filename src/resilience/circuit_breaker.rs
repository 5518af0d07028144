//! Per-service circuit breaker: CLOSED -> OPEN -> HALF_OPEN -> CLOSED.
//!
//! CLOSED -> OPEN once `consecutive_failures >= failure_threshold`.
//! OPEN -> HALF_OPEN once `recovery_timeout` has elapsed since the last failure;
//! the next call is admitted as a probe.
//! HALF_OPEN -> CLOSED after `success_threshold` consecutive probe successes.
//! HALF_OPEN -> OPEN on any probe failure, resetting the failure counter to 1.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::models::CircuitState;

pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
}

/// Process-wide, one instance per external service name.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn status(&self) -> (CircuitState, u32) {
        let inner = self.inner.lock().unwrap();
        (inner.state, inner.consecutive_failures)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.last_failure = None;
    }

    /// Checks admission and, if allowed, invokes `f`, recording the outcome.
    /// Only errors for which `trips_breaker()` is true affect the breaker's
    /// counters; other errors (validation, auth) pass through untouched.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.admit()?;
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if err.trips_breaker() {
                    self.record_failure();
                } else {
                    // Non-transient errors flow through without touching the breaker.
                }
                Err(err)
            }
        }
    }

    fn admit(&self) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.last_failure.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    Ok(())
                } else {
                    let retry_after = self.config.recovery_timeout.saturating_sub(elapsed);
                    Err(AppError::CircuitOpen {
                        service_name: self.name.clone(),
                        retry_after_seconds: retry_after.as_secs(),
                        failure_count: inner.consecutive_failures,
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.last_failure = None;
                }
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.consecutive_failures = 1;
                inner.consecutive_successes = 0;
                inner.last_failure = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {
                inner.last_failure = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32, recovery_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "llm",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold: 2,
                recovery_timeout,
            },
        )
    }

    async fn failing() -> Result<(), AppError> {
        Err(AppError::ServiceUnavailable("down".into()))
    }

    async fn succeeding() -> Result<(), AppError> {
        Ok(())
    }

    #[tokio::test]
    async fn trips_open_after_failure_threshold_consecutive_failures() {
        let cb = breaker(5, Duration::from_secs(60));
        for _ in 0..4 {
            let _ = cb.call(failing).await;
            assert_eq!(cb.status().0, CircuitState::Closed);
        }
        let _ = cb.call(failing).await;
        assert_eq!(cb.status().0, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_fails_fast_with_circuit_open_before_recovery_timeout() {
        let cb = breaker(1, Duration::from_secs(60));
        let _ = cb.call(failing).await;
        assert_eq!(cb.status().0, CircuitState::Open);

        let result = cb.call(succeeding).await;
        assert!(matches!(result, Err(AppError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold_probes() {
        let cb = breaker(1, Duration::from_millis(10));
        let _ = cb.call(failing).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cb.call(succeeding).await.is_ok());
        assert_eq!(cb.status().0, CircuitState::HalfOpen);
        assert!(cb.call(succeeding).await.is_ok());
        assert_eq!(cb.status().0, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_any_probe_failure() {
        let cb = breaker(1, Duration::from_millis(10));
        let _ = cb.call(failing).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cb.call(succeeding).await.is_ok());
        assert_eq!(cb.status().0, CircuitState::HalfOpen);
        let _ = cb.call(failing).await;
        assert_eq!(cb.status().0, CircuitState::Open);
    }

    #[tokio::test]
    async fn reset_returns_to_closed_with_zero_counters() {
        let cb = breaker(1, Duration::from_secs(60));
        let _ = cb.call(failing).await;
        assert_eq!(cb.status().0, CircuitState::Open);
        cb.reset();
        assert_eq!(cb.status(), (CircuitState::Closed, 0));
    }

    #[tokio::test]
    async fn non_transient_errors_do_not_trip_the_breaker() {
        let cb = breaker(1, Duration::from_secs(60));
        let result = cb.call(|| async { Err(AppError::Validation("bad input".into())) }).await;
        assert!(result.is_err());
        assert_eq!(cb.status(), (CircuitState::Closed, 0));
    }
}

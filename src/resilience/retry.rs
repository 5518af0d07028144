//! Exponential-backoff retry policy, composed around (never inside) the circuit
//! breaker: a `CircuitOpen` error is never retried, so a retry burst that keeps
//! tripping the breaker aborts immediately once it opens.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::AppError;
use crate::models::RetryPolicyName;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn preset(name: RetryPolicyName) -> Self {
        match name {
            RetryPolicyName::Default => Self {
                max_attempts: 3,
                base_delay: Duration::from_millis(500),
                min_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                jitter_fraction: 0.2,
            },
            RetryPolicyName::Aggressive => Self {
                max_attempts: 5,
                base_delay: Duration::from_millis(200),
                min_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(5),
                jitter_fraction: 0.3,
            },
            RetryPolicyName::Conservative => Self {
                max_attempts: 2,
                base_delay: Duration::from_secs(1),
                min_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                jitter_fraction: 0.1,
            },
            RetryPolicyName::Api => Self {
                max_attempts: 4,
                base_delay: Duration::from_millis(750),
                min_delay: Duration::from_millis(750),
                max_delay: Duration::from_secs(20),
                jitter_fraction: 0.25,
            },
            RetryPolicyName::Database => Self {
                max_attempts: 3,
                base_delay: Duration::from_millis(100),
                min_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                jitter_fraction: 0.1,
            },
        }
    }

    fn delay_for_attempt(&self, attempt: u32, rate_limit_extend: bool) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let mut ceiling = self.max_delay.as_secs_f64();
        // Rate-limit errors extend the backoff ceiling, per the resilience design.
        if rate_limit_extend {
            ceiling *= 3.0;
        }
        let capped = exp.min(ceiling).max(self.min_delay.as_secs_f64());
        let jitter = capped * self.jitter_fraction * rand::thread_rng().gen_range(-1.0..=1.0);
        Duration::from_secs_f64((capped + jitter).max(0.0))
    }

    /// Runs `f`, retrying per this policy while the error is retryable.
    /// `CircuitOpen` and authentication/validation errors are never retried.
    pub async fn call<T, F, Fut>(&self, service_name: &str, mut f: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let is_circuit_open = matches!(err, AppError::CircuitOpen { .. });
                    if is_circuit_open || !err.is_retryable() || attempt + 1 >= self.max_attempts {
                        if attempt > 0 {
                            tracing::warn!(service = service_name, attempts = attempt + 1, error = %err, "retry exhausted");
                        }
                        return Err(err);
                    }
                    let rate_limited = matches!(err, AppError::RateLimit { .. });
                    let delay = self.delay_for_attempt(attempt, rate_limited);
                    tracing::warn!(service = service_name, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let policy = RetryPolicy::preset(RetryPolicyName::Default);
        let calls = AtomicU32::new(0);
        let result = policy
            .call("llm", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, AppError>(42) }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let mut policy = RetryPolicy::preset(RetryPolicyName::Aggressive);
        policy.base_delay = Duration::from_millis(1);
        policy.min_delay = Duration::from_millis(1);
        let calls = AtomicU32::new(0);
        let result = policy
            .call("ocr", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::Timeout) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts);
    }

    #[tokio::test]
    async fn circuit_open_is_never_retried() {
        let policy = RetryPolicy::preset(RetryPolicyName::Default);
        let calls = AtomicU32::new(0);
        let result = policy
            .call("llm", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(AppError::CircuitOpen {
                        service_name: "llm".into(),
                        retry_after_seconds: 60,
                        failure_count: 5,
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_errors_are_never_retried() {
        let policy = RetryPolicy::preset(RetryPolicyName::Default);
        let calls = AtomicU32::new(0);
        let _ = policy
            .call("llm", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(AppError::Validation("bad".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! Circuit breaker trip/recovery as an externally observable property: after
//! enough consecutive failures, calls fail fast with `CircuitOpen` instead of
//! reaching the (still-failing) collaborator; after the recovery window and a
//! run of probe successes, the breaker closes again.

use std::time::Duration;

use docbridge::error::AppError;
use docbridge::resilience::{CircuitBreaker, CircuitBreakerConfig};

fn failing() -> Result<(), AppError> {
    Err(AppError::ServiceUnavailable("llm down".into()))
}

#[tokio::test]
async fn breaker_opens_after_threshold_then_half_opens_and_closes_on_recovery() {
    let breaker = CircuitBreaker::new(
        "test-llm",
        CircuitBreakerConfig { failure_threshold: 3, success_threshold: 2, recovery_timeout: Duration::from_millis(20) },
    );

    for _ in 0..3 {
        let result = breaker.call(|| async { failing() }).await;
        assert!(result.is_err());
    }

    // Breaker is now open: the call is rejected before it would reach the collaborator.
    let rejected = breaker.call(|| async { Ok::<_, AppError>("unreachable") }).await;
    assert!(matches!(rejected, Err(AppError::CircuitOpen { .. })));

    tokio::time::sleep(Duration::from_millis(30)).await;

    // Past the recovery window: the next calls are admitted as half-open probes.
    for _ in 0..2 {
        let probe = breaker.call(|| async { Ok::<_, AppError>("recovered") }).await;
        assert_eq!(probe.unwrap(), "recovered");
    }

    // Enough consecutive probe successes close the breaker; a normal call is now fast-pathed.
    let closed_call = breaker.call(|| async { Ok::<_, AppError>("still fine") }).await;
    assert_eq!(closed_call.unwrap(), "still fine");
}

/// Validation-style errors never trip the breaker — only errors flagged
/// `trips_breaker()` (service/network failures) count toward the threshold.
#[tokio::test]
async fn non_transient_errors_do_not_trip_the_breaker() {
    let breaker = CircuitBreaker::new("test-llm", CircuitBreakerConfig { failure_threshold: 1, ..CircuitBreakerConfig::default() });

    for _ in 0..5 {
        let result = breaker.call(|| async { Err::<(), _>(AppError::Validation("bad request".into())) }).await;
        assert!(result.is_err());
    }

    let (state, failures) = breaker.status();
    assert_eq!(state, docbridge::models::CircuitState::Closed);
    assert_eq!(failures, 0);
}

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use retry::RetryPolicy;

use std::collections::HashMap;
use std::sync::Mutex;

/// Process-wide registry of per-service circuit breakers, created lazily on
/// first use and shared by every call to that service for the life of the process.
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, service_name: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(service_name.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(service_name, CircuitBreakerConfig::default())))
            .clone()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

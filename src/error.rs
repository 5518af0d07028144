//! Domain-level error taxonomy shared across the pipeline, storage, and queue layers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Abstract error kinds per the error handling design: validation/not-found/authn
/// are never retried, rate-limit/timeout/service-unavailable feed the resilience
/// layer, circuit-open fails fast, and processing failures carry the offending step.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimit { retry_after_seconds: u64 },

    #[error("operation timed out")]
    Timeout,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("circuit open for {service_name}, retry after {retry_after_seconds}s")]
    CircuitOpen {
        service_name: String,
        retry_after_seconds: u64,
        failure_count: u32,
    },

    #[error("processing failed at step {step}: {message}")]
    Processing { step: String, message: String },

    #[error("job {processing_id} is not completed")]
    NotCompleted { processing_id: String },

    #[error("no workers reachable")]
    NoWorkersReachable,

    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error is transient and should be retried by the resilience layer.
    /// Authentication, validation, not-found, and circuit-open errors are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimit { .. }
                | AppError::Timeout
                | AppError::ServiceUnavailable(_)
                | AppError::Connection(_)
        )
    }

    /// Whether this error should increment a circuit breaker's failure counter.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            AppError::ServiceUnavailable(_) | AppError::Timeout | AppError::Connection(_)
        )
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::RateLimit { .. } => "RATE_LIMITED",
            AppError::Timeout => "TIMEOUT",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            AppError::Processing { .. } => "PROCESSING_ERROR",
            AppError::NotCompleted { .. } => "NOT_COMPLETED",
            AppError::NoWorkersReachable => "NO_WORKERS_REACHABLE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Crypto(_) => "CRYPTO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build the uniform `{error:{code, message, details, timestamp}}` envelope.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
                timestamp: Utc::now(),
            },
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::RateLimit { retry_after_seconds } => {
                Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds }))
            }
            AppError::CircuitOpen {
                service_name,
                retry_after_seconds,
                failure_count,
            } => Some(serde_json::json!({
                "service_name": service_name,
                "retry_after_seconds": retry_after_seconds,
                "failure_count": failure_count,
            })),
            AppError::Processing { step, .. } => Some(serde_json::json!({ "step": step })),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

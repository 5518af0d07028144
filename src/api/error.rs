//! Maps the domain `AppError` taxonomy onto HTTP responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::AppError;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        Self(AppError::from(err))
    }
}

impl From<crate::crypto::CryptoError> for ApiError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        Self(AppError::from(err))
    }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        AppError::Forbidden => StatusCode::FORBIDDEN,
        AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Connection(_) => StatusCode::BAD_GATEWAY,
        AppError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Processing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::NotCompleted { .. } => StatusCode::CONFLICT,
        AppError::NoWorkersReachable => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Database(crate::db::DatabaseError::ConstraintViolation(_)) => StatusCode::CONFLICT,
        AppError::Database(_) | AppError::Crypto(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let mut envelope = self.0.to_envelope();

        // Internal failures may carry storage/crypto detail that shouldn't reach
        // the client; log the real error, return a generic one.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal API error");
            envelope.error.message = "an internal error occurred".to_string();
            envelope.error.details = None;
        }

        let mut response = (status, Json(envelope)).into_response();
        if let AppError::RateLimit { retry_after_seconds } | AppError::CircuitOpen { retry_after_seconds, .. } = &self.0 {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn not_completed_maps_to_409() {
        assert_eq!(status_of(AppError::NotCompleted { processing_id: "abc".into() }), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(status_of(AppError::NotFound("job".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(status_of(AppError::Validation("bad".into())), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rate_limit_carries_retry_after_header() {
        let response = ApiError::from(AppError::RateLimit { retry_after_seconds: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn no_workers_reachable_maps_to_503() {
        assert_eq!(status_of(AppError::NoWorkersReachable), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn database_errors_map_to_500() {
        let err = AppError::Internal("sqlite path leaked: /data/secret.db".into());
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

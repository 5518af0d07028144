//! Per-IP rate limiting for the feedback submission route (10/min by default,
//! per `ApiContext::new`). Applied only to that route, not globally, since
//! admin and status-polling endpoints have no such requirement.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;

use super::super::error::ApiError;
use super::super::types::ApiContext;

pub async fn limit_feedback(req: Request, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request, next: Next) -> Result<Response, ApiError> {
    let ctx = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or_else(|| AppError::Internal("missing API context".into()))?;

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    {
        let mut limiter = ctx
            .feedback_rate_limiter
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".into()))?;
        limiter.check(ip).map_err(|retry_after_seconds| AppError::RateLimit { retry_after_seconds })?;
    }

    Ok(next.run(req).await)
}

//! Connectivity check for load balancers / uptime probes.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database_reachable: bool,
    pub workers_available: bool,
}

/// `GET /api/health`.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let database_reachable = ctx.pool.get().is_ok();

    Ok(Json(HealthResponse {
        status: if database_reachable { "ok" } else { "degraded" },
        database_reachable,
        workers_available: ctx.queue.workers_available(),
    }))
}

//! Post-completion feedback intake: `POST /api/feedback`, existence check, and
//! the best-effort cleanup endpoint for callers who leave without submitting.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::feedback as feedback_repo;
use crate::error::AppError;
use crate::jobs::lifecycle;
use crate::models::NewFeedback;

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub id: i64,
    pub processing_id: String,
}

fn parse_processing_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::from(AppError::Validation(format!("invalid processing id: {raw}"))))
}

/// `POST /api/feedback` — rate-limited to 10/min/IP by the
/// [`crate::api::middleware::rate_limit`] layer this route is mounted behind.
pub async fn submit(State(ctx): State<ApiContext>, Json(new): Json<NewFeedback>) -> Result<Json<FeedbackResponse>, ApiError> {
    new.validate()?;

    let mut conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let feedback = feedback_repo::insert_with_consent_clearing(&mut conn, &new)?;

    if new.data_consent_given {
        if let Err(err) = ctx.feedback_queue.enqueue(feedback.id).await {
            tracing::warn!(feedback_id = feedback.id, error = %err, "failed to enqueue feedback analysis");
        }
    }

    Ok(Json(FeedbackResponse { id: feedback.id, processing_id: feedback.processing_id.to_string() }))
}

#[derive(Serialize)]
pub struct FeedbackExistsResponse {
    pub exists: bool,
}

/// `GET /api/feedback/{processing_id}` — existence only, never the content.
pub async fn get(State(ctx): State<ApiContext>, Path(processing_id): Path<String>) -> Result<Json<FeedbackExistsResponse>, ApiError> {
    let processing_id = parse_processing_id(&processing_id)?;
    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let exists = feedback_repo::exists_for_processing_id(&conn, &processing_id)?;
    Ok(Json(FeedbackExistsResponse { exists }))
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub cleared: bool,
}

/// `POST /api/feedback/cleanup/{processing_id}` — best-effort; a job that's
/// already gone or already cleared still reports success, since the caller's
/// goal (no lingering content) is already satisfied.
pub async fn cleanup(State(ctx): State<ApiContext>, Path(processing_id): Path<String>) -> Result<Json<CleanupResponse>, ApiError> {
    let processing_id = parse_processing_id(&processing_id)?;
    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;

    let job = crate::db::repository::job::get_job_by_processing_id(&conn, &ctx.cipher, &processing_id)?;
    match job {
        Some(job) => {
            lifecycle::clear_content(&conn, job.id)?;
            Ok(Json(CleanupResponse { cleared: true }))
        }
        None => Ok(Json(CleanupResponse { cleared: false })),
    }
}

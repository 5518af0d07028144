//! Process control: start, status, result, and the anonymized active overview.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::job as job_repo;
use crate::error::AppError;
use crate::jobs::lifecycle;
use crate::models::Job;

#[derive(Deserialize, Default)]
pub struct StartProcessBody {
    pub target_language: Option<String>,
}

#[derive(Serialize)]
pub struct StartProcessResponse {
    pub processing_id: String,
    pub status: &'static str,
    pub task_id: String,
}

fn parse_processing_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::from(AppError::Validation(format!("invalid processing id: {raw}"))))
}

/// `POST /api/process/{processing_id}` — enqueues an existing PENDING job.
/// A duplicate call on an already-QUEUED/RUNNING job is reported as a 409
/// rather than the generic 400 a bare validation failure would get, since the
/// caller's request was well-formed, just stale.
pub async fn start(
    State(ctx): State<ApiContext>,
    Path(processing_id): Path<String>,
    body: Option<Json<StartProcessBody>>,
) -> Result<Response, ApiError> {
    let processing_id = parse_processing_id(&processing_id)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let job = job_repo::get_job_by_processing_id(&conn, &ctx.cipher, &processing_id)?
        .ok_or_else(|| ApiError::from(AppError::NotFound(format!("job {processing_id}"))))?;

    if let Some(target_language) = &body.target_language {
        job_repo::set_target_language(&conn, job.id, Some(target_language.as_str()))?;
    }

    match lifecycle::enqueue(&conn, ctx.queue.as_ref(), job.id).await {
        Ok(task_id) => Ok(Json(StartProcessResponse {
            processing_id: processing_id.to_string(),
            status: "QUEUED",
            task_id,
        })
        .into_response()),
        Err(AppError::Validation(message)) if message.contains("not PENDING") => {
            let envelope = AppError::Validation(message).to_envelope();
            Ok((StatusCode::CONFLICT, Json(envelope)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub processing_id: String,
    pub status: crate::models::ApiStatus,
    pub progress_percent: i32,
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /api/process/{processing_id}/status`.
pub async fn status(State(ctx): State<ApiContext>, Path(processing_id): Path<String>) -> Result<Json<StatusResponse>, ApiError> {
    let processing_id = parse_processing_id(&processing_id)?;
    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let view = lifecycle::get_status(&conn, &ctx.cipher, &processing_id)?;

    Ok(Json(StatusResponse {
        processing_id: view.processing_id.to_string(),
        status: view.status,
        progress_percent: view.progress_percent,
        current_step: view.current_step,
        error: view.error,
    }))
}

/// `GET /api/process/{processing_id}/result` — `409` via `AppError::NotCompleted`
/// if the job hasn't reached `COMPLETED` yet.
pub async fn result(State(ctx): State<ApiContext>, Path(processing_id): Path<String>) -> Result<Json<Job>, ApiError> {
    let processing_id = parse_processing_id(&processing_id)?;
    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let job = lifecycle::get_result(&conn, &ctx.cipher, &processing_id)?;
    Ok(Json(job))
}

#[derive(Serialize)]
pub struct ActiveJobEntry {
    pub processing_id: String,
    pub status: crate::models::JobStatus,
    pub progress_percent: i32,
    pub current_step: Option<String>,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

/// `GET /api/process/active` — anonymized overview: no filename or content.
pub async fn active(State(ctx): State<ApiContext>) -> Result<Json<Vec<ActiveJobEntry>>, ApiError> {
    let conn = ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))?;
    let jobs = job_repo::list_active(&conn)?;
    Ok(Json(
        jobs.into_iter()
            .map(|j| ActiveJobEntry {
                processing_id: j.processing_id.to_string(),
                status: j.status,
                progress_percent: j.progress_percent,
                current_step: j.current_step,
                uploaded_at: j.uploaded_at,
            })
            .collect(),
    ))
}

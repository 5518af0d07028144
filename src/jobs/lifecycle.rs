//! Job creation, queueing, and status/result projections. Everything that
//! happens once a job is RUNNING belongs to the pipeline executor; this module
//! only owns the edges: intake, handoff to the queue, and reading state back.

use rusqlite::Connection;
use uuid::Uuid;

use crate::crypto::Cipher;
use crate::db::repository::job as job_repo;
use crate::db::DatabaseError;
use crate::error::AppError;
use crate::models::enums::{ApiStatus, JobStatus, MimeClass};
use crate::models::Job;
use crate::queue::TaskQueue;

pub struct UploadedFile {
    pub filename: String,
    pub mime_class: MimeClass,
    pub bytes: Vec<u8>,
    pub pipeline_config: serde_json::Value,
    pub ocr_config: serde_json::Value,
    pub target_language: Option<String>,
}

/// Persists a PENDING job with the file payload and content fields encrypted
/// per the storage layer's transparent field-encryption facility.
pub fn create_job(conn: &Connection, cipher: &Cipher, upload: UploadedFile) -> Result<Job, AppError> {
    job_repo::insert_job(
        conn,
        cipher,
        job_repo::NewJob {
            filename: upload.filename,
            mime_class: upload.mime_class,
            file_bytes: upload.bytes,
            pipeline_config: upload.pipeline_config,
            ocr_config: upload.ocr_config,
            target_language: upload.target_language,
        },
    )
    .map_err(AppError::from)
}

/// Hands a PENDING job to the queue. Verifies a worker is reachable first so a
/// broker outage surfaces as a refusal rather than a job stuck QUEUED forever.
/// A duplicate call on an already-QUEUED/RUNNING job loses the CAS race and
/// returns `Validation` without producing a second broker task.
pub async fn enqueue(conn: &Connection, queue: &dyn TaskQueue, job_id: i64) -> Result<String, AppError> {
    if !queue.workers_available() {
        return Err(AppError::NoWorkersReachable);
    }
    let task_id = queue.enqueue(job_id, "ocr_queue").await?;
    if !job_repo::mark_queued(conn, job_id, &task_id)? {
        return Err(AppError::Validation("job is not PENDING, cannot be queued".into()));
    }
    Ok(task_id)
}

#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub processing_id: Uuid,
    pub status: ApiStatus,
    pub progress_percent: i32,
    pub current_step: Option<String>,
    pub error: Option<String>,
}

pub fn get_status(conn: &Connection, cipher: &Cipher, processing_id: &Uuid) -> Result<JobStatusView, AppError> {
    let job = find_job(conn, cipher, processing_id)?;
    Ok(JobStatusView {
        processing_id: job.processing_id,
        status: job.api_status(),
        progress_percent: job.progress_percent,
        current_step: job.current_step,
        error: job.error_message.or(job.termination_message),
    })
}

/// Returns the full result bundle only when the job is COMPLETED; any other
/// status (including TERMINATED, which the HTTP layer still exposes via
/// status/result-404 rather than this call) is a typed `NotCompleted` error.
pub fn get_result(conn: &Connection, cipher: &Cipher, processing_id: &Uuid) -> Result<Job, AppError> {
    let job = find_job(conn, cipher, processing_id)?;
    if job.status != JobStatus::Completed {
        return Err(AppError::NotCompleted { processing_id: processing_id.to_string() });
    }
    Ok(job)
}

/// Nulls content fields and sets `content_cleared_at`; safe to call repeatedly.
pub fn clear_content(conn: &Connection, job_id: i64) -> Result<(), AppError> {
    job_repo::clear_content(conn, job_id).map_err(AppError::from)
}

fn find_job(conn: &Connection, cipher: &Cipher, processing_id: &Uuid) -> Result<Job, AppError> {
    job_repo::get_job_by_processing_id(conn, cipher, processing_id)?
        .ok_or_else(|| AppError::NotFound(format!("job {processing_id}")))
}

/// Periodic safety-net sweep: clears content for terminal jobs older than
/// `cutoff` that never received a feedback row.
pub fn sweep_stale_uncleaned(conn: &Connection, cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize, DatabaseError> {
    let ids = job_repo::find_stale_uncleaned(conn, cutoff)?;
    for id in &ids {
        job_repo::clear_content(conn, *id)?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeQueue {
        available: AtomicBool,
    }

    #[async_trait]
    impl TaskQueue for FakeQueue {
        async fn enqueue(&self, job_id: i64, _queue_name: &str) -> Result<String, AppError> {
            Ok(format!("task-{job_id}"))
        }
        fn workers_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }
    }

    fn setup() -> (Connection, Cipher) {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        (conn, Cipher::disabled())
    }

    fn sample_upload() -> UploadedFile {
        UploadedFile {
            filename: "arztbrief.pdf".into(),
            mime_class: MimeClass::Pdf,
            bytes: b"%PDF-1.4".to_vec(),
            pipeline_config: serde_json::json!({}),
            ocr_config: serde_json::json!({}),
            target_language: Some("en".into()),
        }
    }

    #[tokio::test]
    async fn enqueue_fails_without_a_worker() {
        let (conn, cipher) = setup();
        let job = create_job(&conn, &cipher, sample_upload()).unwrap();
        let queue = FakeQueue { available: AtomicBool::new(false) };
        let result = enqueue(&conn, &queue, job.id).await;
        assert!(matches!(result, Err(AppError::NoWorkersReachable)));
    }

    #[tokio::test]
    async fn duplicate_enqueue_only_transitions_once() {
        let (conn, cipher) = setup();
        let job = create_job(&conn, &cipher, sample_upload()).unwrap();
        let queue = FakeQueue { available: AtomicBool::new(true) };

        assert!(enqueue(&conn, &queue, job.id).await.is_ok());
        let second = enqueue(&conn, &queue, job.id).await;
        assert!(matches!(second, Err(AppError::Validation(_))));
    }

    #[test]
    fn get_result_before_completion_is_not_completed_error() {
        let (conn, cipher) = setup();
        let job = create_job(&conn, &cipher, sample_upload()).unwrap();
        let result = get_result(&conn, &cipher, &job.processing_id);
        assert!(matches!(result, Err(AppError::NotCompleted { .. })));
    }

    #[test]
    fn status_reports_pending_for_a_fresh_job() {
        let (conn, cipher) = setup();
        let job = create_job(&conn, &cipher, sample_upload()).unwrap();
        let status = get_status(&conn, &cipher, &job.processing_id).unwrap();
        assert_eq!(status.status, ApiStatus::Pending);
        assert_eq!(status.progress_percent, 0);
    }
}

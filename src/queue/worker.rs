//! The per-job deadline wrapper shared by every queue backend. The executor
//! never sees a timeout; the worker wrapper races it against the whole job
//! and moves the job to TIMEOUT itself if the deadline wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;

/// Default global per-job deadline; configurable by callers via `run_with_timeout`.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(18 * 60);

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs a job end to end (OCR routing through pipeline execution).
    async fn handle(&self, job_id: i64) -> Result<(), AppError>;

    /// Invoked when `handle` didn't finish within the deadline; marks the job
    /// TIMEOUT with a diagnostic naming the step that was active.
    async fn handle_timeout(&self, job_id: i64);
}

/// Wraps one job's execution in a hard deadline.
pub async fn run_with_timeout(handler: Arc<dyn JobHandler>, job_id: i64, timeout: Duration) {
    match tokio::time::timeout(timeout, handler.handle(job_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(job_id, error = %err, "job execution failed");
        }
        Err(_) => {
            tracing::error!(job_id, timeout_secs = timeout.as_secs(), "job exceeded its deadline, marking TIMEOUT");
            handler.handle_timeout(job_id).await;
        }
    }
}

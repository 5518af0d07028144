//! Default/dev task queue: enqueuing a job spawns it directly on the tokio
//! runtime instead of pushing to a broker a separate worker process drains.
//! Useful for integration tests and single-instance deployments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::worker::{run_with_timeout, JobHandler, DEFAULT_JOB_TIMEOUT};
use super::TaskQueue;
use crate::error::AppError;

pub struct InMemoryTaskQueue {
    handler: Arc<dyn JobHandler>,
    timeout: Duration,
    available: AtomicBool,
}

impl InMemoryTaskQueue {
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            timeout: DEFAULT_JOB_TIMEOUT,
            available: AtomicBool::new(true),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Test/ops hook: simulate no workers being reachable, so `enqueue` at the
    /// lifecycle layer surfaces `NoWorkersReachable` instead of spawning.
    pub fn set_workers_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, job_id: i64, _queue_name: &str) -> Result<String, AppError> {
        let task_id = Uuid::new_v4().to_string();
        let handler = self.handler.clone();
        let timeout = self.timeout;
        tokio::spawn(async move { run_with_timeout(handler, job_id, timeout).await });
        Ok(task_id)
    }

    fn workers_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct RecordingHandler {
        tx: mpsc::UnboundedSender<i64>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn handle(&self, job_id: i64) -> Result<(), AppError> {
            let _ = self.tx.send(job_id);
            Ok(())
        }

        async fn handle_timeout(&self, _job_id: i64) {}
    }

    #[tokio::test]
    async fn enqueue_runs_the_handler_asynchronously() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = InMemoryTaskQueue::new(Arc::new(RecordingHandler { tx }));
        assert!(queue.workers_available());

        queue.enqueue(42, "ocr_queue").await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(received, Some(42));
    }

    #[tokio::test]
    async fn workers_available_toggle_is_observable() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = InMemoryTaskQueue::new(Arc::new(RecordingHandler { tx }));
        queue.set_workers_available(false);
        assert!(!queue.workers_available());
    }
}

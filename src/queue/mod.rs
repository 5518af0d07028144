//! Queue/worker bridge: hands jobs to workers and bridges results back to
//! status polling. `InMemoryTaskQueue` is the default/dev backend (direct
//! `tokio::spawn`); a Redis-backed backend is available behind the
//! `redis-backend` feature, selected at startup by `USE_REDIS_QUEUE`.

pub mod feedback;
pub mod memory;
pub mod worker;

#[cfg(feature = "redis-backend")]
pub mod redis_backend;

use async_trait::async_trait;

use crate::error::AppError;

pub use feedback::{FeedbackQueue, InMemoryFeedbackQueue};
pub use memory::InMemoryTaskQueue;
pub use worker::JobHandler;

#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisTaskQueue;

/// Worker task payload for the `process_document` task.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProcessDocumentTask {
    pub job_id: i64,
}

/// Worker task payload for the `analyze_feedback` task.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnalyzeFeedbackTask {
    pub feedback_id: i64,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues `job_id` onto the named queue, returning a broker task id.
    async fn enqueue(&self, job_id: i64, queue_name: &str) -> Result<String, AppError>;

    /// Whether at least one worker is currently able to drain this queue.
    /// Backed by a lightweight liveness signal (in-memory: a running worker
    /// loop registered itself; Redis: a heartbeat key), never a full RPC.
    fn workers_available(&self) -> bool;
}

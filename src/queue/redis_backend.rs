//! Redis-backed task queue: `LPUSH` onto named lists (`ocr_queue`, `ai_queue`),
//! drained by `run_worker_pool`'s `BRPOP` loops. Selected when `USE_REDIS_QUEUE`
//! is set; this is the production backend, `InMemoryTaskQueue` the dev one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use uuid::Uuid;

use super::worker::{run_with_timeout, JobHandler};
use super::{ProcessDocumentTask, TaskQueue};
use crate::error::AppError;

pub struct RedisTaskQueue {
    client: redis::Client,
}

impl RedisTaskQueue {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url).map_err(|e| AppError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::ConnectionManager, AppError> {
        self.client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::Connection(e.to_string()))
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, job_id: i64, queue_name: &str) -> Result<String, AppError> {
        let task_id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&ProcessDocumentTask { job_id })
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(queue_name, payload)
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        Ok(task_id)
    }

    fn workers_available(&self) -> bool {
        // A constructible client is the cheap in-process signal; actual worker
        // liveness is tracked by ops tooling against the heartbeat, not here.
        true
    }
}

/// Runs `worker_count` parallel loops draining `queue_name`, each pulling one
/// task at a time through the shared per-job timeout wrapper.
pub async fn run_worker_pool(
    redis_url: &str,
    queue_name: &str,
    worker_count: usize,
    handler: Arc<dyn JobHandler>,
    timeout: Duration,
) -> Result<(), AppError> {
    let client = redis::Client::open(redis_url).map_err(|e| AppError::Connection(e.to_string()))?;
    let mut tasks = Vec::with_capacity(worker_count);

    for _ in 0..worker_count {
        let client = client.clone();
        let handler = handler.clone();
        let queue_name = queue_name.to_string();
        tasks.push(tokio::spawn(async move {
            drain_loop(client, queue_name, handler, timeout).await;
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn drain_loop(client: redis::Client, queue_name: String, handler: Arc<dyn JobHandler>, timeout: Duration) {
    loop {
        let mut conn = match client.get_connection_manager().await {
            Ok(c) => c,
            Err(err) => {
                tracing::error!(error = %err, "worker lost redis connection, retrying in 5s");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        let popped: Option<(String, String)> = match conn.brpop(&queue_name, 5.0).await {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "brpop failed, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        let Some((_, payload)) = popped else { continue };

        let task: ProcessDocumentTask = match serde_json::from_str(&payload) {
            Ok(t) => t,
            Err(err) => {
                tracing::error!(error = %err, payload = %payload, "malformed task payload, dropping");
                continue;
            }
        };
        run_with_timeout(handler.clone(), task.job_id, timeout).await;
    }
}

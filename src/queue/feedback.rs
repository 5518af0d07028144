//! In-memory bridge for the `analyze_feedback` task, mirroring
//! [`super::memory::InMemoryTaskQueue`]'s shape: enqueuing spawns the analysis
//! directly on the runtime instead of pushing onto `ai_queue` for a separate
//! worker to drain.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::Cipher;
use crate::db::repository::available_model;
use crate::db::DbPool;
use crate::error::AppError;
use crate::feedback::FeedbackAnalyzer;
use crate::models::AvailableModel;

#[async_trait]
pub trait FeedbackQueue: Send + Sync {
    /// Enqueues the analysis for an already-inserted feedback row, returning a
    /// broker task id.
    async fn enqueue(&self, feedback_id: i64) -> Result<String, AppError>;
}

pub struct InMemoryFeedbackQueue {
    pool: DbPool,
    cipher: Cipher,
    analyzer: Arc<FeedbackAnalyzer>,
}

impl InMemoryFeedbackQueue {
    pub fn new(pool: DbPool, cipher: Cipher, analyzer: Arc<FeedbackAnalyzer>) -> Self {
        Self { pool, cipher, analyzer }
    }
}

#[async_trait]
impl FeedbackQueue for InMemoryFeedbackQueue {
    async fn enqueue(&self, feedback_id: i64) -> Result<String, AppError> {
        let task_id = Uuid::new_v4().to_string();
        let pool = self.pool.clone();
        let cipher = self.cipher.clone();
        let analyzer = self.analyzer.clone();

        tokio::spawn(async move {
            let conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!(feedback_id, error = %err, "failed to acquire connection for feedback analysis");
                    return;
                }
            };
            let model = match default_model(&conn) {
                Ok(Some(model)) => model,
                Ok(None) => {
                    tracing::warn!(feedback_id, "no enabled model configured, skipping feedback analysis");
                    return;
                }
                Err(err) => {
                    tracing::error!(feedback_id, error = %err, "failed to load model for feedback analysis");
                    return;
                }
            };
            if let Err(err) = analyzer.analyze(&conn, &cipher, feedback_id, &model).await {
                tracing::error!(feedback_id, error = %err, "feedback analysis failed");
            }
        });

        Ok(task_id)
    }
}

/// The feedback analyzer isn't tied to a pipeline step, so it runs against the
/// first enabled model rather than a per-step assignment.
fn default_model(conn: &rusqlite::Connection) -> Result<Option<AvailableModel>, AppError> {
    Ok(available_model::list_enabled(conn)?.into_iter().next())
}

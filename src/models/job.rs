use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ApiStatus, JobStatus, MimeClass};

/// The unit of work. `processing_id` is the externally visible identifier;
/// `id` is the internal numeric row id used only for joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub processing_id: Uuid,
    pub filename: String,
    pub mime_class: MimeClass,
    pub file_size: i64,
    /// Encrypted at rest; never exposed outside the storage layer's encode/decode hooks.
    pub file_bytes: Vec<u8>,
    pub pipeline_config: serde_json::Value,
    pub ocr_config: serde_json::Value,
    pub target_language: Option<String>,
    pub status: JobStatus,
    pub progress_percent: i32,
    pub current_step: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub language_translated_text: Option<String>,
    pub document_type_detected: Option<String>,
    pub confidence_score: Option<f64>,
    pub branching_path: Option<String>,
    pub termination_reason: Option<String>,
    pub termination_message: Option<String>,
    pub termination_step: Option<String>,
    pub matched_value: Option<String>,
    pub error_step: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub broker_task_id: Option<String>,
    pub content_cleared_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Map internal status to the public status enum per the job lifecycle contract.
    pub fn api_status(&self) -> ApiStatus {
        match self.status {
            JobStatus::Pending | JobStatus::Queued => ApiStatus::Pending,
            JobStatus::Running => match self.current_step.as_deref() {
                Some(step) if step.to_lowercase().contains("language") => {
                    ApiStatus::LanguageTranslating
                }
                Some(step) if step.to_lowercase().contains("translat") => ApiStatus::Translating,
                _ => ApiStatus::ExtractingText,
            },
            JobStatus::Completed => ApiStatus::Completed,
            JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled => ApiStatus::Error,
            JobStatus::Terminated => ApiStatus::Terminated,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only AI cost log entry, one per external model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCostLogEntry {
    pub id: i64,
    pub processing_id: Uuid,
    pub step_name: String,
    pub model_name: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub estimated_cost: f64,
    pub created_at: DateTime<Utc>,
}

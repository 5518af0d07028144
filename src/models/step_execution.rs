use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::StepStatus;

/// One row per (Job, Step) attempt. Step orders among COMPLETED executions
/// form a strictly monotonic sequence within each branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: i64,
    pub job_id: i64,
    pub step_id: i64,
    pub step_name: String,
    pub step_order: i32,
    pub status: StepStatus,
    pub input_text: Option<String>,
    pub output_text: Option<String>,
    pub model_used: Option<String>,
    pub prompt_used: Option<String>,
    pub confidence: Option<f64>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub execution_time_ms: Option<i64>,
    pub retry_count: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStepExecution {
    pub job_id: i64,
    pub step_id: i64,
    pub step_name: String,
    pub step_order: i32,
    pub status: StepStatus,
    pub input_text: Option<String>,
    pub output_text: Option<String>,
    pub model_used: Option<String>,
    pub prompt_used: Option<String>,
    pub confidence: Option<f64>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub execution_time_ms: Option<i64>,
    pub retry_count: i32,
    pub metadata: serde_json::Value,
}

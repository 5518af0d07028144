use serde::{Deserialize, Serialize};

/// A user-configurable pipeline node. `prompt_template` must contain `{input_text}`
/// and may reference other context variables via `{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicStep {
    pub id: i64,
    pub name: String,
    pub order: i32,
    pub enabled: bool,
    pub prompt_template: String,
    pub model_id: i64,
    pub temperature: f64,
    pub max_tokens: i32,
    pub retry_on_failure: bool,
    pub max_retries: i32,
    pub retry_policy: RetryPolicyName,
    pub input_from_previous_step: bool,
    pub output_format: Option<String>,
    pub document_class_id: Option<i64>,
    pub is_branching_step: bool,
    pub branching_field: Option<String>,
    pub post_branching: bool,
    pub required_context_variables: Vec<String>,
    pub stop_conditions: Vec<StopCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyName {
    Default,
    Aggressive,
    Conservative,
    Api,
    Database,
}

/// A matcher over a step's normalized output that can terminate the pipeline
/// early with a user-visible reason and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopCondition {
    pub stop_on_values: Vec<String>,
    pub reason: String,
    pub message: String,
}

impl StopCondition {
    /// Matches the step's output after normalizing (trim + lowercase) both sides.
    pub fn matches(&self, output: &str) -> Option<&str> {
        let normalized = output.trim().to_lowercase();
        self.stop_on_values
            .iter()
            .find(|v| v.trim().to_lowercase() == normalized)
            .map(|v| v.as_str())
    }
}

impl DynamicStep {
    /// Universal-pre band: no class pin, not post-branching.
    pub fn is_universal_pre(&self) -> bool {
        self.document_class_id.is_none() && !self.post_branching
    }

    /// Class-specific band: pinned to exactly one class.
    pub fn is_class_specific(&self) -> bool {
        self.document_class_id.is_some()
    }

    /// Universal-post band: runs after class-specific steps regardless of class.
    pub fn is_universal_post(&self) -> bool {
        self.post_branching
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_condition_matches_case_and_whitespace_insensitively() {
        let cond = StopCondition {
            stop_on_values: vec!["NICHT_MEDIZINISCH".into()],
            reason: "Non-medical content detected".into(),
            message: "This document does not appear to be medical.".into(),
        };
        assert_eq!(cond.matches("  nicht_medizinisch \n"), Some("NICHT_MEDIZINISCH"));
        assert_eq!(cond.matches("MEDIZINISCH"), None);
    }
}

//! Resolves the branching step's output into a selected document class.

use crate::models::DocumentClass;

#[derive(Debug, Clone)]
pub struct BranchingOutcome {
    pub selected_class: Option<DocumentClass>,
    pub raw_value: Option<String>,
}

/// Extracts `branching_field` from the step's output: JSON object lookup first,
/// falling back to the last non-empty line treated as a bare token. The value
/// is matched case-insensitively against enabled classes; the first match wins.
/// No match means no class selected — class-specific steps are then skipped.
pub fn resolve(output: &str, branching_field: &str, classes: &[DocumentClass]) -> BranchingOutcome {
    let extracted = extract_field(output, branching_field);

    let selected_class = extracted.as_deref().and_then(|value| {
        let normalized = value.trim().to_lowercase();
        classes.iter().find(|c| c.class_key.to_lowercase() == normalized).cloned()
    });

    BranchingOutcome { selected_class, raw_value: extracted }
}

fn extract_field(output: &str, field: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(output.trim()) {
        if let Some(value) = parsed.get(field).and_then(|v| v.as_str()) {
            return Some(value.to_string());
        }
    }

    output.lines().rev().map(str::trim).find(|l| !l.is_empty()).map(str::to_string)
}

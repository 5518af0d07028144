use serde::{Deserialize, Serialize};

/// A dynamic classification target. The classification step's branching decision
/// selects zero or one class; each non-universal step is pinned to exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentClass {
    pub id: i64,
    pub class_key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub strong_indicators: Vec<String>,
    pub weak_indicators: Vec<String>,
    pub is_system_class: bool,
    pub enabled: bool,
}

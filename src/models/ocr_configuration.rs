use serde::{Deserialize, Serialize};

use super::enums::OcrEngine;

/// Process-wide singleton (one active row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfiguration {
    pub id: i64,
    pub engine: OcrEngine,
    pub engine_config: serde_json::Value,
    pub pii_removal_enabled: bool,
    pub vision_llm_fallback_enabled: bool,
}

impl Default for OcrConfiguration {
    fn default() -> Self {
        Self {
            id: 1,
            engine: OcrEngine::Hybrid,
            engine_config: serde_json::json!({}),
            pii_removal_enabled: true,
            vision_llm_fallback_enabled: true,
        }
    }
}

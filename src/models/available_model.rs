use serde::{Deserialize, Serialize};

/// Provider+name+capabilities+pricing; used by the cost accountant and the
/// executor to dispatch to the correct external client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableModel {
    pub id: i64,
    pub provider: String,
    pub name: String,
    pub supports_vision: bool,
    pub cost_per_1k_input_tokens: f64,
    pub cost_per_1k_output_tokens: f64,
    pub enabled: bool,
}

impl AvailableModel {
    pub fn estimated_cost(&self, input_tokens: i32, output_tokens: i32) -> f64 {
        (input_tokens as f64 / 1000.0) * self.cost_per_1k_input_tokens
            + (output_tokens as f64 / 1000.0) * self.cost_per_1k_output_tokens
    }
}

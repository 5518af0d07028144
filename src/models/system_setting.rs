use serde::{Deserialize, Serialize};

/// Key/value store of runtime configuration. Values may be marked encrypted
/// individually; the repository layer handles that transparently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
    pub encrypted: bool,
}

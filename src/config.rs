//! Typed environment configuration, loaded once at startup via `dotenvy` plus
//! `std::env`. Every other module reaches for a typed getter here rather than
//! calling `std::env::var` directly.

use std::collections::HashMap;

const FEATURE_FLAG_PREFIX: &str = "FEATURE_FLAG_";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub encryption_enabled: bool,
    pub encryption_key: Option<String>,
    pub ocr_service_url: String,
    pub pii_service_url: String,
    pub llm_service_url: String,
    pub llm_api_key: Option<String>,
    pub ocr_api_key: Option<String>,
    pub external_pii_api_key: Option<String>,
    pub dify_rag_url: Option<String>,
    pub dify_rag_api_key: Option<String>,
    pub use_dify_rag: bool,
    pub use_external_pii: bool,
    pub cache_enabled: bool,
    pub cache_default_ttl_seconds: u64,
    pub cache_key_prefix: String,
    pub use_redis_queue: bool,
    pub feature_flags: HashMap<String, bool>,
}

impl Config {
    /// Loads `.env` (if present, silently ignored if missing) then reads the
    /// process environment. Values absent from the environment fall back to
    /// conservative defaults suited to local development.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_env(std::env::vars())
    }

    fn from_env(vars: impl Iterator<Item = (String, String)>) -> Self {
        let mut raw: HashMap<String, String> = vars.collect();

        let mut feature_flags = HashMap::new();
        raw.retain(|key, value| {
            if let Some(name) = key.strip_prefix(FEATURE_FLAG_PREFIX) {
                feature_flags.insert(name.to_lowercase(), parse_bool(value, false));
                false
            } else {
                true
            }
        });

        Self {
            database_url: raw.remove("DATABASE_URL").unwrap_or_else(|| "docbridge.sqlite3".to_string()),
            redis_url: raw.remove("REDIS_URL"),
            encryption_enabled: raw.get("ENCRYPTION_ENABLED").map(|v| parse_bool(v, false)).unwrap_or(false),
            encryption_key: raw.remove("ENCRYPTION_KEY"),
            ocr_service_url: raw.remove("OCR_SERVICE_URL").unwrap_or_else(|| "http://localhost:8001".to_string()),
            pii_service_url: raw.remove("PII_SERVICE_URL").unwrap_or_else(|| "http://localhost:8002".to_string()),
            llm_service_url: raw.remove("LLM_SERVICE_URL").unwrap_or_else(|| "http://localhost:8003".to_string()),
            llm_api_key: raw.remove("LLM_API_KEY"),
            ocr_api_key: raw.remove("OCR_API_KEY"),
            external_pii_api_key: raw.remove("EXTERNAL_PII_API_KEY"),
            dify_rag_url: raw.remove("DIFY_RAG_URL"),
            dify_rag_api_key: raw.remove("DIFY_RAG_API_KEY"),
            use_dify_rag: raw.get("USE_DIFY_RAG").map(|v| parse_bool(v, false)).unwrap_or(false),
            use_external_pii: raw.get("USE_EXTERNAL_PII").map(|v| parse_bool(v, false)).unwrap_or(false),
            cache_enabled: raw.get("CACHE_ENABLED").map(|v| parse_bool(v, true)).unwrap_or(true),
            cache_default_ttl_seconds: raw
                .remove("CACHE_DEFAULT_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            cache_key_prefix: raw.remove("CACHE_KEY_PREFIX").unwrap_or_else(|| "docbridge".to_string()),
            use_redis_queue: raw.get("USE_REDIS_QUEUE").map(|v| parse_bool(v, false)).unwrap_or(false),
            feature_flags,
        }
    }

    /// Reads a `FEATURE_FLAG_<NAME>` boolean, defaulting to `false` for any
    /// name that was never set.
    pub fn feature_flag(&self, name: &str) -> bool {
        self.feature_flags.get(&name.to_lowercase()).copied().unwrap_or(false)
    }

    /// 32-byte encryption key derived from `ENCRYPTION_KEY`, required when
    /// `encryption_enabled` is true. Accepts base64 or hex, per
    /// `crypto::encryption::parse_key`.
    pub fn encryption_key_bytes(&self) -> Option<[u8; crate::crypto::encryption::KEY_LENGTH]> {
        crate::crypto::encryption::parse_key(self.encryption_key.as_deref()?).ok()
    }

    /// Builds the process-wide `Cipher` per `encryption_enabled`/`ENCRYPTION_KEY`.
    pub fn build_cipher(&self) -> Result<crate::crypto::Cipher, crate::crypto::CryptoError> {
        if !self.encryption_enabled {
            return Ok(crate::crypto::Cipher::disabled());
        }
        let raw = self
            .encryption_key
            .as_deref()
            .ok_or_else(|| crate::crypto::CryptoError::InvalidKey("ENCRYPTION_ENABLED is set but ENCRYPTION_KEY is missing".into()))?;
        let key = crate::crypto::encryption::parse_key(raw)?;
        Ok(crate::crypto::Cipher::enabled(key))
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

//! PII microservice client. On failure it may fall back to an in-process regex
//! filter, gated by a feature flag (the microservice is the black-box default).

use async_trait::async_trait;
use regex::Regex;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct PiiResponse {
    pub cleaned_text: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait PiiClient: Send + Sync {
    async fn remove_pii(&self, text: &str, language: &str) -> Result<PiiResponse, AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

pub struct HttpPiiClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpPiiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PiiClient for HttpPiiClient {
    async fn remove_pii(&self, text: &str, language: &str) -> Result<PiiResponse, AppError> {
        let mut request = self.http.post(format!("{}/remove-pii", self.base_url)).json(&serde_json::json!({
            "text": text,
            "language": language,
            "include_metadata": true,
        }));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout
            } else {
                AppError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return if status.is_server_error() {
                Err(AppError::ServiceUnavailable(format!("pii service returned {status}")))
            } else {
                Err(AppError::Validation(format!("pii service rejected request: {status}")))
            };
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("malformed pii response: {e}")))?;

        Ok(PiiResponse {
            cleaned_text: body["cleaned_text"].as_str().unwrap_or(text).to_string(),
            metadata: body.get("metadata").cloned().unwrap_or(serde_json::Value::Null),
        })
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| AppError::Connection(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ServiceUnavailable(format!("pii health check returned {}", response.status())))
        }
    }
}

/// In-process fallback used only when the microservice is unreachable and the
/// `pii_regex_fallback` feature flag permits it. Intentionally conservative:
/// it only redacts common identifier shapes, not a full clinical NER pass.
pub struct RegexFallbackPiiClient;

impl RegexFallbackPiiClient {
    pub fn remove_pii(&self, text: &str) -> PiiResponse {
        let patterns: &[(&str, &str)] = &[
            (r"\b\d{2}\.\d{2}\.\d{4}\b", "[DATE]"),
            (r"\b[A-Z][a-zäöüß]+\s[A-Z][a-zäöüß]+\b", "[NAME]"),
            (r"\b\d{3,}\s?[A-Za-zäöüß]+(stra(ss|ß)e|weg|platz)\b", "[ADDRESS]"),
        ];
        let mut cleaned = text.to_string();
        let mut redaction_count = 0;
        for (pattern, replacement) in patterns {
            if let Ok(re) = Regex::new(pattern) {
                redaction_count += re.find_iter(&cleaned).count();
                cleaned = re.replace_all(&cleaned, *replacement).to_string();
            }
        }
        PiiResponse {
            cleaned_text: cleaned,
            metadata: serde_json::json!({ "fallback": true, "redaction_count": redaction_count }),
        }
    }
}

//! Guideline RAG client (Dify-like). Performs a German RAG query, then
//! optionally asks the LLM client to translate the recommendations, formatting
//! output with bilingual headers.

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait GuidelineClient: Send + Sync {
    async fn query(&self, query_de: &str) -> Result<String, AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

pub struct DifyGuidelineClient {
    base_url: String,
    api_key: String,
    user: String,
    http: reqwest::Client,
}

impl DifyGuidelineClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            user: "docbridge-worker".to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GuidelineClient for DifyGuidelineClient {
    async fn query(&self, query_de: &str) -> Result<String, AppError> {
        let response = self
            .http
            .post(format!("{}/v1/chat-messages", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "query": query_de,
                "response_mode": "blocking",
                "user": self.user,
                "inputs": {},
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout
                } else {
                    AppError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return if status.is_server_error() {
                Err(AppError::ServiceUnavailable(format!("guideline service returned {status}")))
            } else {
                Err(AppError::Validation(format!("guideline service rejected request: {status}")))
            };
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("malformed guideline response: {e}")))?;

        Ok(body["answer"].as_str().unwrap_or_default().to_string())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Formats a German guideline answer alongside its translation with bilingual
/// section headers, per the guideline client's output contract.
pub fn format_bilingual(answer_de: &str, answer_translated: &str, target_language: &str) -> String {
    format!(
        "## Leitlinienempfehlung (Deutsch)\n\n{answer_de}\n\n## Guideline Recommendation ({target_language})\n\n{answer_translated}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilingual_format_includes_both_language_headers() {
        let formatted = format_bilingual("Bettruhe empfohlen.", "Bed rest recommended.", "en");
        assert!(formatted.contains("## Leitlinienempfehlung (Deutsch)"));
        assert!(formatted.contains("## Guideline Recommendation (en)"));
        assert!(formatted.contains("Bettruhe empfohlen."));
        assert!(formatted.contains("Bed rest recommended."));
    }
}

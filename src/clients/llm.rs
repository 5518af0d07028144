//! Chat-completion style LLM client; the trait abstracts provider specifics
//! so the pipeline executor never sees a concrete vendor SDK.

use async_trait::async_trait;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub model: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: i32,
    ) -> Result<LlmResponse, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// Thin `reqwest` adapter for an OpenAI-compatible chat-completions endpoint.
pub struct HttpLlmClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> AppError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            AppError::RateLimit { retry_after_seconds: 30 }
        } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            AppError::Unauthorized
        } else if status.is_server_error() {
            AppError::ServiceUnavailable(format!("llm endpoint returned {status}: {body}"))
        } else {
            AppError::Validation(format!("llm endpoint returned {status}: {body}"))
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: f64,
        max_tokens: i32,
    ) -> Result<LlmResponse, AppError> {
        let mut request = self.http.post(format!("{}/v1/chat/completions", self.base_url)).json(&serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
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
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("malformed llm response: {e}")))?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let input_tokens = body["usage"]["prompt_tokens"].as_i64().unwrap_or(0) as i32;
        let output_tokens = body["usage"]["completion_tokens"].as_i64().unwrap_or(0) as i32;

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
            model: model.to_string(),
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
            Err(AppError::ServiceUnavailable(format!("llm health check returned {}", response.status())))
        }
    }
}

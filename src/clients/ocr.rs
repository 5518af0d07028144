//! OCR microservice client: streams a file and receives text + confidence.

use async_trait::async_trait;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub text: String,
    pub confidence: f64,
    pub processing_time_ms: i64,
    pub engine: String,
    pub lines_detected: i32,
}

#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn extract(&self, filename: &str, file_bytes: Vec<u8>) -> Result<OcrResponse, AppError>;
    async fn health_check(&self) -> Result<(), AppError>;
}

pub struct HttpOcrClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpOcrClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn extract(&self, filename: &str, file_bytes: Vec<u8>) -> Result<OcrResponse, AppError> {
        let part = reqwest::multipart::Part::bytes(file_bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/extract", self.base_url))
            .header("X-API-Key", &self.api_key)
            .multipart(form)
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
                Err(AppError::ServiceUnavailable(format!("ocr service returned {status}")))
            } else {
                Err(AppError::Validation(format!("ocr service rejected request: {status}")))
            };
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("malformed ocr response: {e}")))?;

        Ok(OcrResponse {
            text: body["text"].as_str().unwrap_or_default().to_string(),
            confidence: body["confidence"].as_f64().unwrap_or(0.0),
            processing_time_ms: body["processing_time"].as_i64().unwrap_or(0),
            engine: body["engine"].as_str().unwrap_or("unknown").to_string(),
            lines_detected: body["lines_detected"].as_i64().unwrap_or(0) as i32,
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
            Err(AppError::ServiceUnavailable(format!("ocr health check returned {}", response.status())))
        }
    }
}

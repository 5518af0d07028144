//! Selects an extraction strategy per input and runs it with the resilience
//! layer wrapped around each external call, falling back through the chain
//! `LOCAL_TEXT -> LOCAL_OCR -> VISION_LLM` when a configured flag allows it.

pub mod file_analysis;
pub mod merge;
pub mod quality_gate;
pub mod sequence;

pub use file_analysis::{FileAnalysis, ImageQuality};
pub use quality_gate::QualityReport;

use std::sync::Arc;

use crate::clients::{LlmClient, OcrClient};
use crate::error::AppError;
use crate::models::enums::{MimeClass, OcrEngine};
use crate::models::OcrConfiguration;
use crate::resilience::{BreakerRegistry, RetryPolicy};
use crate::models::RetryPolicyName;

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub text: String,
    pub confidence: f64,
    pub engine_used: OcrEngine,
    pub markdown_tables: Option<String>,
    pub quality: Option<QualityReport>,
}

/// Static per-process knobs that are not part of the persisted `OcrConfiguration`
/// row (that row carries the engine pin and the fallback toggle; see `route`).
pub struct OcrRouterConfig {
    pub embedded_text_coverage_threshold: f64,
    pub vision_model: String,
}

impl Default for OcrRouterConfig {
    fn default() -> Self {
        Self { embedded_text_coverage_threshold: 0.85, vision_model: "gpt-4o".to_string() }
    }
}

pub struct OcrRouter {
    config: OcrRouterConfig,
    ocr_client: Arc<dyn OcrClient>,
    llm_client: Arc<dyn LlmClient>,
    breakers: Arc<BreakerRegistry>,
}

impl OcrRouter {
    pub fn new(
        config: OcrRouterConfig,
        ocr_client: Arc<dyn OcrClient>,
        llm_client: Arc<dyn LlmClient>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self { config, ocr_client, llm_client, breakers }
    }

    /// Picks an engine for a single file per the routing decision table, then
    /// runs it, falling forward through the chain on failure when enabled.
    /// Pure over `analysis` plus the current `OcrConfiguration` row: an engine
    /// pin other than `HYBRID` overrides the heuristic, and the fallback chain
    /// only runs when `ocr_config.vision_llm_fallback_enabled` is set.
    pub async fn route(
        &self,
        filename: &str,
        file_bytes: Vec<u8>,
        analysis: &FileAnalysis,
        ocr_config: &OcrConfiguration,
    ) -> Result<ExtractionResult, AppError> {
        let quality = quality_gate::assess(analysis);
        let chosen = self.select_engine(analysis, ocr_config.engine);

        let mut last_err = None;
        for engine in self.fallback_sequence(chosen, ocr_config.vision_llm_fallback_enabled) {
            match self.run_engine(engine, filename, &file_bytes, &quality).await {
                Ok(mut result) => {
                    result.quality = Some(quality);
                    return Ok(result);
                }
                Err(err) => {
                    tracing::warn!(engine = %engine, error = %err, "extraction engine failed, considering fallback");
                    last_err = Some(err);
                    if !ocr_config.vision_llm_fallback_enabled {
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(AppError::Internal("no extraction engine available".into())))
    }

    /// Merges already-extracted page texts for a multi-file input, ordering
    /// them by filename first.
    pub fn merge_sequence(&self, files: Vec<(String, String)>) -> merge::MergedDocument {
        let ordered = sequence::order_files(files.into_iter().map(|(name, text)| (name, text.into_bytes())).collect());
        let pages: Vec<String> = ordered
            .into_iter()
            .map(|f| String::from_utf8_lossy(&f.bytes).to_string())
            .collect();
        merge::merge_pages(&pages)
    }

    /// Uses the configured engine pin as-is unless the admin has it set to
    /// `HYBRID`, which means "let the heuristic decide".
    fn select_engine(&self, analysis: &FileAnalysis, configured: OcrEngine) -> OcrEngine {
        if configured != OcrEngine::Hybrid {
            return configured;
        }

        if analysis.mime_class == MimeClass::Pdf {
            if analysis.embedded_text_coverage >= self.config.embedded_text_coverage_threshold
                && !analysis.has_complex_tables
            {
                return OcrEngine::LocalText;
            }
            if analysis.has_complex_tables || analysis.is_form {
                return OcrEngine::VisionLlm;
            }
            return OcrEngine::LocalOcr;
        }

        if analysis.has_complex_tables || analysis.is_form || !analysis.is_good_quality() {
            return OcrEngine::VisionLlm;
        }
        OcrEngine::LocalOcr
    }

    fn fallback_sequence(&self, chosen: OcrEngine, vision_llm_fallback_enabled: bool) -> Vec<OcrEngine> {
        if !vision_llm_fallback_enabled {
            return vec![chosen];
        }
        match chosen {
            OcrEngine::LocalText => vec![OcrEngine::LocalText, OcrEngine::LocalOcr, OcrEngine::VisionLlm],
            OcrEngine::LocalOcr => vec![OcrEngine::LocalOcr, OcrEngine::VisionLlm],
            OcrEngine::VisionLlm => vec![OcrEngine::VisionLlm],
            OcrEngine::Hybrid => vec![OcrEngine::LocalOcr, OcrEngine::VisionLlm],
        }
    }

    async fn run_engine(
        &self,
        engine: OcrEngine,
        filename: &str,
        file_bytes: &[u8],
        _quality: &QualityReport,
    ) -> Result<ExtractionResult, AppError> {
        match engine {
            OcrEngine::LocalText => {
                let text = String::from_utf8_lossy(file_bytes).to_string();
                Ok(ExtractionResult {
                    text,
                    confidence: 1.0,
                    engine_used: OcrEngine::LocalText,
                    markdown_tables: None,
                    quality: None,
                })
            }
            OcrEngine::LocalOcr => {
                let breaker = self.breakers.get_or_create("ocr");
                let policy = RetryPolicy::preset(RetryPolicyName::Default);
                let client = self.ocr_client.clone();
                let bytes = file_bytes.to_vec();
                let filename = filename.to_string();
                let response = policy
                    .call("ocr", || {
                        let breaker = breaker.clone();
                        let client = client.clone();
                        let bytes = bytes.clone();
                        let filename = filename.clone();
                        async move { breaker.call(|| client.extract(&filename, bytes)).await }
                    })
                    .await?;
                Ok(ExtractionResult {
                    text: response.text,
                    confidence: response.confidence,
                    engine_used: OcrEngine::LocalOcr,
                    markdown_tables: None,
                    quality: None,
                })
            }
            OcrEngine::VisionLlm | OcrEngine::Hybrid => {
                let breaker = self.breakers.get_or_create("llm");
                let policy = RetryPolicy::preset(RetryPolicyName::Api);
                let client = self.llm_client.clone();
                let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, file_bytes);
                let prompt = format!(
                    "Extract all text from this document, preserving tables as markdown. Base64 content: {encoded}"
                );
                let model = self.config.vision_model.clone();
                let response = policy
                    .call("llm", || {
                        let breaker = breaker.clone();
                        let client = client.clone();
                        let prompt = prompt.clone();
                        let model = model.clone();
                        async move { breaker.call(|| client.complete(&prompt, &model, 0.0, 4096)).await }
                    })
                    .await?;
                Ok(ExtractionResult {
                    text: response.text,
                    confidence: 0.9,
                    engine_used: OcrEngine::VisionLlm,
                    markdown_tables: None,
                    quality: None,
                })
            }
        }
    }
}

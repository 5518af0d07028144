//! Ties OCR routing, the optional PII-removal pass, and the pipeline executor
//! into one `JobHandler`. This is the object a worker process owns: every
//! external dependency is a trait object so tests can swap in mocks for the
//! whole chain without touching a real model or microservice.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::{Cache, Namespace};
use crate::clients::PiiClient;
use crate::crypto::Cipher;
use crate::db::repository::{available_model, document_class, dynamic_step, job as job_repo, ocr_configuration, step_execution};
use crate::db::DbPool;
use crate::error::AppError;
use crate::jobs::CancelRegistry;
use crate::models::enums::StepStatus;
use crate::models::{AvailableModel, DocumentClass, DynamicStep, NewStepExecution, OcrConfiguration};
use crate::ocr_router::{FileAnalysis, OcrRouter};
use crate::pipeline::{ExecutorOutcome, PipelineExecutor};
use crate::queue::JobHandler;

const SOURCE_LANGUAGE: &str = "de";

pub struct DocumentProcessor {
    pool: DbPool,
    cipher: Cipher,
    ocr_router: OcrRouter,
    pii_client: Arc<dyn PiiClient>,
    pii_regex_fallback_enabled: bool,
    executor: PipelineExecutor,
    cancel: CancelRegistry,
    worker_id: String,
    cache: Option<Arc<Cache>>,
}

impl DocumentProcessor {
    pub fn new(
        pool: DbPool,
        cipher: Cipher,
        ocr_router: OcrRouter,
        pii_client: Arc<dyn PiiClient>,
        pii_regex_fallback_enabled: bool,
        executor: PipelineExecutor,
        cancel: CancelRegistry,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            cipher,
            ocr_router,
            pii_client,
            pii_regex_fallback_enabled,
            executor,
            cancel,
            worker_id: worker_id.into(),
            cache: None,
        }
    }

    /// Caches the per-job configuration reads (dynamic steps, document
    /// classes, available models, OCR configuration) under their namespaces,
    /// invalidated by admin writes via [`crate::db::repository`] callers.
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Lets a caller (e.g. an admin cancel endpoint) flag a running job.
    pub fn cancel_registry(&self) -> &CancelRegistry {
        &self.cancel
    }

    fn conn(&self) -> Result<crate::db::PooledConn, AppError> {
        self.pool.get().map_err(|e| crate::db::DatabaseError::from(e).into())
    }
}

#[async_trait]
impl JobHandler for DocumentProcessor {
    async fn handle(&self, job_id: i64) -> Result<(), AppError> {
        let conn = self.conn()?;

        if !job_repo::mark_running(&conn, job_id, &self.worker_id)? {
            // Another worker already won the race onto this job.
            return Ok(());
        }

        let job = job_repo::get_job(&conn, &self.cipher, job_id)?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

        let ocr_config = self.cached_ocr_configuration(&conn)?;
        let analysis = FileAnalysis::detect(job.mime_class, &job.file_bytes);
        let extraction = match self.ocr_router.route(&job.filename, job.file_bytes.clone(), &analysis, &ocr_config).await {
            Ok(extraction) => extraction,
            Err(err) => {
                job_repo::mark_failed(&conn, job_id, "OCR Extraction", &err.to_string())?;
                self.cancel.clear(job_id);
                return Ok(());
            }
        };

        let pipeline_input = if ocr_config.pii_removal_enabled {
            match self.run_pii_removal(&conn, job_id, &extraction.text).await {
                Ok(cleaned) => cleaned,
                Err(err) => {
                    job_repo::mark_failed(&conn, job_id, "PII Removal", &err.to_string())?;
                    self.cancel.clear(job_id);
                    return Ok(());
                }
            }
        } else {
            extraction.text.clone()
        };

        let steps = self.cached_dynamic_steps(&conn)?;
        let classes = self.cached_document_classes(&conn)?;
        let models = self.cached_available_models(&conn)?;
        let cancel = &self.cancel;
        let is_cancelled = move || cancel.is_cancelled(job_id);

        let outcome = self
            .executor
            .run(
                &conn,
                &self.cipher,
                job_id,
                &job.processing_id,
                &steps,
                &classes,
                &models,
                &pipeline_input,
                job.target_language.as_deref(),
                &is_cancelled,
            )
            .await?;

        if let ExecutorOutcome::Completed { translated_text, language_translated_text, document_type_detected, branching_path } = outcome {
            job_repo::mark_completed(
                &conn,
                &self.cipher,
                job_id,
                job_repo::JobCompletion {
                    original_text: Some(extraction.text),
                    translated_text: Some(translated_text),
                    language_translated_text,
                    document_type_detected,
                    confidence_score: Some(extraction.confidence),
                    branching_path,
                },
            )?;
        }

        self.cancel.clear(job_id);
        Ok(())
    }

    async fn handle_timeout(&self, job_id: i64) {
        let Ok(conn) = self.conn() else { return };
        let active_step = job_repo::get_job(&conn, &self.cipher, job_id)
            .ok()
            .flatten()
            .and_then(|j| j.current_step)
            .unwrap_or_else(|| "unknown".to_string());
        let _ = job_repo::mark_timeout(&conn, job_id, &active_step);
        self.cancel.clear(job_id);
    }
}

impl DocumentProcessor {
    fn cached_dynamic_steps(&self, conn: &rusqlite::Connection) -> Result<Vec<DynamicStep>, AppError> {
        self.cached_read(Namespace::PipelineSteps, "all", || dynamic_step::list_enabled(conn))
    }

    fn cached_document_classes(&self, conn: &rusqlite::Connection) -> Result<Vec<DocumentClass>, AppError> {
        self.cached_read(Namespace::DocumentClasses, "all", || document_class::list_enabled(conn))
    }

    fn cached_available_models(&self, conn: &rusqlite::Connection) -> Result<Vec<AvailableModel>, AppError> {
        self.cached_read(Namespace::AvailableModels, "all", || available_model::list_enabled(conn))
    }

    fn cached_ocr_configuration(&self, conn: &rusqlite::Connection) -> Result<OcrConfiguration, AppError> {
        self.cached_read(Namespace::OcrConfig, "active", || ocr_configuration::get_active(conn))
    }

    /// Advisory read-through: a cache miss, a disabled cache, or a malformed
    /// cached value all just fall back to `load`, per the cache's own
    /// advisory-only contract.
    fn cached_read<T, F>(&self, namespace: Namespace, key: &str, load: F) -> Result<T, AppError>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Result<T, crate::db::DatabaseError>,
    {
        let Some(cache) = &self.cache else {
            return Ok(load()?);
        };

        if let Some(cached) = cache.get(namespace, key) {
            if let Ok(value) = serde_json::from_value(cached) {
                cache.record_success();
                return Ok(value);
            }
        }

        let value = load()?;
        cache.record_success();
        if let Ok(json) = serde_json::to_value(&value) {
            cache.set(namespace, key, json);
        }
        Ok(value)
    }

    /// Runs the PII microservice, recording the anonymization as a synthetic
    /// step execution (`step_id = 0`, not backed by any configured
    /// `DynamicStep`) so the feedback analyzer can reconstruct it later.
    /// Falls back to the in-process regex filter when the microservice call
    /// fails and the fallback feature flag is enabled.
    async fn run_pii_removal(&self, conn: &rusqlite::Connection, job_id: i64, text: &str) -> Result<String, AppError> {
        let (cleaned, metadata) = match self.pii_client.remove_pii(text, SOURCE_LANGUAGE).await {
            Ok(response) => (response.cleaned_text, response.metadata),
            Err(err) if self.pii_regex_fallback_enabled => {
                tracing::warn!(job_id, error = %err, "pii microservice unreachable, using regex fallback");
                let fallback = crate::clients::pii::RegexFallbackPiiClient.remove_pii(text);
                (fallback.cleaned_text, fallback.metadata)
            }
            Err(err) => return Err(err),
        };

        step_execution::insert_step_execution(
            conn,
            &self.cipher,
            NewStepExecution {
                job_id,
                step_id: 0,
                step_name: "PII Removal".to_string(),
                step_order: 0,
                status: StepStatus::Completed,
                input_text: Some(text.to_string()),
                output_text: Some(cleaned.clone()),
                model_used: None,
                prompt_used: None,
                confidence: None,
                input_tokens: None,
                output_tokens: None,
                execution_time_ms: None,
                retry_count: 0,
                metadata,
            },
        )?;

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{LlmClient, LlmResponse, OcrClient, OcrResponse, PiiResponse};
    use crate::crypto::Cipher;
    use crate::db::pool::open_pool;
    use crate::models::enums::MimeClass;
    use crate::ocr_router::OcrRouterConfig;
    use crate::resilience::BreakerRegistry;

    struct EchoOcr;
    #[async_trait]
    impl OcrClient for EchoOcr {
        async fn extract(&self, _filename: &str, bytes: Vec<u8>) -> Result<OcrResponse, AppError> {
            Ok(OcrResponse {
                text: String::from_utf8_lossy(&bytes).to_string(),
                confidence: 0.95,
                processing_time_ms: 10,
                engine: "local_text".into(),
                lines_detected: 1,
            })
        }
        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct ScriptedLlm;
    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str, model: &str, _t: f64, _m: i32) -> Result<LlmResponse, AppError> {
            Ok(LlmResponse { text: "Dear patient, your results are normal.".into(), input_tokens: 50, output_tokens: 20, model: model.into() })
        }
        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct StubPii;
    #[async_trait]
    impl PiiClient for StubPii {
        async fn remove_pii(&self, text: &str, _language: &str) -> Result<PiiResponse, AppError> {
            Ok(PiiResponse { cleaned_text: text.replace("Maria Schmidt", "[NAME]"), metadata: serde_json::json!({}) })
        }
        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn setup_pool() -> DbPool {
        let pool = open_pool(":memory:").unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO available_models (provider, name) VALUES ('local', 'mock-model')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO dynamic_steps (name, step_order, prompt_template, model_id)
             VALUES ('Patient-Friendly Translation', 1, 'Translate: {input_text}', 1)",
            [],
        )
        .unwrap();
        pool
    }

    fn processor(pool: DbPool) -> DocumentProcessor {
        let breakers = Arc::new(BreakerRegistry::new());
        let ocr_router = OcrRouter::new(OcrRouterConfig::default(), Arc::new(EchoOcr), Arc::new(ScriptedLlm), breakers.clone());
        let executor = PipelineExecutor::new(Arc::new(ScriptedLlm), breakers);
        DocumentProcessor::new(pool, Cipher::disabled(), ocr_router, Arc::new(StubPii), true, executor, CancelRegistry::new(), "test-worker")
    }

    #[tokio::test]
    async fn a_text_pdf_runs_through_pii_removal_and_completes() {
        let pool = setup_pool();
        let cipher = Cipher::disabled();
        let job = {
            let conn = pool.get().unwrap();
            job_repo::insert_job(
                &conn,
                &cipher,
                job_repo::NewJob {
                    filename: "brief.pdf".into(),
                    mime_class: MimeClass::Pdf,
                    file_bytes: b"Patient Maria Schmidt: Befund unauffaellig.".to_vec(),
                    pipeline_config: serde_json::json!({}),
                    ocr_config: serde_json::json!({}),
                    target_language: None,
                },
            )
            .unwrap()
        };

        let processor = processor(pool.clone());
        processor.handle(job.id).await.unwrap();

        let conn = pool.get().unwrap();
        let completed = job_repo::get_job(&conn, &cipher, job.id).unwrap().unwrap();
        assert_eq!(completed.status, crate::models::enums::JobStatus::Completed);
        assert_eq!(completed.original_text.as_deref(), Some("Patient Maria Schmidt: Befund unauffaellig."));
        assert!(completed.translated_text.unwrap().contains("normal"));

        let executions = step_execution::list_for_job(&conn, &cipher, job.id).unwrap();
        let pii_step = executions.iter().find(|e| e.step_name == "PII Removal").unwrap();
        assert!(!pii_step.output_text.as_ref().unwrap().contains("Maria Schmidt"));
    }

    #[tokio::test]
    async fn a_job_someone_else_already_claimed_is_left_untouched() {
        let pool = setup_pool();
        let cipher = Cipher::disabled();
        let job = {
            let conn = pool.get().unwrap();
            let job = job_repo::insert_job(
                &conn,
                &cipher,
                job_repo::NewJob {
                    filename: "brief.pdf".into(),
                    mime_class: MimeClass::Pdf,
                    file_bytes: b"hello".to_vec(),
                    pipeline_config: serde_json::json!({}),
                    ocr_config: serde_json::json!({}),
                    target_language: None,
                },
            )
            .unwrap();
            job_repo::mark_running(&conn, job.id, "other-worker").unwrap();
            job
        };

        let processor = processor(pool.clone());
        processor.handle(job.id).await.unwrap();

        let conn = pool.get().unwrap();
        let still_running = job_repo::get_job(&conn, &cipher, job.id).unwrap().unwrap();
        assert_eq!(still_running.worker_id.as_deref(), Some("other-worker"));
    }

    #[tokio::test]
    async fn cached_dynamic_steps_survive_a_row_deleted_after_the_first_read() {
        let pool = setup_pool();
        let processor = processor(pool.clone()).with_cache(Arc::new(Cache::new("test", std::time::Duration::from_secs(60))));

        let conn = pool.get().unwrap();
        let first = processor.cached_dynamic_steps(&conn).unwrap();
        assert_eq!(first.len(), 1);

        conn.execute("DELETE FROM dynamic_steps", []).unwrap();

        let second = processor.cached_dynamic_steps(&conn).unwrap();
        assert_eq!(second.len(), 1, "stale cache entry should still be served");
    }

    #[tokio::test]
    async fn without_a_cache_every_read_hits_storage_directly() {
        let pool = setup_pool();
        let processor = processor(pool.clone());

        let conn = pool.get().unwrap();
        assert_eq!(processor.cached_dynamic_steps(&conn).unwrap().len(), 1);
        conn.execute("DELETE FROM dynamic_steps", []).unwrap();
        assert_eq!(processor.cached_dynamic_steps(&conn).unwrap().len(), 0);
    }
}

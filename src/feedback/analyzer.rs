//! Compares three reconstructed texts — original OCR, PII-anonymized, and the
//! final translation — and prompts an LLM for a structured quality report.
//! Grounded in the original Python feedback analysis service: same three-way
//! comparison, same JSON report shape, same consent/content-cleared skip rules.

use std::sync::Arc;

use chrono::Utc;

use crate::clients::LlmClient;
use crate::crypto::Cipher;
use crate::db::repository::{cost_log, feedback, feedback_analysis, job as job_repo, step_execution};
use crate::db::DatabaseError;
use crate::error::AppError;
use crate::models::enums::FeedbackAnalysisStatus;
use crate::models::{AvailableModel, FeedbackAnalysis};
use crate::resilience::{BreakerRegistry, RetryPolicy};
use crate::models::RetryPolicyName;

const MAX_SECTION_CHARS: usize = 8000;

const PII_STEP_KEYWORDS: &[&str] = &["pii", "privacy", "datenschutz", "anonym"];
const EXTRACTION_STEP_KEYWORDS: &[&str] = &["extraction", "ocr", "text"];

pub struct FeedbackAnalyzer {
    llm: Arc<dyn LlmClient>,
    breakers: Arc<BreakerRegistry>,
}

impl FeedbackAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { llm, breakers }
    }

    /// Runs the analysis for one feedback entry and persists the result,
    /// whichever of COMPLETED/SKIPPED/FAILED it lands on.
    pub async fn analyze(
        &self,
        conn: &rusqlite::Connection,
        cipher: &Cipher,
        feedback_id: i64,
        model: &AvailableModel,
    ) -> Result<FeedbackAnalysis, AppError> {
        let fb = feedback::get(conn, feedback_id)?
            .ok_or_else(|| AppError::NotFound(format!("feedback {feedback_id}")))?;

        if !fb.data_consent_given {
            return self.persist(conn, feedback_id, skipped("user did not consent to data usage"));
        }

        let Some(job) = job_repo::get_job_by_processing_id(conn, cipher, &fb.processing_id)? else {
            return self.persist(conn, feedback_id, skipped("source job no longer exists"));
        };

        let (Some(original_text), Some(translated_text)) = (&job.original_text, &job.translated_text) else {
            return self.persist(conn, feedback_id, skipped("processing content not available (may have been cleared)"));
        };

        let pii_text = reconstruct_pii_text(conn, cipher, job.id, original_text)?;
        let prompt = build_prompt(original_text, &pii_text, translated_text);

        let breaker = self.breakers.get_or_create(&model.provider);
        let policy = RetryPolicy::preset(RetryPolicyName::Api);
        let llm = self.llm.clone();
        let model_name = model.name.clone();
        let call_result = policy
            .call(&model.provider, || {
                let breaker = breaker.clone();
                let llm = llm.clone();
                let prompt = prompt.clone();
                let model_name = model_name.clone();
                async move { breaker.call(|| llm.complete(&prompt, &model_name, 0.3, 2000)).await }
            })
            .await;

        let response = match call_result {
            Ok(response) => response,
            Err(err) => {
                return self.persist(
                    conn,
                    feedback_id,
                    FeedbackAnalysis {
                        feedback_id,
                        status: FeedbackAnalysisStatus::Failed,
                        pii_leaks: vec![],
                        translation_issues: vec![],
                        recommendations: vec![],
                        overall_score: None,
                        error_message: Some(err.to_string()),
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                );
            }
        };

        cost_log::insert(
            conn,
            &fb.processing_id,
            "Feedback Analysis",
            &model.name,
            response.input_tokens,
            response.output_tokens,
            model.estimated_cost(response.input_tokens, response.output_tokens),
        )?;

        let parsed = parse_report(&response.text);
        self.persist(
            conn,
            feedback_id,
            FeedbackAnalysis {
                feedback_id,
                status: FeedbackAnalysisStatus::Completed,
                pii_leaks: parsed.pii_leaks,
                translation_issues: parsed.translation_issues,
                recommendations: parsed.recommendations,
                overall_score: Some(parsed.overall_score),
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        )
    }

    fn persist(
        &self,
        conn: &rusqlite::Connection,
        feedback_id: i64,
        mut analysis: FeedbackAnalysis,
    ) -> Result<FeedbackAnalysis, AppError> {
        analysis.feedback_id = feedback_id;
        feedback_analysis::upsert(conn, &analysis)?;
        Ok(analysis)
    }
}

fn skipped(reason: &str) -> FeedbackAnalysis {
    FeedbackAnalysis {
        feedback_id: 0,
        status: FeedbackAnalysisStatus::Skipped,
        pii_leaks: vec![],
        translation_issues: vec![],
        recommendations: vec![],
        overall_score: None,
        error_message: Some(reason.to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Finds the step execution whose output is the PII-anonymized text: first a
/// step named for PII handling, then an extraction/OCR step as a fallback,
/// then the original text itself if neither is recorded.
fn reconstruct_pii_text(
    conn: &rusqlite::Connection,
    cipher: &Cipher,
    job_id: i64,
    original_text: &str,
) -> Result<String, DatabaseError> {
    let executions = step_execution::list_for_job(conn, cipher, job_id)?;

    let by_keywords = |keywords: &[&str]| {
        executions.iter().find_map(|exec| {
            let name = exec.step_name.to_lowercase();
            if keywords.iter().any(|k| name.contains(k)) {
                exec.output_text.clone()
            } else {
                None
            }
        })
    };

    Ok(by_keywords(PII_STEP_KEYWORDS)
        .or_else(|| by_keywords(EXTRACTION_STEP_KEYWORDS))
        .unwrap_or_else(|| original_text.to_string()))
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() > max_len {
        format!("{}\n\n[... truncated for analysis ...]", &text[..max_len])
    } else {
        text.to_string()
    }
}

fn build_prompt(original_text: &str, pii_text: &str, translated_text: &str) -> String {
    format!(
        "You are a medical translation quality analyst. Analyze the quality and \
         privacy compliance of this document translation.\n\n\
         ## Original OCR Text:\n{}\n\n\
         ## After PII Anonymization:\n{}\n\n\
         ## Final Patient-Friendly Translation:\n{}\n\n\
         Respond ONLY with JSON in this exact structure, no other text:\n\
         {{\"pii_issues\": [], \"translation_issues\": [], \"recommendations\": [], \"overall_quality_score\": 0}}",
        truncate(original_text, MAX_SECTION_CHARS),
        truncate(pii_text, MAX_SECTION_CHARS),
        truncate(translated_text, MAX_SECTION_CHARS),
    )
}

struct ParsedReport {
    pii_leaks: Vec<String>,
    translation_issues: Vec<String>,
    recommendations: Vec<String>,
    overall_score: f64,
}

/// Tries a direct JSON parse first, then the first `{...}` span in the
/// response, then falls back to a parse-error report rather than failing the
/// whole analysis over a malformed LLM reply.
fn parse_report(response_text: &str) -> ParsedReport {
    let value = serde_json::from_str::<serde_json::Value>(response_text)
        .ok()
        .or_else(|| extract_json_object(response_text));

    let Some(value) = value else {
        return ParsedReport {
            pii_leaks: vec![],
            translation_issues: vec!["failed to parse AI analysis response".to_string()],
            recommendations: vec!["check AI response format".to_string()],
            overall_score: 0.0,
        };
    };

    ParsedReport {
        pii_leaks: string_array(&value, "pii_issues"),
        translation_issues: string_array(&value, "translation_issues"),
        recommendations: string_array(&value, "recommendations"),
        overall_score: value["overall_quality_score"].as_f64().unwrap_or(0.0),
    }
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value[key]
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::job::{insert_job, NewJob};
    use crate::db::repository::{feedback as feedback_repo, step_execution as step_repo};
    use crate::models::enums::{MimeClass, StepStatus};
    use crate::models::NewFeedback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLlm {
        response: String,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str, _model: &str, _t: f64, _m: i32) -> Result<crate::clients::LlmResponse, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::clients::LlmResponse {
                text: self.response.clone(),
                input_tokens: 100,
                output_tokens: 50,
                model: "mistral-large-latest".into(),
            })
        }
        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn setup_conn() -> rusqlite::Connection {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        conn
    }

    fn sample_model() -> AvailableModel {
        AvailableModel {
            id: 1,
            provider: "mistral".into(),
            name: "mistral-large-latest".into(),
            supports_vision: false,
            cost_per_1k_input_tokens: 0.002,
            cost_per_1k_output_tokens: 0.006,
            enabled: true,
        }
    }

    fn insert_completed_job(conn: &rusqlite::Connection, cipher: &Cipher) -> (i64, uuid::Uuid) {
        let job = insert_job(
            conn,
            cipher,
            NewJob {
                filename: "arztbrief.pdf".into(),
                mime_class: MimeClass::Pdf,
                file_bytes: b"fake".to_vec(),
                pipeline_config: serde_json::json!({}),
                ocr_config: serde_json::json!({}),
                target_language: Some("en".into()),
            },
        )
        .unwrap();
        crate::db::repository::job::mark_completed(
            conn,
            cipher,
            job.id,
            crate::db::repository::job::JobCompletion {
                original_text: Some("Patient Maria Schmidt, geboren 01.02.1980.".into()),
                translated_text: Some("Dear patient, your results are normal.".into()),
                language_translated_text: None,
                document_type_detected: Some("ARZTBRIEF".into()),
                confidence_score: Some(0.9),
                branching_path: Some("ARZTBRIEF".into()),
            },
        )
        .unwrap();
        (job.id, job.processing_id)
    }

    #[tokio::test]
    async fn no_consent_is_skipped_without_calling_the_llm() {
        let mut conn = setup_conn();
        let cipher = Cipher::disabled();
        let (_job_id, processing_id) = insert_completed_job(&conn, &cipher);
        let fb = feedback_repo::insert_with_consent_clearing(
            &mut conn,
            &NewFeedback {
                processing_id,
                overall_rating: 3,
                detailed_ratings: None,
                comment: None,
                data_consent_given: false,
            },
        )
        .unwrap();

        let llm = Arc::new(ScriptedLlm { response: "{}".into(), calls: AtomicUsize::new(0) });
        let analyzer = FeedbackAnalyzer::new(llm.clone(), Arc::new(BreakerRegistry::new()));
        let result = analyzer.analyze(&conn, &cipher, fb.id, &sample_model()).await.unwrap();

        assert_eq!(result.status, FeedbackAnalysisStatus::Skipped);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_content_is_skipped() {
        let mut conn = setup_conn();
        let cipher = Cipher::disabled();
        let job = insert_job(
            &conn,
            &cipher,
            NewJob {
                filename: "menu.jpg".into(),
                mime_class: MimeClass::Image,
                file_bytes: b"fake".to_vec(),
                pipeline_config: serde_json::json!({}),
                ocr_config: serde_json::json!({}),
                target_language: None,
            },
        )
        .unwrap();
        let fb = feedback_repo::insert_with_consent_clearing(
            &mut conn,
            &NewFeedback {
                processing_id: job.processing_id,
                overall_rating: 4,
                detailed_ratings: None,
                comment: None,
                data_consent_given: true,
            },
        )
        .unwrap();

        let analyzer = FeedbackAnalyzer::new(
            Arc::new(ScriptedLlm { response: "{}".into(), calls: AtomicUsize::new(0) }),
            Arc::new(BreakerRegistry::new()),
        );
        let result = analyzer.analyze(&conn, &cipher, fb.id, &sample_model()).await.unwrap();
        assert_eq!(result.status, FeedbackAnalysisStatus::Skipped);
    }

    #[tokio::test]
    async fn completed_job_produces_a_parsed_report_and_logs_cost() {
        let mut conn = setup_conn();
        let cipher = Cipher::disabled();
        let (job_id, processing_id) = insert_completed_job(&conn, &cipher);
        step_repo::insert_step_execution(
            &conn,
            &cipher,
            crate::models::NewStepExecution {
                job_id,
                step_id: 0,
                step_name: "PII Removal".into(),
                step_order: 0,
                status: StepStatus::Completed,
                input_text: Some("Patient Maria Schmidt, geboren 01.02.1980.".into()),
                output_text: Some("Patient [NAME], geboren [DATE].".into()),
                model_used: None,
                prompt_used: None,
                confidence: None,
                input_tokens: None,
                output_tokens: None,
                execution_time_ms: None,
                retry_count: 0,
                metadata: serde_json::json!({}),
            },
        )
        .unwrap();
        let fb = feedback_repo::insert_with_consent_clearing(
            &mut conn,
            &NewFeedback {
                processing_id,
                overall_rating: 5,
                detailed_ratings: None,
                comment: Some("helpful".into()),
                data_consent_given: true,
            },
        )
        .unwrap();

        let analyzer = FeedbackAnalyzer::new(
            Arc::new(ScriptedLlm {
                response: r#"{"pii_issues": [], "translation_issues": ["minor tone issue"], "recommendations": ["simplify wording"], "overall_quality_score": 8}"#.into(),
                calls: AtomicUsize::new(0),
            }),
            Arc::new(BreakerRegistry::new()),
        );

        let result = analyzer.analyze(&conn, &cipher, fb.id, &sample_model()).await.unwrap();
        assert_eq!(result.status, FeedbackAnalysisStatus::Completed);
        assert_eq!(result.overall_score, Some(8.0));
        assert_eq!(result.translation_issues, vec!["minor tone issue".to_string()]);

        let costs = cost_log::list_for_processing_id(&conn, &processing_id).unwrap();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].step_name, "Feedback Analysis");
    }

    #[test]
    fn malformed_response_falls_back_to_a_parse_error_report() {
        let report = parse_report("not json at all");
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.translation_issues, vec!["failed to parse AI analysis response".to_string()]);
    }

    #[test]
    fn json_embedded_in_surrounding_prose_is_still_extracted() {
        let report = parse_report("Here is my analysis:\n{\"overall_quality_score\": 7, \"pii_issues\": [\"leaked phone number\"]}\nThanks.");
        assert_eq!(report.overall_score, 7.0);
        assert_eq!(report.pii_leaks, vec!["leaked phone number".to_string()]);
    }
}

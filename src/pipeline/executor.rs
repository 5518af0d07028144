//! Runs a job's pipeline end-to-end: three-band step ordering, branching,
//! context substitution, stop conditions, retry/circuit-breaker wrapped calls,
//! cost accounting, and progress reporting.

use std::sync::Arc;

use rusqlite::Connection;

use crate::clients::guideline::{format_bilingual, GuidelineClient};
use crate::clients::LlmClient;
use crate::crypto::Cipher;
use crate::db::repository::{cost_log, job as job_repo, step_execution as step_repo};
use crate::db::DatabaseError;
use crate::error::AppError;
use crate::models::enums::StepStatus;
use crate::models::{AvailableModel, DocumentClass, DynamicStep, NewStepExecution};
use crate::resilience::{BreakerRegistry, RetryPolicy};

use super::branching;
use super::context::{Context, INPUT_TEXT_KEY};

#[derive(Debug, Clone)]
pub enum ExecutorOutcome {
    Completed {
        translated_text: String,
        language_translated_text: Option<String>,
        document_type_detected: Option<String>,
        branching_path: Option<String>,
    },
    Terminated {
        reason: String,
        message: String,
        step: String,
        matched_value: String,
    },
    Failed {
        step: String,
        message: String,
    },
    Cancelled,
}

pub struct PipelineExecutor {
    llm: Arc<dyn LlmClient>,
    breakers: Arc<BreakerRegistry>,
    guideline: Option<Arc<dyn GuidelineClient>>,
}

impl PipelineExecutor {
    pub fn new(llm: Arc<dyn LlmClient>, breakers: Arc<BreakerRegistry>) -> Self {
        Self { llm, breakers, guideline: None }
    }

    /// A step whose model is provider `"dify"` dispatches to the guideline RAG
    /// client instead of the LLM client; without one configured, such steps fail.
    pub fn with_guideline_client(mut self, guideline: Arc<dyn GuidelineClient>) -> Self {
        self.guideline = Some(guideline);
        self
    }

    /// Runs every enabled step for `job_id` against the given snapshot, persisting
    /// a `StepExecution` per attempt and updating job progress as it goes. Applies
    /// the job's FAILED/TERMINATED/CANCELLED transition itself, since those need
    /// nothing beyond what it already has; COMPLETED is left to the caller, which
    /// holds the OCR confidence score and original text this function never sees.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        conn: &Connection,
        cipher: &Cipher,
        job_id: i64,
        processing_id: &uuid::Uuid,
        steps: &[DynamicStep],
        classes: &[DocumentClass],
        models: &[AvailableModel],
        ocr_text: &str,
        target_language: Option<&str>,
        is_cancelled: &dyn Fn() -> bool,
    ) -> Result<ExecutorOutcome, AppError> {
        let pre: Vec<&DynamicStep> = steps.iter().filter(|s| s.is_universal_pre()).collect();
        let class_specific: Vec<&DynamicStep> = steps.iter().filter(|s| s.is_class_specific()).collect();
        let post: Vec<&DynamicStep> = steps.iter().filter(|s| s.is_universal_post()).collect();

        let mut ctx = Context::new();
        ctx.set(INPUT_TEXT_KEY, ocr_text);
        if let Some(lang) = target_language {
            ctx.set("target_language", lang);
        }

        let mut last_output = ocr_text.to_string();
        let mut language_translated_text: Option<String> = None;
        let mut document_type_detected: Option<String> = None;
        let mut branching_path: Option<String> = None;
        let mut selected_class_id: Option<i64> = None;

        let mut total = pre.len() + class_specific.len() + post.len();
        let mut completed = 0usize;

        for step in pre {
            if is_cancelled() {
                job_repo::mark_cancelled(conn, job_id)?;
                return Ok(ExecutorOutcome::Cancelled);
            }

            let run_result = self
                .run_one_step(conn, cipher, job_id, processing_id, step, &mut ctx, &last_output, ocr_text, models)
                .await?;

            match run_result {
                StepOutcome::Skipped => {}
                StepOutcome::Completed { output, .. } => {
                    if step.name.to_lowercase().contains("language") {
                        language_translated_text = Some(output.clone());
                    }
                    if step.is_branching_step {
                        let field = step.branching_field.as_deref().unwrap_or("document_class");
                        let outcome = branching::resolve(&output, field, classes);
                        branching_path = outcome.raw_value.clone();
                        if let Some(class) = outcome.selected_class {
                            document_type_detected = Some(class.class_key.clone());
                            ctx.set("document_class", class.class_key.clone());
                            ctx.set("document_type", class.class_key.clone());
                            selected_class_id = Some(class.id);
                        }
                        // Only steps pinned to the selected class (or none, if no match) count from here on.
                        total = pre_count_static(&steps.to_vec())
                            + class_specific.iter().filter(|s| s.document_class_id == selected_class_id).count()
                            + post.len();
                    }
                    last_output = output;
                }
                StepOutcome::Terminated { reason, message, matched_value } => {
                    job_repo::mark_terminated(
                        conn,
                        job_id,
                        job_repo::Termination {
                            reason: &reason,
                            message: &message,
                            step: &step.name,
                            matched_value: &matched_value,
                        },
                    )?;
                    return Ok(ExecutorOutcome::Terminated { reason, message, step: step.name.clone(), matched_value });
                }
                StepOutcome::Failed { message } => {
                    job_repo::mark_failed(conn, job_id, &step.name, &message)?;
                    return Ok(ExecutorOutcome::Failed { step: step.name.clone(), message });
                }
            }

            completed += 1;
            self.report_progress(conn, job_id, completed, total, &step.name)?;
        }

        for step in class_specific.iter().filter(|s| s.document_class_id == selected_class_id) {
            if is_cancelled() {
                job_repo::mark_cancelled(conn, job_id)?;
                return Ok(ExecutorOutcome::Cancelled);
            }

            let run_result = self
                .run_one_step(conn, cipher, job_id, processing_id, step, &mut ctx, &last_output, ocr_text, models)
                .await?;

            match run_result {
                StepOutcome::Skipped => {}
                StepOutcome::Completed { output, .. } => {
                    last_output = output;
                }
                StepOutcome::Terminated { reason, message, matched_value } => {
                    job_repo::mark_terminated(
                        conn,
                        job_id,
                        job_repo::Termination {
                            reason: &reason,
                            message: &message,
                            step: &step.name,
                            matched_value: &matched_value,
                        },
                    )?;
                    return Ok(ExecutorOutcome::Terminated { reason, message, step: step.name.clone(), matched_value });
                }
                StepOutcome::Failed { message } => {
                    // Class-specific steps are required: their failure fails the whole job.
                    job_repo::mark_failed(conn, job_id, &step.name, &message)?;
                    return Ok(ExecutorOutcome::Failed { step: step.name.clone(), message });
                }
            }

            completed += 1;
            self.report_progress(conn, job_id, completed, total, &step.name)?;
        }

        for step in post {
            if is_cancelled() {
                job_repo::mark_cancelled(conn, job_id)?;
                return Ok(ExecutorOutcome::Cancelled);
            }

            let run_result = self
                .run_one_step(conn, cipher, job_id, processing_id, step, &mut ctx, &last_output, ocr_text, models)
                .await?;

            match run_result {
                StepOutcome::Skipped => {}
                StepOutcome::Completed { output, .. } => {
                    if step.name.to_lowercase().contains("language") {
                        language_translated_text = Some(output.clone());
                    }
                    last_output = output;
                }
                StepOutcome::Terminated { reason, message, matched_value } => {
                    job_repo::mark_terminated(
                        conn,
                        job_id,
                        job_repo::Termination {
                            reason: &reason,
                            message: &message,
                            step: &step.name,
                            matched_value: &matched_value,
                        },
                    )?;
                    return Ok(ExecutorOutcome::Terminated { reason, message, step: step.name.clone(), matched_value });
                }
                StepOutcome::Failed { message } => {
                    // Post-branching steps are best-effort: log and keep the previous output.
                    tracing::warn!(step = %step.name, error = %message, "best-effort step failed, continuing with prior output");
                }
            }

            completed += 1;
            self.report_progress(conn, job_id, completed, total, &step.name)?;
        }

        Ok(ExecutorOutcome::Completed {
            translated_text: last_output,
            language_translated_text,
            document_type_detected,
            branching_path,
        })
    }

    /// Records a Failed step execution for a step that never reached the LLM call
    /// (bad prompt template, deleted model) and turns it into a `StepOutcome::Failed`
    /// instead of aborting `run_one_step` with `?`.
    fn fail_step(
        &self,
        conn: &Connection,
        cipher: &Cipher,
        job_id: i64,
        step: &DynamicStep,
        prompt: Option<String>,
        message: String,
    ) -> Result<StepOutcome, AppError> {
        step_repo::insert_step_execution(
            conn,
            cipher,
            NewStepExecution {
                job_id,
                step_id: step.id,
                step_name: step.name.clone(),
                step_order: step.order,
                status: StepStatus::Failed,
                input_text: prompt.clone(),
                output_text: None,
                model_used: None,
                prompt_used: prompt,
                confidence: None,
                input_tokens: None,
                output_tokens: None,
                execution_time_ms: None,
                retry_count: 0,
                metadata: serde_json::json!({ "error": message }),
            },
        )?;
        Ok(StepOutcome::Failed { message })
    }

    /// Queries the guideline RAG service in German, optionally asks the LLM
    /// client to translate the recommendation into `target_language`, and
    /// formats the two with bilingual headers, per the guideline client's
    /// own documented output contract.
    async fn run_guideline_step(
        &self,
        conn: &Connection,
        cipher: &Cipher,
        job_id: i64,
        step: &DynamicStep,
        query_de: &str,
        target_language: Option<&str>,
        models: &[AvailableModel],
    ) -> Result<StepOutcome, AppError> {
        let Some(guideline) = self.guideline.clone() else {
            return self.fail_step(conn, cipher, job_id, step, Some(query_de.to_string()), "no guideline RAG client configured".into());
        };

        let mut policy = RetryPolicy::preset(step.retry_policy);
        policy.max_attempts = if step.retry_on_failure { (step.max_retries + 1).max(1) as u32 } else { 1 };
        let breaker = self.breakers.get_or_create("dify");

        let started = std::time::Instant::now();
        let query = query_de.to_string();
        let answer_de = match policy
            .call("dify", || {
                let breaker = breaker.clone();
                let guideline = guideline.clone();
                let query = query.clone();
                async move { breaker.call(|| guideline.query(&query)).await }
            })
            .await
        {
            Ok(answer) => answer,
            Err(err) => return self.fail_step(conn, cipher, job_id, step, Some(query_de.to_string()), err.to_string()),
        };

        let output = match target_language {
            Some(lang) if !lang.eq_ignore_ascii_case("de") => match models.iter().find(|m| m.provider != "dify") {
                Some(translation_model) => {
                    let translate_prompt =
                        format!("Translate this German clinical guideline recommendation into {lang}, keep it concise:\n\n{answer_de}");
                    match self.llm.complete(&translate_prompt, &translation_model.name, 0.2, step.max_tokens).await {
                        Ok(response) => format_bilingual(&answer_de, &response.text, lang),
                        Err(err) => {
                            tracing::warn!(step = %step.name, error = %err, "guideline translation failed, keeping German text only");
                            answer_de.clone()
                        }
                    }
                }
                None => answer_de.clone(),
            },
            _ => answer_de.clone(),
        };
        let elapsed_ms = started.elapsed().as_millis() as i64;

        step_repo::insert_step_execution(
            conn,
            cipher,
            NewStepExecution {
                job_id,
                step_id: step.id,
                step_name: step.name.clone(),
                step_order: step.order,
                status: StepStatus::Completed,
                input_text: Some(query_de.to_string()),
                output_text: Some(output.clone()),
                model_used: Some("dify-guideline".into()),
                prompt_used: Some(query_de.to_string()),
                confidence: None,
                input_tokens: None,
                output_tokens: None,
                execution_time_ms: Some(elapsed_ms),
                retry_count: 0,
                metadata: serde_json::json!({}),
            },
        )?;

        Ok(StepOutcome::Completed { output })
    }

    fn report_progress(&self, conn: &Connection, job_id: i64, completed: usize, total: usize, step_name: &str) -> Result<(), DatabaseError> {
        let percent = if total == 0 { 100 } else { ((100 * completed) / total) as i32 };
        job_repo::update_progress(conn, job_id, percent, Some(step_name))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one_step(
        &self,
        conn: &Connection,
        cipher: &Cipher,
        job_id: i64,
        processing_id: &uuid::Uuid,
        step: &DynamicStep,
        ctx: &mut Context,
        previous_output: &str,
        ocr_text: &str,
        models: &[AvailableModel],
    ) -> Result<StepOutcome, AppError> {
        for var in &step.required_context_variables {
            if !ctx.is_present_and_non_empty(var) {
                step_repo::insert_step_execution(
                    conn,
                    cipher,
                    NewStepExecution {
                        job_id,
                        step_id: step.id,
                        step_name: step.name.clone(),
                        step_order: step.order,
                        status: StepStatus::Skipped,
                        input_text: None,
                        output_text: None,
                        model_used: None,
                        prompt_used: None,
                        confidence: None,
                        input_tokens: None,
                        output_tokens: None,
                        execution_time_ms: None,
                        retry_count: 0,
                        metadata: serde_json::json!({ "skip_reason": format!("missing context variable {var}") }),
                    },
                )?;
                return Ok(StepOutcome::Skipped);
            }
        }

        ctx.set(INPUT_TEXT_KEY, if step.input_from_previous_step { previous_output } else { ocr_text });
        let prompt = match ctx.substitute(&step.prompt_template) {
            Ok(prompt) => prompt,
            Err(err) => return self.fail_step(conn, cipher, job_id, step, None, err.to_string()),
        };

        let model = match models.iter().find(|m| m.id == step.model_id) {
            Some(model) => model,
            None => {
                let message = format!("model {} not found for step {}", step.model_id, step.name);
                return self.fail_step(conn, cipher, job_id, step, Some(prompt), message);
            }
        };

        if model.provider == "dify" {
            return self.run_guideline_step(conn, cipher, job_id, step, &prompt, ctx.get("target_language"), models).await;
        }

        let mut policy = RetryPolicy::preset(step.retry_policy);
        policy.max_attempts = if step.retry_on_failure { (step.max_retries + 1).max(1) as u32 } else { 1 };

        let breaker = self.breakers.get_or_create(&model.provider);
        let llm = self.llm.clone();
        let prompt_clone = prompt.clone();
        let model_name = model.name.clone();
        let temperature = step.temperature;
        let max_tokens = step.max_tokens;

        let started = std::time::Instant::now();
        let call_result = policy
            .call(&model.provider, || {
                let breaker = breaker.clone();
                let llm = llm.clone();
                let prompt = prompt_clone.clone();
                let model_name = model_name.clone();
                async move { breaker.call(|| llm.complete(&prompt, &model_name, temperature, max_tokens)).await }
            })
            .await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match call_result {
            Ok(response) => {
                cost_log::insert(
                    conn,
                    processing_id,
                    &step.name,
                    &response.model,
                    response.input_tokens,
                    response.output_tokens,
                    model.estimated_cost(response.input_tokens, response.output_tokens),
                )?;

                step_repo::insert_step_execution(
                    conn,
                    cipher,
                    NewStepExecution {
                        job_id,
                        step_id: step.id,
                        step_name: step.name.clone(),
                        step_order: step.order,
                        status: StepStatus::Completed,
                        input_text: Some(prompt.clone()),
                        output_text: Some(response.text.clone()),
                        model_used: Some(response.model.clone()),
                        prompt_used: Some(prompt),
                        confidence: None,
                        input_tokens: Some(response.input_tokens),
                        output_tokens: Some(response.output_tokens),
                        execution_time_ms: Some(elapsed_ms),
                        retry_count: 0,
                        metadata: serde_json::json!({}),
                    },
                )?;

                for condition in &step.stop_conditions {
                    if let Some(matched) = condition.matches(&response.text) {
                        return Ok(StepOutcome::Terminated {
                            reason: condition.reason.clone(),
                            message: condition.message.clone(),
                            matched_value: matched.to_string(),
                        });
                    }
                }

                Ok(StepOutcome::Completed { output: response.text })
            }
            Err(err) => {
                step_repo::insert_step_execution(
                    conn,
                    cipher,
                    NewStepExecution {
                        job_id,
                        step_id: step.id,
                        step_name: step.name.clone(),
                        step_order: step.order,
                        status: StepStatus::Failed,
                        input_text: Some(prompt.clone()),
                        output_text: None,
                        model_used: Some(model.name.clone()),
                        prompt_used: Some(prompt),
                        confidence: None,
                        input_tokens: None,
                        output_tokens: None,
                        execution_time_ms: Some(elapsed_ms),
                        retry_count: 0,
                        metadata: serde_json::json!({ "error": err.to_string() }),
                    },
                )?;
                Ok(StepOutcome::Failed { message: err.to_string() })
            }
        }
    }
}

fn pre_count_static(steps: &[DynamicStep]) -> usize {
    steps.iter().filter(|s| s.is_universal_pre()).count()
}

enum StepOutcome {
    Skipped,
    Completed { output: String },
    Terminated { reason: String, message: String, matched_value: String },
    Failed { message: String },
}

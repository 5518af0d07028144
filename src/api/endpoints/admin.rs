//! Read/write surface for the configuration entities that drive the pipeline
//! (dynamic steps, document classes, models, OCR configuration, system
//! settings) plus the cost log aggregate. Authentication/RBAC in front of
//! these routes is an external collaborator's concern, not this crate's.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::cache::Namespace;
use crate::db::repository::{available_model, cost_log, document_class, dynamic_step, ocr_configuration, system_setting};
use crate::error::AppError;
use crate::models::dynamic_step::{RetryPolicyName, StopCondition};
use crate::models::enums::OcrEngine;
use crate::models::{AvailableModel, DocumentClass, DynamicStep, OcrConfiguration, SystemSetting};

fn conn(ctx: &ApiContext) -> Result<crate::db::PooledConn, ApiError> {
    ctx.pool.get().map_err(|e| ApiError::from(crate::db::DatabaseError::from(e)))
}

fn invalidate(ctx: &ApiContext, namespace: Namespace) {
    if let Some(cache) = &ctx.cache {
        cache.invalidate_namespace(namespace);
    }
}

// ── Dynamic steps ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DynamicStepBody {
    pub name: String,
    pub order: i32,
    pub enabled: bool,
    pub prompt_template: String,
    pub model_id: i64,
    pub temperature: f64,
    pub max_tokens: i32,
    pub retry_on_failure: bool,
    pub max_retries: i32,
    pub retry_policy: RetryPolicyName,
    pub input_from_previous_step: bool,
    pub output_format: Option<String>,
    pub document_class_id: Option<i64>,
    pub is_branching_step: bool,
    pub branching_field: Option<String>,
    pub post_branching: bool,
    #[serde(default)]
    pub required_context_variables: Vec<String>,
    #[serde(default)]
    pub stop_conditions: Vec<StopCondition>,
}

impl From<DynamicStepBody> for dynamic_step::NewDynamicStep {
    fn from(b: DynamicStepBody) -> Self {
        Self {
            name: b.name,
            order: b.order,
            enabled: b.enabled,
            prompt_template: b.prompt_template,
            model_id: b.model_id,
            temperature: b.temperature,
            max_tokens: b.max_tokens,
            retry_on_failure: b.retry_on_failure,
            max_retries: b.max_retries,
            retry_policy: b.retry_policy,
            input_from_previous_step: b.input_from_previous_step,
            output_format: b.output_format,
            document_class_id: b.document_class_id,
            is_branching_step: b.is_branching_step,
            branching_field: b.branching_field,
            post_branching: b.post_branching,
            required_context_variables: b.required_context_variables,
            stop_conditions: b.stop_conditions,
        }
    }
}

pub async fn list_steps(State(ctx): State<ApiContext>) -> Result<Json<Vec<DynamicStep>>, ApiError> {
    Ok(Json(dynamic_step::list_all(&conn(&ctx)?)?))
}

pub async fn create_step(State(ctx): State<ApiContext>, Json(body): Json<DynamicStepBody>) -> Result<Json<DynamicStep>, ApiError> {
    let created = dynamic_step::insert(&conn(&ctx)?, &body.into())?;
    invalidate(&ctx, Namespace::PipelineSteps);
    Ok(Json(created))
}

pub async fn update_step(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<DynamicStepBody>,
) -> Result<Json<DynamicStep>, ApiError> {
    let updated = dynamic_step::update(&conn(&ctx)?, id, &body.into())?;
    invalidate(&ctx, Namespace::PipelineSteps);
    Ok(Json(updated))
}

pub async fn delete_step(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    if dynamic_step::delete(&conn(&ctx)?, id)? {
        invalidate(&ctx, Namespace::PipelineSteps);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("dynamic step {id}")).into())
    }
}

// ── Document classes ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct DocumentClassBody {
    pub class_key: String,
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub strong_indicators: Vec<String>,
    #[serde(default)]
    pub weak_indicators: Vec<String>,
    pub enabled: bool,
}

impl From<DocumentClassBody> for document_class::NewDocumentClass {
    fn from(b: DocumentClassBody) -> Self {
        Self {
            class_key: b.class_key,
            display_name: b.display_name,
            description: b.description,
            strong_indicators: b.strong_indicators,
            weak_indicators: b.weak_indicators,
            enabled: b.enabled,
        }
    }
}

pub async fn list_classes(State(ctx): State<ApiContext>) -> Result<Json<Vec<DocumentClass>>, ApiError> {
    Ok(Json(document_class::list_all(&conn(&ctx)?)?))
}

pub async fn create_class(State(ctx): State<ApiContext>, Json(body): Json<DocumentClassBody>) -> Result<Json<DocumentClass>, ApiError> {
    let created = document_class::insert(&conn(&ctx)?, &body.into())?;
    invalidate(&ctx, Namespace::DocumentClasses);
    Ok(Json(created))
}

pub async fn update_class(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<DocumentClassBody>,
) -> Result<Json<DocumentClass>, ApiError> {
    let updated = document_class::update(&conn(&ctx)?, id, &body.into())?;
    invalidate(&ctx, Namespace::DocumentClasses);
    Ok(Json(updated))
}

pub async fn delete_class(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    if document_class::delete(&conn(&ctx)?, id)? {
        invalidate(&ctx, Namespace::DocumentClasses);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("document class {id}")).into())
    }
}

// ── Available models ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct AvailableModelBody {
    pub provider: String,
    pub name: String,
    pub supports_vision: bool,
    pub cost_per_1k_input_tokens: f64,
    pub cost_per_1k_output_tokens: f64,
    pub enabled: bool,
}

impl From<AvailableModelBody> for available_model::NewAvailableModel {
    fn from(b: AvailableModelBody) -> Self {
        Self {
            provider: b.provider,
            name: b.name,
            supports_vision: b.supports_vision,
            cost_per_1k_input_tokens: b.cost_per_1k_input_tokens,
            cost_per_1k_output_tokens: b.cost_per_1k_output_tokens,
            enabled: b.enabled,
        }
    }
}

pub async fn list_models(State(ctx): State<ApiContext>) -> Result<Json<Vec<AvailableModel>>, ApiError> {
    Ok(Json(available_model::list_all(&conn(&ctx)?)?))
}

pub async fn create_model(State(ctx): State<ApiContext>, Json(body): Json<AvailableModelBody>) -> Result<Json<AvailableModel>, ApiError> {
    let created = available_model::insert(&conn(&ctx)?, &body.into())?;
    invalidate(&ctx, Namespace::AvailableModels);
    Ok(Json(created))
}

pub async fn update_model(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<AvailableModelBody>,
) -> Result<Json<AvailableModel>, ApiError> {
    let updated = available_model::update(&conn(&ctx)?, id, &body.into())?;
    invalidate(&ctx, Namespace::AvailableModels);
    Ok(Json(updated))
}

pub async fn delete_model(State(ctx): State<ApiContext>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    if available_model::delete(&conn(&ctx)?, id)? {
        invalidate(&ctx, Namespace::AvailableModels);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("available model {id}")).into())
    }
}

// ── OCR configuration (process-wide singleton) ─────────────────

#[derive(Deserialize)]
pub struct OcrConfigurationBody {
    pub engine: OcrEngine,
    pub engine_config: serde_json::Value,
    pub pii_removal_enabled: bool,
    pub vision_llm_fallback_enabled: bool,
}

pub async fn get_ocr_configuration(State(ctx): State<ApiContext>) -> Result<Json<OcrConfiguration>, ApiError> {
    Ok(Json(ocr_configuration::get_active(&conn(&ctx)?)?))
}

pub async fn update_ocr_configuration(
    State(ctx): State<ApiContext>,
    Json(body): Json<OcrConfigurationBody>,
) -> Result<Json<OcrConfiguration>, ApiError> {
    let updated = ocr_configuration::update(
        &conn(&ctx)?,
        &OcrConfiguration {
            id: 1,
            engine: body.engine,
            engine_config: body.engine_config,
            pii_removal_enabled: body.pii_removal_enabled,
            vision_llm_fallback_enabled: body.vision_llm_fallback_enabled,
        },
    )?;
    invalidate(&ctx, Namespace::OcrConfig);
    Ok(Json(updated))
}

// ── System settings ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SystemSettingBody {
    pub value: String,
    #[serde(default)]
    pub encrypted: bool,
}

pub async fn get_setting(State(ctx): State<ApiContext>, Path(key): Path<String>) -> Result<Json<SystemSetting>, ApiError> {
    system_setting::get(&conn(&ctx)?, &ctx.cipher, &key)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("system setting {key}")).into())
}

pub async fn put_setting(
    State(ctx): State<ApiContext>,
    Path(key): Path<String>,
    Json(body): Json<SystemSettingBody>,
) -> Result<Json<SystemSetting>, ApiError> {
    let setting = SystemSetting { key, value: body.value, encrypted: body.encrypted };
    system_setting::upsert(&conn(&ctx)?, &ctx.cipher, &setting)?;
    invalidate(&ctx, Namespace::SystemSettings);
    Ok(Json(setting))
}

// ── Cost log ─────────────────────────────────────────────────────

/// Deliberately thin per the Non-goal on admin statistics dashboards: a raw
/// aggregate, not a reporting surface.
pub async fn cost_summary(State(ctx): State<ApiContext>) -> Result<Json<cost_log::CostSummary>, ApiError> {
    Ok(Json(cost_log::summary(&conn(&ctx)?)?))
}

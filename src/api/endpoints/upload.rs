//! Document intake: `POST /api/upload`.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::error::AppError;
use crate::jobs::lifecycle::{self, UploadedFile};
use crate::models::enums::MimeClass;

#[derive(Serialize)]
pub struct UploadResponse {
    pub processing_id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: &'static str,
}

fn mime_class_for(filename: &str, content_type: Option<&str>) -> Option<MimeClass> {
    let guess = content_type
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(filename).first().map(|m| m.essence_str().to_string()))?;

    if guess == "application/pdf" {
        Some(MimeClass::Pdf)
    } else if guess.starts_with("image/") {
        Some(MimeClass::Image)
    } else {
        None
    }
}

/// `POST /api/upload` — multipart with a `file` field and optional
/// `pipeline_config`, `ocr_config`, `target_language` text fields.
pub async fn upload(State(ctx): State<ApiContext>, mut multipart: Multipart) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename = None;
    let mut content_type = None;
    let mut bytes = None;
    let mut pipeline_config = serde_json::json!({});
    let mut ocr_config = serde_json::json!({});
    let mut target_language = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))? {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::Validation(format!("failed to read uploaded file: {e}")))?
                        .to_vec(),
                );
            }
            "pipeline_config" => {
                let text = field.text().await.unwrap_or_default();
                pipeline_config = serde_json::from_str(&text).unwrap_or(serde_json::json!({}));
            }
            "ocr_config" => {
                let text = field.text().await.unwrap_or_default();
                ocr_config = serde_json::from_str(&text).unwrap_or(serde_json::json!({}));
            }
            "target_language" => {
                let text = field.text().await.unwrap_or_default();
                if !text.is_empty() {
                    target_language = Some(text);
                }
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| AppError::Validation("missing file field".into()))?;
    let bytes = bytes.ok_or_else(|| AppError::Validation("missing file field".into()))?;

    if bytes.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".into()).into());
    }
    if bytes.len() > ctx.max_upload_bytes {
        return Err(AppError::Validation(format!("file exceeds the {} byte limit", ctx.max_upload_bytes)).into());
    }
    let mime_class = mime_class_for(&filename, content_type.as_deref())
        .ok_or_else(|| AppError::Validation("unsupported file type, only PDF and image uploads are accepted".into()))?;

    if !ctx.queue.workers_available() {
        return Err(AppError::NoWorkersReachable.into());
    }

    let conn = ctx.pool.get().map_err(|e| AppError::from(crate::db::DatabaseError::from(e)))?;
    let file_size = bytes.len() as i64;
    let job = lifecycle::create_job(
        &conn,
        &ctx.cipher,
        UploadedFile { filename: filename.clone(), mime_class, bytes, pipeline_config, ocr_config, target_language },
    )?;

    Ok(Json(UploadResponse {
        processing_id: job.processing_id.to_string(),
        filename,
        file_type: mime_class.as_str().to_string(),
        file_size,
        status: "PENDING",
    }))
}

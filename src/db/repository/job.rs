use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::crypto::Cipher;
use crate::db::DatabaseError;
use crate::models::enums::{JobStatus, MimeClass};
use crate::models::Job;

pub struct NewJob {
    pub filename: String,
    pub mime_class: MimeClass,
    pub file_bytes: Vec<u8>,
    pub pipeline_config: serde_json::Value,
    pub ocr_config: serde_json::Value,
    pub target_language: Option<String>,
}

pub fn insert_job(conn: &Connection, cipher: &Cipher, job: NewJob) -> Result<Job, DatabaseError> {
    let processing_id = Uuid::new_v4();
    let now = Utc::now();
    let encrypted_bytes = cipher
        .encrypt_bytes(&job.file_bytes)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO jobs (
            processing_id, filename, mime_class, file_size, file_bytes,
            pipeline_config, ocr_config, target_language, status, progress_percent,
            uploaded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
        params![
            processing_id.to_string(),
            job.filename,
            job.mime_class.as_str(),
            job.file_bytes.len() as i64,
            encrypted_bytes,
            job.pipeline_config.to_string(),
            job.ocr_config.to_string(),
            job.target_language,
            JobStatus::Pending.as_str(),
            now.to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_job(conn, cipher, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Job".into(),
        id: id.to_string(),
    })
}

pub fn get_job(conn: &Connection, cipher: &Cipher, id: i64) -> Result<Option<Job>, DatabaseError> {
    query_one(conn, cipher, "SELECT * FROM jobs WHERE id = ?1", params![id])
}

pub fn get_job_by_processing_id(
    conn: &Connection,
    cipher: &Cipher,
    processing_id: &Uuid,
) -> Result<Option<Job>, DatabaseError> {
    query_one(
        conn,
        cipher,
        "SELECT * FROM jobs WHERE processing_id = ?1",
        params![processing_id.to_string()],
    )
}

fn query_one(
    conn: &Connection,
    cipher: &Cipher,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<Job>, DatabaseError> {
    let result = conn.query_row(sql, params, |row| row_to_job(row, cipher));
    match result {
        Ok(job) => Ok(Some(job)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Transitions a job's status with a CAS guard: the UPDATE only applies if the
/// row's current status matches `expected`, so concurrent workers picking the
/// same job see exactly one winner. Returns whether this call won the race.
pub fn cas_transition(
    conn: &Connection,
    id: i64,
    expected: JobStatus,
    next: JobStatus,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE jobs SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![next.as_str(), id, expected.as_str()],
    )?;
    Ok(updated == 1)
}

pub fn mark_queued(conn: &Connection, id: i64, broker_task_id: &str) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE jobs SET status = ?1, broker_task_id = ?2 WHERE id = ?3 AND status = ?4",
        params![JobStatus::Queued.as_str(), broker_task_id, id, JobStatus::Pending.as_str()],
    )?;
    Ok(updated == 1)
}

pub fn mark_running(conn: &Connection, id: i64, worker_id: &str) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE jobs SET status = ?1, worker_id = ?2, started_at = ?3 WHERE id = ?4 AND status IN (?5, ?6)",
        params![
            JobStatus::Running.as_str(),
            worker_id,
            Utc::now().to_rfc3339(),
            id,
            JobStatus::Pending.as_str(),
            JobStatus::Queued.as_str(),
        ],
    )?;
    Ok(updated == 1)
}

/// Applied at `POST /api/process/{id}` time, before enqueueing, so a caller can
/// supply `target_language` without having set it at upload time.
pub fn set_target_language(conn: &Connection, id: i64, target_language: Option<&str>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET target_language = ?1 WHERE id = ?2",
        params![target_language, id],
    )?;
    Ok(())
}

pub fn update_progress(
    conn: &Connection,
    id: i64,
    progress_percent: i32,
    current_step: Option<&str>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET progress_percent = ?1, current_step = ?2 WHERE id = ?3",
        params![progress_percent, current_step, id],
    )?;
    Ok(())
}

pub struct JobCompletion {
    pub original_text: Option<String>,
    pub translated_text: Option<String>,
    pub language_translated_text: Option<String>,
    pub document_type_detected: Option<String>,
    pub confidence_score: Option<f64>,
    pub branching_path: Option<String>,
}

pub fn mark_completed(
    conn: &Connection,
    cipher: &Cipher,
    id: i64,
    completion: JobCompletion,
) -> Result<(), DatabaseError> {
    let map_err = |e: crate::crypto::CryptoError| DatabaseError::ConstraintViolation(e.to_string());
    let original = cipher
        .encrypt_text_opt(completion.original_text.as_deref())
        .map_err(map_err)?;
    let translated = cipher
        .encrypt_text_opt(completion.translated_text.as_deref())
        .map_err(map_err)?;
    let language_translated = cipher
        .encrypt_text_opt(completion.language_translated_text.as_deref())
        .map_err(map_err)?;

    conn.execute(
        "UPDATE jobs SET status = ?1, progress_percent = 100, completed_at = ?2,
            original_text = ?3, translated_text = ?4, language_translated_text = ?5,
            document_type_detected = ?6, confidence_score = ?7, branching_path = ?8
         WHERE id = ?9",
        params![
            JobStatus::Completed.as_str(),
            Utc::now().to_rfc3339(),
            original,
            translated,
            language_translated,
            completion.document_type_detected,
            completion.confidence_score,
            completion.branching_path,
            id,
        ],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: i64, error_step: &str, error_message: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status = ?1, failed_at = ?2, error_step = ?3, error_message = ?4 WHERE id = ?5",
        params![JobStatus::Failed.as_str(), Utc::now().to_rfc3339(), error_step, error_message, id],
    )?;
    Ok(())
}

pub fn mark_cancelled(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status = ?1, failed_at = ?2 WHERE id = ?3",
        params![JobStatus::Cancelled.as_str(), Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

pub fn mark_timeout(conn: &Connection, id: i64, active_step: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status = ?1, failed_at = ?2, error_step = ?3 WHERE id = ?4",
        params![JobStatus::Timeout.as_str(), Utc::now().to_rfc3339(), active_step, id],
    )?;
    Ok(())
}

pub struct Termination<'a> {
    pub reason: &'a str,
    pub message: &'a str,
    pub step: &'a str,
    pub matched_value: &'a str,
}

pub fn mark_terminated(conn: &Connection, id: i64, t: Termination<'_>) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status = ?1, completed_at = ?2, termination_reason = ?3,
            termination_message = ?4, termination_step = ?5, matched_value = ?6
         WHERE id = ?7",
        params![
            JobStatus::Terminated.as_str(),
            Utc::now().to_rfc3339(),
            t.reason,
            t.message,
            t.step,
            t.matched_value,
            id,
        ],
    )?;
    Ok(())
}

/// Nulls all content fields and sets `content_cleared_at`. Idempotent: calling
/// it again after content is already cleared is a no-op success.
pub fn clear_content(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET file_bytes = x'', original_text = NULL, translated_text = NULL,
            language_translated_text = NULL, content_cleared_at = COALESCE(content_cleared_at, ?1)
         WHERE id = ?2",
        params![Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

/// One row of the anonymized `GET /api/process/active` overview: no filename,
/// file bytes, or extracted text, just enough to show the caller their jobs
/// are progressing.
pub struct ActiveJobOverview {
    pub processing_id: Uuid,
    pub status: JobStatus,
    pub progress_percent: i32,
    pub current_step: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

pub fn list_active(conn: &Connection) -> Result<Vec<ActiveJobOverview>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT processing_id, status, progress_percent, current_step, uploaded_at FROM jobs
         WHERE status IN (?1, ?2, ?3) ORDER BY uploaded_at DESC",
    )?;
    let rows = stmt
        .query_map(
            params![JobStatus::Pending.as_str(), JobStatus::Queued.as_str(), JobStatus::Running.as_str()],
            |row| {
                let processing_id_str: String = row.get("processing_id")?;
                let status_str: String = row.get("status")?;
                let uploaded_at_str: String = row.get("uploaded_at")?;
                Ok((processing_id_str, status_str, row.get::<_, i32>("progress_percent")?, row.get::<_, Option<String>>("current_step")?, uploaded_at_str))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let decrypt_err = || DatabaseError::InvalidEnum { field: "jobs".into(), value: "malformed row".into() };
    rows.into_iter()
        .map(|(pid, status, progress_percent, current_step, uploaded_at)| {
            Ok(ActiveJobOverview {
                processing_id: pid.parse().map_err(|_| decrypt_err())?,
                status: status.parse().map_err(|_| decrypt_err())?,
                progress_percent,
                current_step,
                uploaded_at: uploaded_at.parse().map_err(|_| decrypt_err())?,
            })
        })
        .collect()
}

/// Jobs in a terminal-eligible-for-cleanup state older than the cutoff with no
/// feedback row, for the periodic safety-net cleanup job.
pub fn find_stale_uncleaned(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT j.id FROM jobs j
         LEFT JOIN feedback f ON f.processing_id = j.processing_id
         WHERE j.content_cleared_at IS NULL
           AND j.uploaded_at < ?1
           AND f.id IS NULL
           AND j.status IN ('COMPLETED', 'FAILED', 'TERMINATED', 'CANCELLED', 'TIMEOUT')",
    )?;
    let ids = stmt
        .query_map(params![cutoff.to_rfc3339()], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn row_to_job(row: &Row, cipher: &Cipher) -> rusqlite::Result<Job> {
    let decrypt_err = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Blob, "decrypt failed".into());

    let processing_id_str: String = row.get("processing_id")?;
    let mime_class_str: String = row.get("mime_class")?;
    let status_str: String = row.get("status")?;
    let pipeline_config_str: String = row.get("pipeline_config")?;
    let ocr_config_str: String = row.get("ocr_config")?;
    let uploaded_at_str: String = row.get("uploaded_at")?;
    let started_at_str: Option<String> = row.get("started_at")?;
    let completed_at_str: Option<String> = row.get("completed_at")?;
    let failed_at_str: Option<String> = row.get("failed_at")?;
    let content_cleared_at_str: Option<String> = row.get("content_cleared_at")?;
    let file_bytes_encrypted: Vec<u8> = row.get("file_bytes")?;
    let original_text_encrypted: Option<Vec<u8>> = row.get("original_text")?;
    let translated_text_encrypted: Option<Vec<u8>> = row.get("translated_text")?;
    let language_translated_encrypted: Option<Vec<u8>> = row.get("language_translated_text")?;

    let file_bytes = if file_bytes_encrypted.is_empty() {
        Vec::new()
    } else {
        cipher.decrypt_bytes(&file_bytes_encrypted).map_err(|_| decrypt_err())?
    };

    Ok(Job {
        id: row.get("id")?,
        processing_id: processing_id_str.parse().map_err(|_| decrypt_err())?,
        filename: row.get("filename")?,
        mime_class: mime_class_str.parse().map_err(|_| decrypt_err())?,
        file_size: row.get("file_size")?,
        file_bytes,
        pipeline_config: serde_json::from_str(&pipeline_config_str).unwrap_or(serde_json::Value::Null),
        ocr_config: serde_json::from_str(&ocr_config_str).unwrap_or(serde_json::Value::Null),
        target_language: row.get("target_language")?,
        status: status_str.parse().map_err(|_| decrypt_err())?,
        progress_percent: row.get("progress_percent")?,
        current_step: row.get("current_step")?,
        uploaded_at: uploaded_at_str.parse().map_err(|_| decrypt_err())?,
        started_at: started_at_str.map(|s| s.parse()).transpose().map_err(|_| decrypt_err())?,
        completed_at: completed_at_str.map(|s| s.parse()).transpose().map_err(|_| decrypt_err())?,
        failed_at: failed_at_str.map(|s| s.parse()).transpose().map_err(|_| decrypt_err())?,
        original_text: original_text_encrypted
            .map(|b| cipher.decrypt_text(&b))
            .transpose()
            .map_err(|_| decrypt_err())?,
        translated_text: translated_text_encrypted
            .map(|b| cipher.decrypt_text(&b))
            .transpose()
            .map_err(|_| decrypt_err())?,
        language_translated_text: language_translated_encrypted
            .map(|b| cipher.decrypt_text(&b))
            .transpose()
            .map_err(|_| decrypt_err())?,
        document_type_detected: row.get("document_type_detected")?,
        confidence_score: row.get("confidence_score")?,
        branching_path: row.get("branching_path")?,
        termination_reason: row.get("termination_reason")?,
        termination_message: row.get("termination_message")?,
        termination_step: row.get("termination_step")?,
        matched_value: row.get("matched_value")?,
        error_step: row.get("error_step")?,
        error_message: row.get("error_message")?,
        worker_id: row.get("worker_id")?,
        broker_task_id: row.get("broker_task_id")?,
        content_cleared_at: content_cleared_at_str.map(|s| s.parse()).transpose().map_err(|_| decrypt_err())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, Cipher) {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        (conn, Cipher::disabled())
    }

    fn sample_new_job() -> NewJob {
        NewJob {
            filename: "arztbrief.pdf".into(),
            mime_class: MimeClass::Pdf,
            file_bytes: b"%PDF-1.4 fake".to_vec(),
            pipeline_config: serde_json::json!({"steps": []}),
            ocr_config: serde_json::json!({"engine": "HYBRID"}),
            target_language: Some("en".into()),
        }
    }

    #[test]
    fn insert_and_get_job_round_trips() {
        let (conn, cipher) = setup();
        let job = insert_job(&conn, &cipher, sample_new_job()).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.file_bytes, b"%PDF-1.4 fake".to_vec());

        let fetched = get_job_by_processing_id(&conn, &cipher, &job.processing_id).unwrap().unwrap();
        assert_eq!(fetched.id, job.id);
    }

    #[test]
    fn cas_transition_only_succeeds_from_expected_state() {
        let (conn, cipher) = setup();
        let job = insert_job(&conn, &cipher, sample_new_job()).unwrap();

        assert!(mark_queued(&conn, job.id, "task-1").unwrap());
        // Second enqueue attempt finds a non-PENDING state and loses the race.
        assert!(!mark_queued(&conn, job.id, "task-2").unwrap());
    }

    #[test]
    fn clear_content_is_idempotent() {
        let (conn, cipher) = setup();
        let job = insert_job(&conn, &cipher, sample_new_job()).unwrap();
        clear_content(&conn, job.id).unwrap();
        let first = get_job(&conn, &cipher, job.id).unwrap().unwrap();
        assert!(first.content_cleared_at.is_some());
        assert!(first.file_bytes.is_empty());

        clear_content(&conn, job.id).unwrap();
        let second = get_job(&conn, &cipher, job.id).unwrap().unwrap();
        assert_eq!(first.content_cleared_at, second.content_cleared_at);
    }

    #[test]
    fn list_active_excludes_terminal_jobs_and_hides_content() {
        let (conn, cipher) = setup();
        let running = insert_job(&conn, &cipher, sample_new_job()).unwrap();
        mark_queued(&conn, running.id, "task-1").unwrap();

        let done = insert_job(&conn, &cipher, sample_new_job()).unwrap();
        mark_completed(
            &conn,
            &cipher,
            done.id,
            JobCompletion {
                original_text: None,
                translated_text: None,
                language_translated_text: None,
                document_type_detected: None,
                confidence_score: None,
                branching_path: None,
            },
        )
        .unwrap();

        let active = list_active(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].processing_id, running.processing_id);
        assert_eq!(active[0].status, JobStatus::Queued);
    }

    #[test]
    fn encrypted_round_trip_with_real_cipher() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        let cipher = Cipher::enabled([4u8; crate::crypto::encryption::KEY_LENGTH]);

        let job = insert_job(&conn, &cipher, sample_new_job()).unwrap();
        mark_completed(
            &conn,
            &cipher,
            job.id,
            JobCompletion {
                original_text: Some("Patient: [NAME]".into()),
                translated_text: Some("Dear patient, ...".into()),
                language_translated_text: None,
                document_type_detected: Some("ARZTBRIEF".into()),
                confidence_score: Some(0.92),
                branching_path: Some("ARZTBRIEF".into()),
            },
        )
        .unwrap();

        let fetched = get_job(&conn, &cipher, job.id).unwrap().unwrap();
        assert_eq!(fetched.translated_text.as_deref(), Some("Dear patient, ..."));
        assert_eq!(fetched.status, JobStatus::Completed);

        // Raw column must not contain the plaintext.
        let raw: Vec<u8> = conn
            .query_row("SELECT translated_text FROM jobs WHERE id = ?1", params![job.id], |r| r.get(0))
            .unwrap();
        assert!(!raw.windows(b"Dear patient".len()).any(|w| w == b"Dear patient"));
    }
}

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::crypto::Cipher;
use crate::db::DatabaseError;
use crate::models::enums::StepStatus;
use crate::models::{NewStepExecution, StepExecution};

pub fn insert_step_execution(
    conn: &Connection,
    cipher: &Cipher,
    exec: NewStepExecution,
) -> Result<StepExecution, DatabaseError> {
    let map_err = |e: crate::crypto::CryptoError| DatabaseError::ConstraintViolation(e.to_string());
    let input = cipher.encrypt_text_opt(exec.input_text.as_deref()).map_err(map_err)?;
    let output = cipher.encrypt_text_opt(exec.output_text.as_deref()).map_err(map_err)?;
    let now = Utc::now();

    conn.execute(
        "INSERT INTO step_executions (
            job_id, step_id, step_name, step_order, status, input_text, output_text,
            model_used, prompt_used, confidence, input_tokens, output_tokens,
            execution_time_ms, retry_count, metadata, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
        params![
            exec.job_id,
            exec.step_id,
            exec.step_name,
            exec.step_order,
            exec.status.as_str(),
            input,
            output,
            exec.model_used,
            exec.prompt_used,
            exec.confidence,
            exec.input_tokens,
            exec.output_tokens,
            exec.execution_time_ms,
            exec.retry_count,
            exec.metadata.to_string(),
            now.to_rfc3339(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_step_execution(conn, cipher, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "StepExecution".into(),
        id: id.to_string(),
    })
}

pub fn get_step_execution(conn: &Connection, cipher: &Cipher, id: i64) -> Result<Option<StepExecution>, DatabaseError> {
    let result = conn.query_row("SELECT * FROM step_executions WHERE id = ?1", params![id], |row| {
        row_to_step_execution(row, cipher)
    });
    match result {
        Ok(e) => Ok(Some(e)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All executions for a job, ordered by `step_order` then `created_at`, matching
/// the ordering guarantee that StepExecution rows are totally ordered within a Job.
pub fn list_for_job(conn: &Connection, cipher: &Cipher, job_id: i64) -> Result<Vec<StepExecution>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM step_executions WHERE job_id = ?1 ORDER BY step_order, created_at")?;
    let rows = stmt
        .query_map(params![job_id], |row| row_to_step_execution(row, cipher))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_step_execution(row: &Row, cipher: &Cipher) -> rusqlite::Result<StepExecution> {
    let decrypt_err = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Blob, "decrypt failed".into());
    let status_str: String = row.get("status")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at_str: String = row.get("created_at")?;
    let input_encrypted: Option<Vec<u8>> = row.get("input_text")?;
    let output_encrypted: Option<Vec<u8>> = row.get("output_text")?;

    Ok(StepExecution {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        step_id: row.get("step_id")?,
        step_name: row.get("step_name")?,
        step_order: row.get("step_order")?,
        status: status_str.parse::<StepStatus>().map_err(|_| decrypt_err())?,
        input_text: input_encrypted.map(|b| cipher.decrypt_text(&b)).transpose().map_err(|_| decrypt_err())?,
        output_text: output_encrypted.map(|b| cipher.decrypt_text(&b)).transpose().map_err(|_| decrypt_err())?,
        model_used: row.get("model_used")?,
        prompt_used: row.get("prompt_used")?,
        confidence: row.get("confidence")?,
        input_tokens: row.get("input_tokens")?,
        output_tokens: row.get("output_tokens")?,
        execution_time_ms: row.get("execution_time_ms")?,
        retry_count: row.get("retry_count")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        created_at: created_at_str.parse().map_err(|_| decrypt_err())?,
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

    #[test]
    fn executions_for_a_job_are_ordered_by_step_order() {
        let (conn, cipher) = setup();
        conn.execute(
            "INSERT INTO available_models (provider, name) VALUES ('local', 'mock')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO jobs (processing_id, filename, mime_class, file_size, file_bytes, pipeline_config, ocr_config, status, uploaded_at) VALUES ('p1','f','pdf',1,x'00','{}','{}','PENDING',datetime('now'))", []).unwrap();
        let job_id = conn.last_insert_rowid();

        for (order, name) in [(2, "second"), (1, "first")] {
            insert_step_execution(
                &conn,
                &cipher,
                NewStepExecution {
                    job_id,
                    step_id: 1,
                    step_name: name.into(),
                    step_order: order,
                    status: StepStatus::Completed,
                    input_text: Some("in".into()),
                    output_text: Some("out".into()),
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
        }

        let executions = list_for_job(&conn, &cipher, job_id).unwrap();
        assert_eq!(executions[0].step_name, "first");
        assert_eq!(executions[1].step_name, "second");
    }
}

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Feedback, NewFeedback};

/// Inserts the feedback row and, when consent is false, clears the job's content
/// fields in the same transaction, per the consent/content-clearing invariant.
pub fn insert_with_consent_clearing(conn: &mut Connection, new: &NewFeedback) -> Result<Feedback, DatabaseError> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO feedback (processing_id, overall_rating, detailed_ratings, comment, data_consent_given, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.processing_id.to_string(),
            new.overall_rating,
            new.detailed_ratings.as_ref().map(|v| v.to_string()),
            new.comment,
            new.data_consent_given,
            Utc::now().to_rfc3339(),
        ],
    )?;
    let id = tx.last_insert_rowid();

    if !new.data_consent_given {
        if let Some(job_id) = job_id_for_processing_id(&tx, &new.processing_id)? {
            super::job::clear_content(&tx, job_id)?;
        }
    }

    let feedback = get(&tx, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Feedback".into(),
        id: id.to_string(),
    })?;
    tx.commit()?;
    Ok(feedback)
}

fn job_id_for_processing_id(conn: &Connection, processing_id: &Uuid) -> Result<Option<i64>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id FROM jobs WHERE processing_id = ?1",
        params![processing_id.to_string()],
        |row| row.get(0),
    );
    match result {
        Ok(id) => Ok(Some(id)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Feedback>, DatabaseError> {
    let result = conn.query_row("SELECT * FROM feedback WHERE id = ?1", params![id], row_to_feedback);
    match result {
        Ok(f) => Ok(Some(f)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn exists_for_processing_id(conn: &Connection, processing_id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM feedback WHERE processing_id = ?1",
        params![processing_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_feedback(row: &Row) -> rusqlite::Result<Feedback> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "malformed".into());
    let processing_id_str: String = row.get("processing_id")?;
    let created_at_str: String = row.get("created_at")?;
    let detailed_str: Option<String> = row.get("detailed_ratings")?;
    Ok(Feedback {
        id: row.get("id")?,
        processing_id: processing_id_str.parse().map_err(|_| bad())?,
        overall_rating: row.get("overall_rating")?,
        detailed_ratings: detailed_str.map(|s| serde_json::from_str(&s)).transpose().map_err(|_| bad())?,
        comment: row.get("comment")?,
        data_consent_given: row.get("data_consent_given")?,
        created_at: created_at_str.parse().map_err(|_| bad())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Cipher;
    use crate::db::repository::job::{insert_job, NewJob};
    use crate::models::enums::MimeClass;

    fn setup_job(conn: &Connection) -> Uuid {
        let cipher = Cipher::disabled();
        let job = insert_job(
            conn,
            &cipher,
            NewJob {
                filename: "menu.jpg".into(),
                mime_class: MimeClass::Image,
                file_bytes: b"fake-image-bytes".to_vec(),
                pipeline_config: serde_json::json!({}),
                ocr_config: serde_json::json!({}),
                target_language: None,
            },
        )
        .unwrap();
        job.processing_id
    }

    #[test]
    fn no_consent_clears_job_content_in_same_transaction() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        let processing_id = setup_job(&conn);

        insert_with_consent_clearing(
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

        let cipher = Cipher::disabled();
        let job = super::super::job::get_job_by_processing_id(&conn, &cipher, &processing_id)
            .unwrap()
            .unwrap();
        assert!(job.file_bytes.is_empty());
        assert!(job.content_cleared_at.is_some());
        assert!(exists_for_processing_id(&conn, &processing_id).unwrap());
    }

    #[test]
    fn consent_given_leaves_content_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        let processing_id = setup_job(&conn);

        insert_with_consent_clearing(
            &mut conn,
            &NewFeedback {
                processing_id,
                overall_rating: 5,
                detailed_ratings: None,
                comment: Some("great".into()),
                data_consent_given: true,
            },
        )
        .unwrap();

        let cipher = Cipher::disabled();
        let job = super::super::job::get_job_by_processing_id(&conn, &cipher, &processing_id)
            .unwrap()
            .unwrap();
        assert!(!job.file_bytes.is_empty());
        assert!(job.content_cleared_at.is_none());
    }
}

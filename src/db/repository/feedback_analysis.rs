use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::enums::FeedbackAnalysisStatus;
use crate::models::FeedbackAnalysis;

pub fn upsert(conn: &Connection, analysis: &FeedbackAnalysis) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO feedback_analysis (
            feedback_id, status, pii_leaks, translation_issues, recommendations,
            overall_score, error_message, created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?8)
         ON CONFLICT(feedback_id) DO UPDATE SET
            status = excluded.status, pii_leaks = excluded.pii_leaks,
            translation_issues = excluded.translation_issues, recommendations = excluded.recommendations,
            overall_score = excluded.overall_score, error_message = excluded.error_message,
            updated_at = excluded.updated_at",
        params![
            analysis.feedback_id,
            analysis.status.as_str(),
            serde_json::to_string(&analysis.pii_leaks).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&analysis.translation_issues).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&analysis.recommendations).unwrap_or_else(|_| "[]".into()),
            analysis.overall_score,
            analysis.error_message,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, feedback_id: i64) -> Result<Option<FeedbackAnalysis>, DatabaseError> {
    let result = conn.query_row(
        "SELECT * FROM feedback_analysis WHERE feedback_id = ?1",
        params![feedback_id],
        row_to_analysis,
    );
    match result {
        Ok(a) => Ok(Some(a)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn row_to_analysis(row: &Row) -> rusqlite::Result<FeedbackAnalysis> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "malformed".into());
    let status_str: String = row.get("status")?;
    let pii_leaks_str: String = row.get("pii_leaks")?;
    let translation_issues_str: String = row.get("translation_issues")?;
    let recommendations_str: String = row.get("recommendations")?;
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;

    Ok(FeedbackAnalysis {
        feedback_id: row.get("feedback_id")?,
        status: status_str.parse::<FeedbackAnalysisStatus>().map_err(|_| bad())?,
        pii_leaks: serde_json::from_str(&pii_leaks_str).map_err(|_| bad())?,
        translation_issues: serde_json::from_str(&translation_issues_str).map_err(|_| bad())?,
        recommendations: serde_json::from_str(&recommendations_str).map_err(|_| bad())?,
        overall_score: row.get("overall_score")?,
        error_message: row.get("error_message")?,
        created_at: created_at_str.parse().map_err(|_| bad())?,
        updated_at: updated_at_str.parse().map_err(|_| bad())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        conn
    }

    fn sample(feedback_id: i64, status: FeedbackAnalysisStatus) -> FeedbackAnalysis {
        FeedbackAnalysis {
            feedback_id,
            status,
            pii_leaks: vec![],
            translation_issues: vec![],
            recommendations: vec![],
            overall_score: Some(8.0),
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let conn = setup();
        upsert(&conn, &sample(1, FeedbackAnalysisStatus::Completed)).unwrap();
        let fetched = get(&conn, 1).unwrap().unwrap();
        assert_eq!(fetched.status, FeedbackAnalysisStatus::Completed);
        assert_eq!(fetched.overall_score, Some(8.0));
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let conn = setup();
        upsert(&conn, &sample(1, FeedbackAnalysisStatus::Processing)).unwrap();
        upsert(&conn, &sample(1, FeedbackAnalysisStatus::Skipped)).unwrap();
        let fetched = get(&conn, 1).unwrap().unwrap();
        assert_eq!(fetched.status, FeedbackAnalysisStatus::Skipped);
    }

    #[test]
    fn missing_row_is_none() {
        let conn = setup();
        assert!(get(&conn, 99).unwrap().is_none());
    }
}

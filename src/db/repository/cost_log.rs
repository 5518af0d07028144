use chrono::Utc;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::AiCostLogEntry;

pub fn insert(
    conn: &Connection,
    processing_id: &Uuid,
    step_name: &str,
    model_name: &str,
    input_tokens: i32,
    output_tokens: i32,
    estimated_cost: f64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO ai_cost_log (processing_id, step_name, model_name, input_tokens, output_tokens, estimated_cost, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
        params![
            processing_id.to_string(),
            step_name,
            model_name,
            input_tokens,
            output_tokens,
            estimated_cost,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CostSummary {
    pub total_calls: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_estimated_cost: f64,
}

/// Aggregate read for the thin admin costs endpoint — intentionally not a dashboard.
pub fn summary(conn: &Connection) -> Result<CostSummary, DatabaseError> {
    conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(input_tokens),0), COALESCE(SUM(output_tokens),0), COALESCE(SUM(estimated_cost),0)
         FROM ai_cost_log",
        [],
        |row| {
            Ok(CostSummary {
                total_calls: row.get(0)?,
                total_input_tokens: row.get(1)?,
                total_output_tokens: row.get(2)?,
                total_estimated_cost: row.get(3)?,
            })
        },
    )
    .map_err(Into::into)
}

pub fn list_for_processing_id(conn: &Connection, processing_id: &Uuid) -> Result<Vec<AiCostLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM ai_cost_log WHERE processing_id = ?1 ORDER BY created_at")?;
    let rows = stmt
        .query_map(params![processing_id.to_string()], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_entry(row: &Row) -> rusqlite::Result<AiCostLogEntry> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "malformed".into());
    let processing_id_str: String = row.get("processing_id")?;
    let created_at_str: String = row.get("created_at")?;
    Ok(AiCostLogEntry {
        id: row.get("id")?,
        processing_id: processing_id_str.parse().map_err(|_| bad())?,
        step_name: row.get("step_name")?,
        model_name: row.get("model_name")?,
        input_tokens: row.get("input_tokens")?,
        output_tokens: row.get("output_tokens")?,
        estimated_cost: row.get("estimated_cost")?,
        created_at: created_at_str.parse().map_err(|_| bad())?,
    })
}

use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::AvailableModel;

pub fn get(conn: &Connection, id: i64) -> Result<Option<AvailableModel>, DatabaseError> {
    let result = conn.query_row("SELECT * FROM available_models WHERE id = ?1", params![id], row_to_model);
    match result {
        Ok(model) => Ok(Some(model)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_enabled(conn: &Connection) -> Result<Vec<AvailableModel>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM available_models WHERE enabled = 1 ORDER BY id")?;
    let rows = stmt.query_map([], row_to_model)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_all(conn: &Connection) -> Result<Vec<AvailableModel>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM available_models ORDER BY id")?;
    let rows = stmt.query_map([], row_to_model)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct NewAvailableModel {
    pub provider: String,
    pub name: String,
    pub supports_vision: bool,
    pub cost_per_1k_input_tokens: f64,
    pub cost_per_1k_output_tokens: f64,
    pub enabled: bool,
}

pub fn insert(conn: &Connection, new: &NewAvailableModel) -> Result<AvailableModel, DatabaseError> {
    conn.execute(
        "INSERT INTO available_models (provider, name, supports_vision, cost_per_1k_input_tokens, cost_per_1k_output_tokens, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![new.provider, new.name, new.supports_vision, new.cost_per_1k_input_tokens, new.cost_per_1k_output_tokens, new.enabled],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "AvailableModel".into(), id: id.to_string() })
}

pub fn update(conn: &Connection, id: i64, new: &NewAvailableModel) -> Result<AvailableModel, DatabaseError> {
    conn.execute(
        "UPDATE available_models SET provider = ?1, name = ?2, supports_vision = ?3,
         cost_per_1k_input_tokens = ?4, cost_per_1k_output_tokens = ?5, enabled = ?6 WHERE id = ?7",
        params![new.provider, new.name, new.supports_vision, new.cost_per_1k_input_tokens, new.cost_per_1k_output_tokens, new.enabled, id],
    )?;
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "AvailableModel".into(), id: id.to_string() })
}

/// Fails if any dynamic step still references the model, since `dynamic_steps.model_id`
/// has no `ON DELETE` cascade/set-null and would otherwise leave a dangling reference.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let in_use: i64 = conn.query_row("SELECT COUNT(*) FROM dynamic_steps WHERE model_id = ?1", params![id], |r| r.get(0))?;
    if in_use > 0 {
        return Err(DatabaseError::ConstraintViolation("model is referenced by one or more dynamic steps".into()));
    }
    let changed = conn.execute("DELETE FROM available_models WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

fn row_to_model(row: &Row) -> rusqlite::Result<AvailableModel> {
    Ok(AvailableModel {
        id: row.get("id")?,
        provider: row.get("provider")?,
        name: row.get("name")?,
        supports_vision: row.get("supports_vision")?,
        cost_per_1k_input_tokens: row.get("cost_per_1k_input_tokens")?,
        cost_per_1k_output_tokens: row.get("cost_per_1k_output_tokens")?,
        enabled: row.get("enabled")?,
    })
}

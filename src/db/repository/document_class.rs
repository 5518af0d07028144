use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::DocumentClass;

pub fn list_enabled(conn: &Connection) -> Result<Vec<DocumentClass>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM document_classes WHERE enabled = 1 ORDER BY id")?;
    let rows = stmt.query_map([], row_to_class)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_by_key(conn: &Connection, class_key: &str) -> Result<Option<DocumentClass>, DatabaseError> {
    let result = conn.query_row(
        "SELECT * FROM document_classes WHERE class_key = ?1",
        params![class_key],
        row_to_class,
    );
    match result {
        Ok(class) => Ok(Some(class)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_all(conn: &Connection) -> Result<Vec<DocumentClass>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM document_classes ORDER BY id")?;
    let rows = stmt.query_map([], row_to_class)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<DocumentClass>, DatabaseError> {
    let result = conn.query_row("SELECT * FROM document_classes WHERE id = ?1", params![id], row_to_class);
    match result {
        Ok(class) => Ok(Some(class)),
        Err(e) if DatabaseError::is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct NewDocumentClass {
    pub class_key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub strong_indicators: Vec<String>,
    pub weak_indicators: Vec<String>,
    pub enabled: bool,
}

pub fn insert(conn: &Connection, new: &NewDocumentClass) -> Result<DocumentClass, DatabaseError> {
    conn.execute(
        "INSERT INTO document_classes (class_key, display_name, description, strong_indicators, weak_indicators, is_system_class, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            new.class_key,
            new.display_name,
            new.description,
            serde_json::to_string(&new.strong_indicators).unwrap(),
            serde_json::to_string(&new.weak_indicators).unwrap(),
            new.enabled,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "DocumentClass".into(), id: id.to_string() })
}

pub fn update(conn: &Connection, id: i64, new: &NewDocumentClass) -> Result<DocumentClass, DatabaseError> {
    conn.execute(
        "UPDATE document_classes SET class_key = ?1, display_name = ?2, description = ?3,
         strong_indicators = ?4, weak_indicators = ?5, enabled = ?6 WHERE id = ?7",
        params![
            new.class_key,
            new.display_name,
            new.description,
            serde_json::to_string(&new.strong_indicators).unwrap(),
            serde_json::to_string(&new.weak_indicators).unwrap(),
            new.enabled,
            id,
        ],
    )?;
    get(conn, id)?.ok_or_else(|| DatabaseError::NotFound { entity_type: "DocumentClass".into(), id: id.to_string() })
}

/// System classes (seeded, `is_system_class = 1`) cannot be deleted.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let is_system: Option<bool> =
        conn.query_row("SELECT is_system_class FROM document_classes WHERE id = ?1", params![id], |r| r.get(0)).ok();
    match is_system {
        None => Ok(false),
        Some(true) => Err(DatabaseError::ConstraintViolation("system document classes cannot be deleted".into())),
        Some(false) => {
            conn.execute("DELETE FROM document_classes WHERE id = ?1", params![id])?;
            Ok(true)
        }
    }
}

fn row_to_class(row: &Row) -> rusqlite::Result<DocumentClass> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "malformed json".into());
    let strong_str: String = row.get("strong_indicators")?;
    let weak_str: String = row.get("weak_indicators")?;
    Ok(DocumentClass {
        id: row.get("id")?,
        class_key: row.get("class_key")?,
        display_name: row.get("display_name")?,
        description: row.get("description")?,
        strong_indicators: serde_json::from_str(&strong_str).map_err(|_| bad())?,
        weak_indicators: serde_json::from_str(&weak_str).map_err(|_| bad())?,
        is_system_class: row.get("is_system_class")?,
        enabled: row.get("enabled")?,
    })
}

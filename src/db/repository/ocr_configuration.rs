use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::OcrConfiguration;

pub fn get_active(conn: &Connection) -> Result<OcrConfiguration, DatabaseError> {
    conn.query_row("SELECT * FROM ocr_configurations WHERE id = 1", [], row_to_config)
        .map_err(Into::into)
}

pub fn set_engine(conn: &Connection, engine: crate::models::enums::OcrEngine) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE ocr_configurations SET engine = ?1 WHERE id = 1",
        params![engine.as_str()],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, config: &OcrConfiguration) -> Result<OcrConfiguration, DatabaseError> {
    conn.execute(
        "UPDATE ocr_configurations SET engine = ?1, engine_config = ?2, pii_removal_enabled = ?3, vision_llm_fallback_enabled = ?4 WHERE id = 1",
        params![
            config.engine.as_str(),
            config.engine_config.to_string(),
            config.pii_removal_enabled,
            config.vision_llm_fallback_enabled,
        ],
    )?;
    get_active(conn)
}

fn row_to_config(row: &Row) -> rusqlite::Result<OcrConfiguration> {
    let bad = || rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, "invalid enum".into());
    let engine_str: String = row.get("engine")?;
    let engine_config_str: String = row.get("engine_config")?;
    Ok(OcrConfiguration {
        id: row.get("id")?,
        engine: engine_str.parse().map_err(|_| bad())?,
        engine_config: serde_json::from_str(&engine_config_str).unwrap_or(serde_json::Value::Null),
        pii_removal_enabled: row.get("pii_removal_enabled")?,
        vision_llm_fallback_enabled: row.get("vision_llm_fallback_enabled")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_active_configuration_is_hybrid() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        let config = get_active(&conn).unwrap();
        assert_eq!(config.engine, crate::models::enums::OcrEngine::Hybrid);
        assert!(config.vision_llm_fallback_enabled);
    }
}

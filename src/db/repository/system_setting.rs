use rusqlite::{params, Connection};

use crate::crypto::Cipher;
use crate::db::DatabaseError;
use crate::models::SystemSetting;

pub fn get(conn: &Connection, cipher: &Cipher, key: &str) -> Result<Option<SystemSetting>, DatabaseError> {
    let result = conn.query_row(
        "SELECT key, value, encrypted FROM system_settings WHERE key = ?1",
        params![key],
        |row| {
            let value_bytes: Vec<u8> = row.get("value")?;
            let encrypted: bool = row.get("encrypted")?;
            Ok((row.get::<_, String>("key")?, value_bytes, encrypted))
        },
    );

    let (key, value_bytes, encrypted) = match result {
        Ok(r) => r,
        Err(e) if DatabaseError::is_not_found(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let value = if encrypted {
        cipher
            .decrypt_text(&value_bytes)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?
    } else {
        String::from_utf8(value_bytes).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?
    };

    Ok(Some(SystemSetting { key, value, encrypted }))
}

pub fn upsert(conn: &Connection, cipher: &Cipher, setting: &SystemSetting) -> Result<(), DatabaseError> {
    let value_bytes = if setting.encrypted {
        cipher
            .encrypt_text(&setting.value)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?
    } else {
        setting.value.clone().into_bytes()
    };

    conn.execute(
        "INSERT INTO system_settings (key, value, encrypted) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, encrypted = excluded.encrypted",
        params![setting.key, value_bytes, setting.encrypted],
    )?;
    Ok(())
}

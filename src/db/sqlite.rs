use super::DatabaseError;

const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_initial.sql")),
    (2, include_str!("../../migrations/002_feedback_analysis.sql")),
];

/// Applies every migration whose version is greater than the database's
/// current `schema_version`, in ascending order, inside one transaction each.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")?;
    let current = current_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version > current {
            let tx = conn.transaction()?;
            tx.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version: *version,
                reason: e.to_string(),
            })?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [*version])
                .map_err(|e| DatabaseError::MigrationFailed {
                    version: *version,
                    reason: e.to_string(),
                })?;
            tx.commit()?;
        }
    }
    Ok(())
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, DatabaseError> {
    let version: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))?;
    Ok(version.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> rusqlite::Connection {
        rusqlite::Connection::open_in_memory().unwrap()
    }

    #[test]
    fn migrations_bring_schema_to_latest_version() {
        let mut conn = memory_conn();
        run_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = memory_conn();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn expected_tables_exist_after_migration() {
        let mut conn = memory_conn();
        run_migrations(&mut conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 10);
    }
}

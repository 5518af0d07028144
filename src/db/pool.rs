use r2d2_sqlite::SqliteConnectionManager;

use super::DatabaseError;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Opens (and migrates) a pooled connection to the database at `path`, or an
/// in-memory database when `path` is `":memory:"`.
pub fn open_pool(path: &str) -> Result<DbPool, DatabaseError> {
    let manager = if path == ":memory:" {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(path)
    }
    .with_init(configure_pragmas);

    let pool = r2d2::Pool::builder()
        .max_size(if path == ":memory:" { 1 } else { 8 })
        .build(manager)?;

    {
        let mut conn = pool.get()?;
        super::sqlite::run_migrations(&mut conn)?;
    }

    Ok(pool)
}

fn configure_pragmas(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

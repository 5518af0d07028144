pub mod pool;
pub mod repository;
pub mod sqlite;

pub use pool::{DbPool, PooledConn};
pub use sqlite::run_migrations;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("migration {version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// `rusqlite` surfaces "row not found" via `QueryReturnedNoRows`; callers map
    /// that case to an `Option::None` instead of propagating an error.
    pub fn is_not_found(err: &rusqlite::Error) -> bool {
        matches!(err, rusqlite::Error::QueryReturnedNoRows)
    }
}

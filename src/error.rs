//! Error types for the gateway.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the gateway surfaces to its callers.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// An operation ran before `open` or after `close`.
    #[error("No database")]
    NoDatabase,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema file {} does not exist", .0.display())]
    SchemaNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Execution of a prepared statement failed. The engine error is not kept.
    #[error("Unexpected error when running prepared statement {label}")]
    PreparedStatement { label: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

impl GatewayError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// True when the engine rejected a write because of a UNIQUE or PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

//! Gateway configuration.
//!
//! Usually built in code, but can be read from TOML:
//!
//! ```toml
//! db_path = "data/app.db"
//! schema_file = "sql/schema.sql"
//! migrations_file = "sql/migrations.sql"
//! verbose_migrations = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::schema::Schema;

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 16;

/// SQLite gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Run `PRAGMA foreign_keys = ON` after opening
    pub foreign_keys: bool,
    /// Capacity of the connection's prepared statement cache
    pub statement_cache_capacity: usize,
    /// SQL file executed as one batch on start
    pub schema_file: Option<PathBuf>,
    /// `;`-separated SQL applied statement by statement on start
    pub migrations_file: Option<PathBuf>,
    pub verbose_migrations: bool,
    /// Typed schema applied on start, before `schema_file`
    pub schema: Option<Schema>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_PATH.to_string(),
            foreign_keys: true,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            schema_file: None,
            migrations_file: None,
            verbose_migrations: true,
            schema: None,
        }
    }
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_file = Some(path.into());
        self
    }

    pub fn with_migrations_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.migrations_file = Some(path.into());
        self
    }

    pub fn with_verbose_migrations(mut self, verbose: bool) -> Self {
        self.verbose_migrations = verbose;
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == MEMORY_PATH
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GatewayError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| GatewayError::io(path, e))?;
        Self::from_toml_str(&content)
    }
}

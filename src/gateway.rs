//! The database gateway: one connection slot plus the fragment-based CRUD
//! helpers built on top of it.
//!
//! CRUD helpers take a SQL *fragment* (the statement minus its leading
//! keyword) and prepend `INSERT INTO `, `UPDATE `, `SELECT ` or
//! `DELETE FROM `. Fragments are concatenated as-is; only values travel as
//! bound parameters.

use std::path::Path;
use std::sync::Arc;

use futures::lock::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::config::SqliteConfig;
use crate::error::{GatewayError, Result};
use crate::sqlite::{self, Params, Row, Value};

/// Handle to a single SQLite connection.
///
/// Clones share the same connection slot. Every operation other than
/// `open*`, `close` and `m2m` fails with [`GatewayError::NoDatabase`] while
/// the slot is empty.
#[derive(Clone, Default)]
pub struct Database {
    connection: Arc<Mutex<Option<Connection>>>,
}

/// Outcome of running a prepared statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub last_insert_id: i64,
    pub changes: usize,
}

/// A compiled statement kept in the connection's statement cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    sql: String,
    parameter_count: usize,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

impl Database {
    /// Create a handle with no open connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) the database file at `path`, replacing any open connection.
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        self.install(conn).await;
        Ok(())
    }

    pub async fn open_in_memory(&self) -> Result<()> {
        let conn = Connection::open_in_memory()?;
        self.install(conn).await;
        Ok(())
    }

    /// Open the database described by `config` and apply its connection settings.
    pub async fn open_with(&self, config: &SqliteConfig) -> Result<()> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }
        self.install(conn).await;
        Ok(())
    }

    async fn install(&self, conn: Connection) {
        let mut slot = self.connection.lock().await;
        if slot.replace(conn).is_some() {
            debug!("replaced an already open connection");
        }
        debug!("database opened");
    }

    pub async fn is_open(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Release the connection. Failures are logged, never returned.
    pub async fn close(&self) {
        let Some(conn) = self.connection.lock().await.take() else {
            error!("Error closing database: {}", GatewayError::NoDatabase);
            return;
        };
        match conn.close() {
            Ok(()) => info!("Database connection closed"),
            Err((_conn, err)) => error!("Error closing database: {err}"),
        }
    }

    /// Run `f` against the open connection.
    pub(crate) async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let slot = self.connection.lock().await;
        let conn = slot.as_ref().ok_or(GatewayError::NoDatabase)?;
        f(conn)
    }

    async fn run(&self, sql: String, params: Params) -> Result<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            Ok(sqlite::execute(conn, &mut stmt, &params)?)
        })
        .await
    }

    async fn rows(&self, sql: String, params: Params, limit: Option<usize>) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            Ok(sqlite::query_rows(&mut stmt, &params, limit)?)
        })
        .await
    }

    /// `INSERT INTO {fragment}`; returns the rowid of the inserted row.
    pub async fn insert(&self, fragment: &str, params: impl Into<Params>) -> Result<i64> {
        let sql = format!("INSERT INTO {fragment}");
        let params = params.into();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            sqlite::execute(conn, &mut stmt, &params)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// `UPDATE {fragment}`; returns the number of changed rows.
    pub async fn update(&self, fragment: &str, params: impl Into<Params>) -> Result<usize> {
        self.run(format!("UPDATE {fragment}"), params.into()).await
    }

    /// `SELECT {fragment}`; every matching row in engine order.
    pub async fn select_all(&self, fragment: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        self.rows(format!("SELECT {fragment}"), params.into(), None)
            .await
    }

    /// `SELECT {fragment}`; the first row, if any.
    pub async fn select_one(
        &self,
        fragment: &str,
        params: impl Into<Params>,
    ) -> Result<Option<Row>> {
        let rows = self
            .rows(format!("SELECT {fragment}"), params.into(), Some(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// `SELECT {fragment}`; the first column of the first row, `None` when nothing matched.
    pub async fn select_value(
        &self,
        fragment: &str,
        params: impl Into<Params>,
    ) -> Result<Option<Value>> {
        let sql = format!("SELECT {fragment}");
        let params = params.into();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            Ok(sqlite::query_first_value(&mut stmt, &params)?)
        })
        .await
    }

    /// Run a complete query with no prefix injected.
    pub async fn raw_select(&self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        self.rows(sql.to_string(), params.into(), None).await
    }

    /// `DELETE FROM {fragment}`; returns the number of deleted rows.
    pub async fn delete_where(&self, fragment: &str, params: impl Into<Params>) -> Result<usize> {
        self.run(format!("DELETE FROM {fragment}"), params.into())
            .await
    }

    /// Delete every row of `table`.
    pub async fn truncate(&self, table: &str) -> Result<usize> {
        self.run(format!("DELETE FROM {table}"), Params::new()).await
    }

    /// Compile `sql` into the connection's statement cache.
    pub async fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        self.with_conn(|conn| {
            let stmt = conn.prepare_cached(sql)?;
            Ok(PreparedStatement {
                sql: sql.to_string(),
                parameter_count: stmt.parameter_count(),
            })
        })
        .await
    }

    /// Execute a prepared statement. Any engine failure is replaced by
    /// [`GatewayError::PreparedStatement`] tagged with `label`.
    pub async fn run_prepared(
        &self,
        statement: &PreparedStatement,
        params: impl Into<Params>,
        label: &str,
    ) -> Result<RunResult> {
        let params = params.into();
        self.with_conn(|conn| {
            let run = || -> rusqlite::Result<RunResult> {
                let mut stmt = conn.prepare_cached(&statement.sql)?;
                let changes = sqlite::execute(conn, &mut stmt, &params)?;
                Ok(RunResult {
                    last_insert_id: conn.last_insert_rowid(),
                    changes,
                })
            };
            run().map_err(|err| {
                debug!(label, error = %err, "prepared statement failed");
                GatewayError::PreparedStatement {
                    label: label.to_string(),
                }
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn users() -> Database {
        let db = Database::new();
        db.open_in_memory().await.unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);")?;
            Ok(())
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn select_one_returns_first_row_only() {
        let db = users().await;
        db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
        db.insert("users (name) VALUES (?)", ["Grace"]).await.unwrap();

        let row = db
            .select_one("name FROM users ORDER BY id", ())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], Value::from("Ada"));
    }

    #[tokio::test]
    async fn clones_share_the_connection() {
        let db = users().await;
        let other = db.clone();
        other.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
        other.close().await;

        assert!(!db.is_open().await);
        assert!(matches!(
            db.select_all("* FROM users", ()).await,
            Err(GatewayError::NoDatabase)
        ));
    }

    #[tokio::test]
    async fn named_params_bind_by_name() {
        let db = users().await;
        db.insert(
            "users (id, name) VALUES (:id, :name)",
            Params::new().with_value("name", "Ada").with_value("id", 7),
        )
        .await
        .unwrap();

        let name = db
            .select_value(
                "name FROM users WHERE id = :id",
                Params::new().with_value("id", 7),
            )
            .await
            .unwrap();
        assert_eq!(name, Some(Value::from("Ada")));
    }

    #[tokio::test]
    async fn prepared_statement_reports_changes() {
        let db = users().await;
        let stmt = db
            .prepare("INSERT INTO users (name) VALUES (?)")
            .await
            .unwrap();
        assert_eq!(stmt.parameter_count(), 1);

        let first = db
            .run_prepared(&stmt, ["Ada"], "insert user")
            .await
            .unwrap();
        let second = db
            .run_prepared(&stmt, ["Grace"], "insert user")
            .await
            .unwrap();
        assert_eq!(
            first,
            RunResult {
                last_insert_id: 1,
                changes: 1
            }
        );
        assert_eq!(second.last_insert_id, 2);
    }

    #[tokio::test]
    async fn insert_returning_yields_rowid() {
        let db = users().await;
        let id = db
            .insert("users (name) VALUES (?) RETURNING id", ["Ada"])
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn prepared_select_runs_without_changes() {
        let db = users().await;
        db.insert("users (name) VALUES (?)", ["Ada"]).await.unwrap();
        let stmt = db.prepare("SELECT name FROM users").await.unwrap();

        let result = db.run_prepared(&stmt, (), "list users").await.unwrap();
        assert_eq!(result.changes, 0);
    }
}

//! Schema loading and best-effort migrations.
//!
//! A migration file is plain SQL separated by `;`. Each statement runs on
//! its own and a failing statement never stops the run: errors that mean
//! "this was done before" are reported as [`MigrationOutcome::AlreadyApplied`],
//! anything else as [`MigrationOutcome::Failed`].
//!
//! Splitting is a bare split on `;`. Statements holding a `;` inside a
//! string literal or a trigger body are cut in pieces.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::error::{is_unique_violation, GatewayError, Result};
use crate::gateway::Database;
use crate::schema::Schema;

/// How a single migration statement fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied,
    AlreadyApplied { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementReport {
    pub statement: String,
    pub outcome: MigrationOutcome,
}

/// Per-statement results of one `run_migrations` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub statements: Vec<StatementReport>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Applied))
    }

    pub fn already_applied(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::AlreadyApplied { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&MigrationOutcome) -> bool) -> usize {
        self.statements.iter().filter(|s| pred(&s.outcome)).count()
    }
}

/// Split migration text on every `;`, dropping empty pieces.
pub fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}

fn classify(err: &rusqlite::Error) -> MigrationOutcome {
    let reason = err.to_string();
    let repeated = is_unique_violation(err)
        || reason.contains("already exists")
        || reason.contains("duplicate column name");
    if repeated {
        MigrationOutcome::AlreadyApplied { reason }
    } else {
        MigrationOutcome::Failed { reason }
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| GatewayError::io(path, e))
}

impl Database {
    /// Execute the whole schema file as a single batch.
    #[instrument(skip_all)]
    pub async fn create_from_schema(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading schema");
        if !self.is_open().await {
            return Err(GatewayError::NoDatabase);
        }
        if !path.exists() {
            return Err(GatewayError::SchemaNotFound(path.to_path_buf()));
        }
        let schema = read(path)?;
        self.with_conn(|conn| Ok(conn.execute_batch(&schema)?))
            .await?;
        debug!("schema applied");
        Ok(())
    }

    /// Apply a typed schema definition. Rendered DDL uses `IF NOT EXISTS`.
    pub async fn apply_schema(&self, schema: &Schema) -> Result<()> {
        let ddl = schema.to_sql();
        self.with_conn(|conn| Ok(conn.execute_batch(&ddl)?))
            .await?;
        debug!(tables = schema.tables.len(), "typed schema applied");
        Ok(())
    }

    /// Run every statement of the migration file, continuing past failures.
    ///
    /// Only a missing connection or an unreadable file is an error.
    #[instrument(skip_all)]
    pub async fn run_migrations(
        &self,
        path: impl AsRef<Path>,
        verbose: bool,
    ) -> Result<MigrationReport> {
        let path = path.as_ref();
        debug!(path = %path.display(), verbose, "running migrations");
        if !self.is_open().await {
            return Err(GatewayError::NoDatabase);
        }
        let migrations = read(path)?;

        let report = self
            .with_conn(|conn| {
                let mut report = MigrationReport::default();
                for statement in split_statements(&migrations) {
                    let outcome = match conn.execute_batch(statement) {
                        Ok(()) => MigrationOutcome::Applied,
                        Err(err) => classify(&err),
                    };
                    log_outcome(statement, &outcome, verbose);
                    report.statements.push(StatementReport {
                        statement: statement.to_string(),
                        outcome,
                    });
                }
                Ok(report)
            })
            .await?;

        debug!(
            applied = report.applied(),
            already_applied = report.already_applied(),
            failed = report.failed(),
            "migrations finished"
        );
        Ok(report)
    }
}

fn log_outcome(statement: &str, outcome: &MigrationOutcome, verbose: bool) {
    match outcome {
        MigrationOutcome::Applied if verbose => info!("Migration applied: {statement}"),
        MigrationOutcome::Applied => debug!("Migration applied: {statement}"),
        MigrationOutcome::AlreadyApplied { .. } if verbose => {
            info!("Migration already applied: {statement}")
        }
        MigrationOutcome::AlreadyApplied { .. } => {
            debug!("Migration already applied: {statement}")
        }
        MigrationOutcome::Failed { reason } => {
            warn!("Migration failed: {statement}: {reason}")
        }
    }
}

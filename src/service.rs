//! Lifecycle wrapper that drives a [`Database`] from a [`SqliteConfig`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::config::SqliteConfig;
use crate::gateway::Database;

/// Start/stop hooks for long-lived components.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// SQLite service: opens the configured database on start, applies the typed
/// schema, the schema file and the migrations in that order, and closes the
/// connection on stop.
pub struct SqliteService {
    config: SqliteConfig,
    db: Database,
}

impl SqliteService {
    /// Create a new SQLite service with the given config
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            db: Database::new(),
        }
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// The gateway handle; clones share its connection.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Lifecycle for SqliteService {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn start(&self) -> Result<()> {
        info!("starting sqlite service at path: {}", self.config.db_path);
        self.db
            .open_with(&self.config)
            .await
            .with_context(|| format!("failed to open {}", self.config.db_path))?;

        if let Some(schema) = &self.config.schema {
            self.db
                .apply_schema(schema)
                .await
                .context("failed to apply typed schema")?;
        }
        if let Some(path) = &self.config.schema_file {
            self.db
                .create_from_schema(path)
                .await
                .with_context(|| format!("failed to load schema {}", path.display()))?;
        }
        if let Some(path) = &self.config.migrations_file {
            let report = self
                .db
                .run_migrations(path, self.config.verbose_migrations)
                .await
                .with_context(|| format!("failed to run migrations {}", path.display()))?;
            info!(
                applied = report.applied(),
                already_applied = report.already_applied(),
                failed = report.failed(),
                "migrations complete"
            );
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.db.close().await;
        info!("sqlite service stopped");
        Ok(())
    }
}

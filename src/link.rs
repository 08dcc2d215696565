//! Many-to-many association helper.
//!
//! A link between `table1` row `id1` and `table2` row `id2` is a row of the
//! join table `{table1}_{table2}s` with columns `{table1}_id` and
//! `{table2}_id`. The name is derived, not configurable.

use tracing::{debug, warn};

use crate::error::{is_unique_violation, GatewayError};
use crate::gateway::Database;
use crate::sqlite::{Params, Value};

/// Result of a link or unlink request. Never an error: failures are
/// reported as [`LinkOutcome::Failed`] and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// The join row was already present (uniqueness violation on insert).
    AlreadyLinked,
    Unlinked,
    /// Nothing matched the unlink request.
    NotLinked,
    Failed(String),
}

impl LinkOutcome {
    /// True for every outcome except `Failed`.
    pub fn is_ok(&self) -> bool {
        !matches!(self, LinkOutcome::Failed(_))
    }
}

/// Name of the join table between `table1` and `table2`.
pub fn join_table(table1: &str, table2: &str) -> String {
    format!("{table1}_{table2}s")
}

impl Database {
    /// Link (`linked == true`) or unlink two rows through their join table.
    pub async fn m2m(
        &self,
        table1: &str,
        table2: &str,
        id1: impl Into<Value>,
        id2: impl Into<Value>,
        linked: bool,
    ) -> LinkOutcome {
        let join = join_table(table1, table2);
        let params = Params::Positional(vec![id1.into(), id2.into()]);

        let outcome = if linked {
            let fragment = format!("{join} ({table1}_id, {table2}_id) VALUES (?, ?)");
            match self.insert(&fragment, params).await {
                Ok(_) => LinkOutcome::Linked,
                Err(GatewayError::Sqlite(err)) if is_unique_violation(&err) => {
                    LinkOutcome::AlreadyLinked
                }
                Err(err) => LinkOutcome::Failed(err.to_string()),
            }
        } else {
            let fragment = format!("{join} WHERE {table1}_id = ? AND {table2}_id = ?");
            match self.delete_where(&fragment, params).await {
                Ok(0) => LinkOutcome::NotLinked,
                Ok(_) => LinkOutcome::Unlinked,
                Err(err) => LinkOutcome::Failed(err.to_string()),
            }
        };

        match &outcome {
            LinkOutcome::Failed(reason) => warn!(join = %join, linked, "m2m failed: {reason}"),
            other => debug!(join = %join, ?other, "m2m"),
        }
        outcome
    }

    pub async fn link(
        &self,
        table1: &str,
        table2: &str,
        id1: impl Into<Value>,
        id2: impl Into<Value>,
    ) -> LinkOutcome {
        self.m2m(table1, table2, id1, id2, true).await
    }

    pub async fn unlink(
        &self,
        table1: &str,
        table2: &str,
        id1: impl Into<Value>,
        id2: impl Into<Value>,
    ) -> LinkOutcome {
        self.m2m(table1, table2, id1, id2, false).await
    }
}

//! Thin SQLite gateway.
//!
//! # Intention
//!
//! - Hold one connection per [`Database`] handle and translate small SQL
//!   fragments plus parameter lists into engine calls.
//! - Load schema files, apply best-effort migrations and manage
//!   many-to-many join rows.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No pooling, caching, transactions or schema versioning; the engine does
//!   the real work.

pub mod config;
pub mod error;
pub mod gateway;
pub mod link;
pub mod migrate;
pub mod query;
pub mod schema;
pub mod service;
pub mod sqlite;

pub use config::SqliteConfig;
pub use error::{GatewayError, Result};
pub use gateway::{Database, PreparedStatement, RunResult};
pub use link::{join_table, LinkOutcome};
pub use migrate::{split_statements, MigrationOutcome, MigrationReport, StatementReport};
pub use query::{
    CreateOperation, CrudOperation, CrudResult, DeleteOperation, Query, QueryOperator,
    ReadOperation, SqlQuery, UpdateOperation,
};
pub use schema::Schema;
pub use service::{Lifecycle, SqliteService};
pub use sqlite::{Params, Row, Value};

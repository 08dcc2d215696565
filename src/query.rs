//! Typed query builder.
//!
//! An alternative to the fragment helpers: operations are described as data
//! and rendered to a [`SqlQuery`] with quoted identifiers and positional
//! parameters.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{GatewayError, Result};
use crate::gateway::Database;
use crate::sqlite::{self, Params, Row, Value};

/// SQL Query with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }
}

/// Query operators for building advanced queries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperator {
    Equal(Value),
    NotEqual(Value),
    GreaterThan(Value),
    GreaterThanOrEqual(Value),
    LessThan(Value),
    LessThanOrEqual(Value),
    Like(String),
    In(Vec<Value>),
}

/// Conjunction of per-field conditions. One operator per field; rendered in
/// field-name order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub conditions: BTreeMap<String, QueryOperator>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition(mut self, field: &str, op: QueryOperator) -> Self {
        self.conditions.insert(field.to_string(), op);
        self
    }

    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        if self.conditions.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        for (i, (field, op)) in self.conditions.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            let field = quote_identifier(field);
            let (symbol, value) = match op {
                QueryOperator::Equal(v) => ("=", v.clone()),
                QueryOperator::NotEqual(v) => ("<>", v.clone()),
                QueryOperator::GreaterThan(v) => (">", v.clone()),
                QueryOperator::GreaterThanOrEqual(v) => (">=", v.clone()),
                QueryOperator::LessThan(v) => ("<", v.clone()),
                QueryOperator::LessThanOrEqual(v) => ("<=", v.clone()),
                QueryOperator::Like(pattern) => ("LIKE", Value::Text(pattern.clone())),
                QueryOperator::In(values) if values.is_empty() => {
                    sql.push_str("0 = 1");
                    continue;
                }
                QueryOperator::In(values) => {
                    let marks = vec!["?"; values.len()].join(", ");
                    let _ = write!(sql, "{field} IN ({marks})");
                    params.extend(values.iter().cloned());
                    continue;
                }
            };
            let _ = write!(sql, "{field} {symbol} ?");
            params.push(value);
        }
    }
}

/// CRUD operation types
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOperation {
    pub table: String,
    pub data: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOperation {
    pub table: String,
    pub query: Query,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order_by: Option<Vec<(String, bool)>>, // (field, is_ascending)
}

impl ReadOperation {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            query: Query::new(),
            fields: None,
            limit: None,
            offset: None,
            order_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOperation {
    pub table: String,
    pub query: Query,
    pub updates: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    pub table: String,
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrudOperation {
    Create(CreateOperation),
    Read(ReadOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

/// What an executed [`CrudOperation`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CrudResult {
    Created(i64),
    Rows(Vec<Row>),
    Updated(usize),
    Deleted(usize),
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl CrudOperation {
    pub fn to_sql(&self) -> Result<SqlQuery> {
        let mut params = Vec::new();
        let mut sql = String::new();
        match self {
            CrudOperation::Create(op) => {
                let _ = write!(sql, "INSERT INTO {}", quote_identifier(&op.table));
                if op.data.is_empty() {
                    sql.push_str(" DEFAULT VALUES");
                } else {
                    let columns: Vec<_> = op.data.keys().map(|k| quote_identifier(k)).collect();
                    let marks = vec!["?"; op.data.len()].join(", ");
                    let _ = write!(sql, " ({}) VALUES ({marks})", columns.join(", "));
                    params.extend(op.data.values().cloned());
                }
            }
            CrudOperation::Read(op) => {
                let fields = match &op.fields {
                    Some(fields) if !fields.is_empty() => fields
                        .iter()
                        .map(|f| quote_identifier(f))
                        .collect::<Vec<_>>()
                        .join(", "),
                    _ => "*".to_string(),
                };
                let _ = write!(sql, "SELECT {fields} FROM {}", quote_identifier(&op.table));
                op.query.render(&mut sql, &mut params);
                if let Some(order) = op.order_by.as_ref().filter(|o| !o.is_empty()) {
                    let terms: Vec<_> = order
                        .iter()
                        .map(|(field, asc)| {
                            format!(
                                "{} {}",
                                quote_identifier(field),
                                if *asc { "ASC" } else { "DESC" }
                            )
                        })
                        .collect();
                    let _ = write!(sql, " ORDER BY {}", terms.join(", "));
                }
                match (op.limit, op.offset) {
                    (Some(limit), Some(offset)) => {
                        let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
                    }
                    (Some(limit), None) => {
                        let _ = write!(sql, " LIMIT {limit}");
                    }
                    (None, Some(offset)) => {
                        let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
                    }
                    (None, None) => {}
                }
            }
            CrudOperation::Update(op) => {
                if op.updates.is_empty() {
                    return Err(GatewayError::InvalidOperation(format!(
                        "update of {} has no assignments",
                        op.table
                    )));
                }
                let assignments: Vec<_> = op
                    .updates
                    .keys()
                    .map(|k| format!("{} = ?", quote_identifier(k)))
                    .collect();
                let _ = write!(
                    sql,
                    "UPDATE {} SET {}",
                    quote_identifier(&op.table),
                    assignments.join(", ")
                );
                params.extend(op.updates.values().cloned());
                op.query.render(&mut sql, &mut params);
            }
            CrudOperation::Delete(op) => {
                let _ = write!(sql, "DELETE FROM {}", quote_identifier(&op.table));
                op.query.render(&mut sql, &mut params);
            }
        }
        Ok(SqlQuery {
            statement: sql,
            params: Params::Positional(params),
        })
    }
}

impl Database {
    /// Execute a statement, discarding any rows; yields the change count.
    pub async fn execute(&self, query: &SqlQuery) -> Result<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&query.statement)?;
            Ok(sqlite::execute(conn, &mut stmt, &query.params)?)
        })
        .await
    }

    pub async fn query(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&query.statement)?;
            Ok(sqlite::query_rows(&mut stmt, &query.params, None)?)
        })
        .await
    }

    /// Perform a CRUD operation (type-safe API)
    pub async fn execute_crud(&self, op: &CrudOperation) -> Result<CrudResult> {
        let query = op.to_sql()?;
        match op {
            CrudOperation::Create(_) => {
                self.with_conn(|conn| {
                    let mut stmt = conn.prepare(&query.statement)?;
                    sqlite::execute(conn, &mut stmt, &query.params)?;
                    Ok(CrudResult::Created(conn.last_insert_rowid()))
                })
                .await
            }
            CrudOperation::Read(_) => self.query(&query).await.map(CrudResult::Rows),
            CrudOperation::Update(_) => self.execute(&query).await.map(CrudResult::Updated),
            CrudOperation::Delete(_) => self.execute(&query).await.map(CrudResult::Deleted),
        }
    }
}

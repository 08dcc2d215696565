//! Core value model shared by every gateway operation: values, parameter
//! bindings and materialised rows.

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, Statement};
use std::collections::HashMap;

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// Bound as `0`/`1`. Never produced when reading rows back.
    Boolean(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(v: ValueRef<'_>) -> Self {
        match v {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Boolean(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
        };
        Ok(out)
    }
}

/// A materialised result row, keyed by column name.
pub type Row = HashMap<String, Value>;

/// Parameter bindings for SQL queries
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Bound in order to `?` / `?N` placeholders.
    Positional(Vec<Value>),
    /// Bound by name to `:name`, `@name` or `$name` placeholders.
    Named(Vec<(String, Value)>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    /// Create an empty positional parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value. A name without a `:`, `@` or `$` prefix gets `:`.
    ///
    /// # Panics
    ///
    /// Panics if `self` already holds positional values; the two binding
    /// styles cannot be mixed in one list.
    pub fn with_value(self, name: &str, value: impl Into<Value>) -> Self {
        let name = if name.starts_with([':', '@', '$']) {
            name.to_string()
        } else {
            format!(":{name}")
        };
        let mut named = match self {
            Params::Named(named) => named,
            Params::Positional(values) if values.is_empty() => Vec::new(),
            Params::Positional(values) => panic!(
                "cannot add named param {name} to {} positional params",
                values.len()
            ),
        };
        named.push((name, value.into()));
        Params::Named(named)
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(named) => named.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl<V: Into<Value>, const N: usize> From<[V; N]> for Params {
    fn from(values: [V; N]) -> Self {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

/// Bind `params` onto a freshly prepared (or reset) statement.
pub(crate) fn bind(stmt: &mut Statement<'_>, params: &Params) -> rusqlite::Result<()> {
    match params {
        Params::Positional(values) => {
            let expected = stmt.parameter_count();
            if values.len() != expected {
                return Err(rusqlite::Error::InvalidParameterCount(values.len(), expected));
            }
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
        }
        Params::Named(named) => {
            for (name, value) in named {
                let index = stmt
                    .parameter_index(name)?
                    .ok_or_else(|| rusqlite::Error::InvalidParameterName(name.clone()))?;
                stmt.raw_bind_parameter(index, value)?;
            }
        }
    }
    Ok(())
}

/// Bind and step a statement to completion, yielding the change count.
///
/// Rows produced along the way (`RETURNING`, a prepared `SELECT`) are
/// drained and discarded. Read-only statements report zero changes.
pub(crate) fn execute(
    conn: &Connection,
    stmt: &mut Statement<'_>,
    params: &Params,
) -> rusqlite::Result<usize> {
    bind(stmt, params)?;
    let mut rows = stmt.raw_query();
    while rows.next()?.is_some() {}
    drop(rows);
    if stmt.readonly() {
        return Ok(0);
    }
    Ok(conn.changes() as usize)
}

/// Bind and run a query, materialising at most `limit` rows.
pub(crate) fn query_rows(
    stmt: &mut Statement<'_>,
    params: &Params,
    limit: Option<usize>,
) -> rusqlite::Result<Vec<Row>> {
    bind(stmt, params)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while limit.map_or(true, |max| out.len() < max) {
        let Some(row) = rows.next()? else {
            break;
        };
        let mut map = Row::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            map.insert(name.clone(), Value::from(row.get_ref(i)?));
        }
        out.push(map);
    }
    Ok(out)
}

/// Bind and run a query, returning the first column of the first row.
pub(crate) fn query_first_value(
    stmt: &mut Statement<'_>,
    params: &Params,
) -> rusqlite::Result<Option<Value>> {
    bind(stmt, params)?;
    let mut rows = stmt.raw_query();
    match rows.next()? {
        Some(row) => Ok(Some(Value::from(row.get_ref(0)?))),
        None => Ok(None),
    }
}

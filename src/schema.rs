//! Typed schema definitions rendered to SQLite DDL.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::query::quote_identifier;

/// Schema definition for the SQLite database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Render every table and index as `IF NOT EXISTS` DDL.
    pub fn to_sql(&self) -> String {
        self.tables
            .iter()
            .map(TableDefinition::to_sql)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl TableDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn to_sql(&self) -> String {
        let table = quote_identifier(&self.name);
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDefinition::to_sql).collect();
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quote_list(&self.primary_key)));
        }
        for fk in &self.foreign_keys {
            parts.push(fk.to_sql());
        }

        let mut sql = format!("CREATE TABLE IF NOT EXISTS {table} ({});", parts.join(", "));
        for index in &self.indexes {
            let _ = write!(
                sql,
                "\nCREATE {}INDEX IF NOT EXISTS {} ON {table} ({});",
                if index.unique { "UNIQUE " } else { "" },
                quote_identifier(&index.name),
                quote_list(&index.columns)
            );
        }
        sql
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub constraints: Vec<ColumnConstraint>,
    #[serde(default)]
    pub default_value: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            constraints: Vec::new(),
            default_value: None,
        }
    }

    pub fn constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_identifier(&self.name), self.data_type.as_sql());
        for constraint in &self.constraints {
            sql.push_str(match constraint {
                ColumnConstraint::PrimaryKey => " PRIMARY KEY",
                ColumnConstraint::NotNull => " NOT NULL",
                ColumnConstraint::Unique => " UNIQUE",
            });
        }
        if let Some(default) = &self.default_value {
            let _ = write!(sql, " DEFAULT {}", default.as_sql());
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Text,
    Real,
    Blob,
}

impl DataType {
    fn as_sql(self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Real => "REAL",
            DataType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnConstraint {
    PrimaryKey,
    NotNull,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Integer(i64),
    Text(String),
    Real(f64),
    Null,
    CurrentTimestamp,
}

impl DefaultValue {
    fn as_sql(&self) -> String {
        match self {
            DefaultValue::Integer(i) => i.to_string(),
            // Parenthesised so negative and exponent forms stay valid.
            DefaultValue::Real(f) => format!("({f:?})"),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    fn to_sql(&self) -> String {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_identifier(&self.column),
            quote_identifier(&self.foreign_table),
            quote_identifier(&self.foreign_column),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    fn as_sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}

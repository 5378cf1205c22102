//! ## usagerx-protocols::command
//! Structured insert commands handed from a handler to the persistence sink.
//!
//! Column names are `'static` identifiers owned by the handler; the table name
//! comes from validated configuration; every field value travels as a typed
//! binding and is never spliced into SQL text.

use chrono::{DateTime, Utc};

/// Typed value bound to one column.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Blob(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Storage class of a column, used when provisioning tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
    Timestamp,
}

/// Name and type of one destination column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: SqlType,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self { name, sql_type }
    }
}

/// Parameterized insert: destination table plus ordered column bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistenceCommand {
    table: String,
    bindings: Vec<(&'static str, SqlValue)>,
}

impl PersistenceCommand {
    pub fn insert_into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn bind(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.bindings.push((column, value.into()));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn bindings(&self) -> &[(&'static str, SqlValue)] {
        &self.bindings
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.iter().map(|(c, _)| *c)
    }

    /// Value bound to `column`, if any.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.bindings
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_binding_order_and_types() {
        let cmd = PersistenceCommand::insert_into("gftp_transfers")
            .bind("num_bytes", 504i64)
            .bind("hostname", "host'; DROP TABLE x; --")
            .bind("buffer_size", None::<i64>)
            .bind("audit_used", true);

        assert_eq!(cmd.table(), "gftp_transfers");
        assert_eq!(
            cmd.columns().collect::<Vec<_>>(),
            ["num_bytes", "hostname", "buffer_size", "audit_used"]
        );
        assert_eq!(
            cmd.value("hostname"),
            Some(&SqlValue::Text("host'; DROP TABLE x; --".into()))
        );
        assert!(cmd.value("buffer_size").unwrap().is_null());
        assert_eq!(cmd.value("audit_used"), Some(&SqlValue::Integer(1)));
    }
}

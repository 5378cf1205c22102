//! ## usagerx-storage::sqlite
//! SQLite sink. One connection guarded by a `parking_lot::Mutex`; consumers
//! serialize on it for the duration of a single insert.
//!
//! Inserts are built from validated, double-quoted identifiers and positional
//! `?N` placeholders; every field value is a bound parameter. Timestamps are
//! stored as RFC 3339 text with microsecond precision.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info, instrument};

use usagerx_protocols::{ColumnSpec, PersistenceCommand, SqlType, SqlValue};

use crate::error::{PersistenceError, StorageError};
use crate::identifier::quote_identifier;
use crate::sink::PersistenceSink;

pub struct SqliteSink {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteSink {
    /// Opens (creating if needed) the database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| StorageError::Open {
            path: path.clone(),
            source,
        };

        let conn = Connection::open(&path).map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        conn.execute_batch("PRAGMA journal_mode = wal;")
            .map_err(open_err)?;
        conn.execute_batch("PRAGMA synchronous = normal;")
            .map_err(open_err)?;

        info!("Opened usage database");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Round-trips a trivial query.
    pub fn ping(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// `CREATE TABLE IF NOT EXISTS` for a handler's column list, with a
    /// surrogate `id` key in front.
    #[instrument(skip(self, columns))]
    pub fn provision(&self, table: &str, columns: &[ColumnSpec]) -> Result<(), StorageError> {
        let sql = create_table_sql(table, columns)?;
        let conn = self.conn.lock();
        conn.execute_batch(&sql)
            .map_err(|source| StorageError::Provision {
                table: table.to_string(),
                source,
            })?;
        debug!(columns = columns.len(), "Provisioned table");
        Ok(())
    }

    pub fn count_rows(&self, table: &str) -> Result<i64, StorageError> {
        let quoted = quote_identifier(table)
            .ok_or_else(|| StorageError::InvalidIdentifier(table.to_string()))?;
        let conn = self.conn.lock();
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Runs `f` against the locked connection.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, StorageError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink").field("path", &self.path).finish()
    }
}

impl PersistenceSink for SqliteSink {
    fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        let sql = insert_sql(command)?;
        let values = command.bindings().iter().map(|(_, v)| to_sql_value(v));

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|source| PersistenceError::Write {
                table: command.table().to_string(),
                source,
            })?;
        stmt.execute(params_from_iter(values))
            .map_err(|source| PersistenceError::Write {
                table: command.table().to_string(),
                source,
            })?;
        Ok(())
    }
}

fn insert_sql(command: &PersistenceCommand) -> Result<String, PersistenceError> {
    if command.is_empty() {
        return Err(PersistenceError::EmptyCommand(command.table().to_string()));
    }
    let table = quote_identifier(command.table())
        .ok_or_else(|| PersistenceError::InvalidIdentifier(command.table().to_string()))?;

    let mut columns = Vec::with_capacity(command.len());
    for column in command.columns() {
        columns.push(
            quote_identifier(column)
                .ok_or_else(|| PersistenceError::InvalidIdentifier(column.to_string()))?,
        );
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    ))
}

fn create_table_sql(table: &str, columns: &[ColumnSpec]) -> Result<String, StorageError> {
    let quoted = quote_identifier(table)
        .ok_or_else(|| StorageError::InvalidIdentifier(table.to_string()))?;

    let mut defs = vec!["\"id\" INTEGER PRIMARY KEY".to_string()];
    for column in columns {
        let name = quote_identifier(column.name)
            .ok_or_else(|| StorageError::InvalidIdentifier(column.name.to_string()))?;
        defs.push(format!("{name} {}", sql_type_name(column.sql_type)));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {quoted} ({});",
        defs.join(", ")
    ))
}

fn sql_type_name(sql_type: SqlType) -> &'static str {
    match sql_type {
        SqlType::Integer => "INTEGER",
        SqlType::Real => "REAL",
        SqlType::Text | SqlType::Timestamp => "TEXT",
        SqlType::Blob => "BLOB",
    }
}

fn to_sql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
        SqlValue::Timestamp(v) => Value::Text(v.to_rfc3339_opts(SecondsFormat::Micros, true)),
    }
}

/// SQLite Adapter
///
/// Implements the driver contract over `rusqlite`. Metadata comes from the
/// `table_info`, `index_list` and `index_info` pragmas, reported with their
/// native column names.
use super::dialect::SqliteDialect;
use crate::config::DriverOptions;
use crate::core::db::driver::{DatabaseDriver, ResultCursor, ServerType, StatementInterface};
use crate::core::value::{BoundParams, Record, Value};
use crate::core::{DatabaseError, Result};
use crate::query::SqlDialect;
use indexmap::IndexMap;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, Rows, Statement};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const ADAPTER: &str = "sqlite";

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(t) => ValueRef::Text(t.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

fn execution_error(sql: &str, err: rusqlite::Error) -> DatabaseError {
    DatabaseError::execution(ADAPTER, Some(sql), err)
}

/// Driver for SQLite database files (or `:memory:`).
pub struct SqliteDriver {
    path: Option<PathBuf>,
    database: String,
    prefix: String,
    connection: Option<Connection>,
    dialect: Arc<SqliteDialect>,
}

impl SqliteDriver {
    /// Creates a driver; the file is opened on first use.
    pub fn new(options: &DriverOptions) -> Self {
        SqliteDriver {
            path: options.path.clone(),
            database: options.database.clone().unwrap_or_default(),
            prefix: options.prefix.clone(),
            connection: None,
            dialect: Arc::new(SqliteDialect),
        }
    }

    /// Wraps an already open connection.
    pub fn from_connection(connection: Connection, prefix: &str) -> Self {
        SqliteDriver {
            path: connection.path().map(PathBuf::from),
            database: String::new(),
            prefix: prefix.to_string(),
            connection: Some(connection),
            dialect: Arc::new(SqliteDialect),
        }
    }

    fn connection(&mut self) -> Result<&Connection> {
        self.connect()?;
        self.connection
            .as_ref()
            .ok_or_else(|| DatabaseError::Connection("SQLite connection is not open".to_string()))
    }

    fn native_table_name(&self, table: &str) -> String {
        DatabaseDriver::replace_prefix(self, table)
    }
}

impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &str {
        ADAPTER
    }

    fn server_type(&self) -> ServerType {
        ServerType::Sqlite
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.dialect.clone()
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let connection = match &self.path {
            Some(path) if path.as_os_str() != ":memory:" => Connection::open(path),
            _ => Connection::open_in_memory(),
        }
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        info!(
            "Opened SQLite database {}",
            self.path.as_deref().map_or(":memory:".into(), |p| p.display().to_string())
        );
        self.connection = Some(connection);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connection.is_some()
    }

    fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            debug!("Closed SQLite connection");
        }
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn StatementInterface + '_>> {
        let sql = DatabaseDriver::replace_prefix(self, sql);
        debug!("Preparing: {}", sql);
        let statement = self
            .connection()?
            .prepare(&sql)
            .map_err(|e| execution_error(&sql, e))?;
        Ok(Box::new(SqliteStatement { statement, sql }))
    }

    fn table_columns(&mut self, table: &str) -> Result<IndexMap<String, Record>> {
        let sql = format!("PRAGMA table_info({})", self.quote_name(table));
        let rows = self.load_object_list(&sql, &BoundParams::default())?;

        let mut columns = IndexMap::new();
        for mut row in rows {
            row.shift_remove("cid");
            let name = row.get("name").and_then(Value::as_text).map(|n| n.into_owned());
            if let Some(name) = name {
                columns.insert(name, row);
            }
        }
        Ok(columns)
    }

    fn table_keys(&mut self, table: &str) -> Result<Vec<Record>> {
        let native = self.native_table_name(table);
        let sql = format!("PRAGMA index_list({})", self.quote_name(table));
        let indexes = self.load_object_list(&sql, &BoundParams::default())?;

        let mut keys = Vec::new();
        for index in indexes {
            let name = match index.get("name").and_then(Value::as_text) {
                Some(name) => name.into_owned(),
                None => continue,
            };
            let sql = format!("PRAGMA index_info({})", self.quote_name(&name));
            for column in self.load_object_list(&sql, &BoundParams::default())? {
                let mut key = Record::new();
                key.insert("table".to_string(), Value::from(native.as_str()));
                key.insert("name".to_string(), Value::from(name.as_str()));
                key.insert("unique".to_string(), index.get("unique").cloned().unwrap_or(Value::Null));
                key.insert("origin".to_string(), index.get("origin").cloned().unwrap_or(Value::Null));
                key.insert("seqno".to_string(), column.get("seqno").cloned().unwrap_or(Value::Null));
                key.insert("column".to_string(), column.get("name").cloned().unwrap_or(Value::Null));
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn table_list(&mut self) -> Result<Vec<String>> {
        let rows = self.load_object_list(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &BoundParams::default(),
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_text).map(|n| n.into_owned()))
            .collect())
    }
}

struct SqliteStatement<'c> {
    statement: Statement<'c>,
    sql: String,
}

impl StatementInterface for SqliteStatement<'_> {
    fn bind(&mut self, params: &BoundParams) -> Result<()> {
        let expected = self.statement.parameter_count();
        if params.len() != expected {
            return Err(DatabaseError::execution(
                ADAPTER,
                Some(&self.sql),
                format!("statement expects {expected} parameters, {} bound", params.len()),
            ));
        }

        match params {
            BoundParams::Positional(values) => {
                for (index, value) in values.iter().enumerate() {
                    self.statement
                        .raw_bind_parameter(index + 1, value)
                        .map_err(|e| execution_error(&self.sql, e))?;
                }
            }
            BoundParams::Named(values) => {
                for (name, value) in values {
                    let placeholder = format!(":{name}");
                    let index = self
                        .statement
                        .parameter_index(&placeholder)
                        .map_err(|e| execution_error(&self.sql, e))?
                        .ok_or_else(|| {
                            DatabaseError::execution(
                                ADAPTER,
                                Some(&self.sql),
                                format!("unknown parameter {placeholder}"),
                            )
                        })?;
                    self.statement
                        .raw_bind_parameter(index, value)
                        .map_err(|e| execution_error(&self.sql, e))?;
                }
            }
        }
        Ok(())
    }

    fn execute(&mut self) -> Result<u64> {
        let affected = self
            .statement
            .raw_execute()
            .map_err(|e| execution_error(&self.sql, e))?;
        Ok(affected as u64)
    }

    fn open_cursor(&mut self) -> Result<Box<dyn ResultCursor + '_>> {
        let columns = self
            .statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = self.statement.raw_query();
        Ok(Box::new(SqliteCursor {
            rows,
            columns,
            sql: &self.sql,
        }))
    }
}

struct SqliteCursor<'s> {
    rows: Rows<'s>,
    columns: Vec<String>,
    sql: &'s str,
}

impl ResultCursor for SqliteCursor<'_> {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<Option<Record>> {
        let row = match self.rows.next().map_err(|e| execution_error(self.sql, e))? {
            Some(row) => row,
            None => return Ok(None),
        };

        let mut record = Record::with_capacity(self.columns.len());
        for (index, name) in self.columns.iter().enumerate() {
            let value = row.get_ref(index).map_err(|e| execution_error(self.sql, e))?;
            record.insert(name.clone(), from_value_ref(value));
        }
        Ok(Some(record))
    }
}

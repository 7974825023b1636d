/// MySQL Adapter
///
/// Implements the driver contract over the `mysql` crate. Two adapter names
/// share this implementation, `mysqli` and `mysql`; they differ only in the
/// name reported in errors and dumps. Statements always go through the
/// binary protocol so parameters are never interpolated into SQL text.
use super::dialect::MysqlDialect;
use crate::config::DriverOptions;
use crate::core::db::driver::{DatabaseDriver, ResultCursor, ServerType, StatementInterface};
use crate::core::value::{BoundParams, Record, Value};
use crate::core::{DatabaseError, Result};
use crate::query::SqlDialect;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use mysql::prelude::Queryable;
use mysql::{Binary, Conn, OptsBuilder, Params, QueryResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Which adapter name a [`MysqlDriver`] answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MysqlFlavor {
    Mysqli,
    Pdo,
}

impl MysqlFlavor {
    pub fn adapter_name(self) -> &'static str {
        match self {
            MysqlFlavor::Mysqli => "mysqli",
            MysqlFlavor::Pdo => "mysql",
        }
    }
}

/// Converts a bound value into the protocol's value type.
pub(crate) fn to_mysql(value: &Value) -> mysql::Value {
    match value {
        Value::Null => mysql::Value::NULL,
        Value::Integer(i) => mysql::Value::Int(*i),
        Value::Real(f) => mysql::Value::Double(*f),
        Value::Text(t) => mysql::Value::Bytes(t.as_bytes().to_vec()),
        Value::Blob(b) => mysql::Value::Bytes(b.clone()),
    }
}

/// Converts a protocol value into a cell value.
///
/// Temporal values are rendered the way MySQL prints them in text results.
pub(crate) fn from_mysql(value: mysql::Value) -> Value {
    match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Blob(e.into_bytes()),
        },
        mysql::Value::Int(i) => Value::Integer(i),
        mysql::Value::UInt(u) => match i64::try_from(u) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Text(u.to_string()),
        },
        mysql::Value::Float(f) => Value::Real(f64::from(f)),
        mysql::Value::Double(f) => Value::Real(f),
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            Value::Text(format_datetime(year, month, day, hour, minute, second, micros))
        }
        mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = u32::from(hours) + days * 24;
            let sign = if negative { "-" } else { "" };
            let mut text = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::Text(text)
        }
    }
}

fn format_datetime(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8, micros: u32) -> String {
    let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
    let time = NaiveTime::from_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros);

    match (date, time) {
        (Some(date), Some(_)) if (hour, minute, second, micros) == (0, 0, 0, 0) => {
            date.format("%Y-%m-%d").to_string()
        }
        (Some(date), Some(time)) if micros == 0 => NaiveDateTime::new(date, time).format("%Y-%m-%d %H:%M:%S").to_string(),
        (Some(date), Some(time)) => NaiveDateTime::new(date, time).format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        // Zero dates are legal in MySQL but not in chrono
        _ => format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"),
    }
}

/// Converts bound parameters into protocol parameters.
pub(crate) fn to_params(params: &BoundParams) -> Params {
    match params {
        BoundParams::Positional(values) if values.is_empty() => Params::Empty,
        BoundParams::Positional(values) => Params::Positional(values.iter().map(to_mysql).collect()),
        BoundParams::Named(values) => Params::from(
            values
                .iter()
                .map(|(name, value)| (name.clone(), to_mysql(value)))
                .collect::<Vec<(String, mysql::Value)>>(),
        ),
    }
}

/// Driver for MySQL and MariaDB servers.
pub struct MysqlDriver {
    flavor: MysqlFlavor,
    options: DriverOptions,
    connection: Option<Conn>,
    dialect: Arc<MysqlDialect>,
}

impl MysqlDriver {
    /// Creates a driver; the server is contacted on first use.
    pub fn new(flavor: MysqlFlavor, options: &DriverOptions) -> Self {
        MysqlDriver {
            flavor,
            options: options.clone(),
            connection: None,
            dialect: Arc::new(MysqlDialect),
        }
    }

    pub fn flavor(&self) -> MysqlFlavor {
        self.flavor
    }

    fn connection(&mut self) -> Result<&mut Conn> {
        self.connect()?;
        self.connection
            .as_mut()
            .ok_or_else(|| DatabaseError::Connection("MySQL connection is not open".to_string()))
    }
}

impl DatabaseDriver for MysqlDriver {
    fn name(&self) -> &str {
        self.flavor.adapter_name()
    }

    fn server_type(&self) -> ServerType {
        ServerType::Mysql
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.dialect.clone()
    }

    fn prefix(&self) -> &str {
        &self.options.prefix
    }

    fn database(&self) -> &str {
        self.options.database.as_deref().unwrap_or_default()
    }

    fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        let host = self.options.host.clone().unwrap_or_else(|| "localhost".to_string());
        let builder = OptsBuilder::new()
            .ip_or_hostname(Some(host.clone()))
            .tcp_port(self.options.port.unwrap_or(3306))
            .user(self.options.user.clone())
            .pass(self.options.password.clone())
            .db_name(self.options.database.clone());

        let connection = Conn::new(builder).map_err(|e| DatabaseError::Connection(e.to_string()))?;
        info!("Connected to MySQL server {} as {}", host, self.flavor.adapter_name());
        self.connection = Some(connection);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connection.is_some()
    }

    fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            debug!("Closed MySQL connection");
        }
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn StatementInterface + '_>> {
        let sql = DatabaseDriver::replace_prefix(self, sql);
        let adapter = self.flavor.adapter_name();
        debug!("Preparing: {}", sql);

        let connection = self.connection()?;
        let statement = connection
            .prep(&sql)
            .map_err(|e| DatabaseError::execution(adapter, Some(&sql), e))?;

        Ok(Box::new(MysqlStatement {
            connection,
            statement,
            params: Params::Empty,
            sql,
            adapter,
        }))
    }

    fn table_columns(&mut self, table: &str) -> Result<IndexMap<String, Record>> {
        let sql = format!("SHOW FULL COLUMNS FROM {}", self.quote_name(table));
        let rows = self.load_object_list(&sql, &BoundParams::default())?;

        let mut columns = IndexMap::new();
        for row in rows {
            let name = row.get("Field").and_then(Value::as_text).map(|n| n.into_owned());
            if let Some(name) = name {
                columns.insert(name, row);
            }
        }
        Ok(columns)
    }

    fn table_keys(&mut self, table: &str) -> Result<Vec<Record>> {
        let sql = format!("SHOW KEYS FROM {}", self.quote_name(table));
        self.load_object_list(&sql, &BoundParams::default())
    }

    fn table_list(&mut self) -> Result<Vec<String>> {
        let rows = self.load_object_list("SHOW TABLES", &BoundParams::default())?;
        Ok(rows
            .iter()
            .filter_map(|row| row.values().next().and_then(Value::as_text).map(|n| n.into_owned()))
            .collect())
    }
}

struct MysqlStatement<'c> {
    connection: &'c mut Conn,
    statement: mysql::Statement,
    params: Params,
    sql: String,
    adapter: &'static str,
}

impl StatementInterface for MysqlStatement<'_> {
    fn bind(&mut self, params: &BoundParams) -> Result<()> {
        let expected = usize::from(self.statement.num_params());
        if params.len() != expected {
            return Err(DatabaseError::execution(
                self.adapter,
                Some(&self.sql),
                format!("statement expects {expected} parameters, {} bound", params.len()),
            ));
        }
        self.params = to_params(params);
        Ok(())
    }

    fn execute(&mut self) -> Result<u64> {
        self.connection
            .exec_drop(&self.statement, self.params.clone())
            .map_err(|e| DatabaseError::execution(self.adapter, Some(&self.sql), e))?;
        Ok(self.connection.affected_rows())
    }

    fn open_cursor(&mut self) -> Result<Box<dyn ResultCursor + '_>> {
        let result = self
            .connection
            .exec_iter(&self.statement, self.params.clone())
            .map_err(|e| DatabaseError::execution(self.adapter, Some(&self.sql), e))?;
        let columns = result
            .columns()
            .as_ref()
            .iter()
            .map(|column| column.name_str().into_owned())
            .collect();

        Ok(Box::new(MysqlCursor {
            result,
            columns,
            sql: &self.sql,
            adapter: self.adapter,
        }))
    }
}

struct MysqlCursor<'s> {
    result: QueryResult<'s, 's, 's, Binary>,
    columns: Vec<String>,
    sql: &'s str,
    adapter: &'static str,
}

impl ResultCursor for MysqlCursor<'_> {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<Option<Record>> {
        let mut row = match self.result.next() {
            Some(row) => row.map_err(|e| DatabaseError::execution(self.adapter, Some(self.sql), e))?,
            None => return Ok(None),
        };

        let mut record = Record::with_capacity(self.columns.len());
        for (index, name) in self.columns.iter().enumerate() {
            let value = row.take::<mysql::Value, _>(index).unwrap_or(mysql::Value::NULL);
            record.insert(name.clone(), from_mysql(value));
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_names() {
        let options = DriverOptions::default();
        assert_eq!(MysqlDriver::new(MysqlFlavor::Mysqli, &options).name(), "mysqli");
        assert_eq!(MysqlDriver::new(MysqlFlavor::Pdo, &options).name(), "mysql");
    }

    #[test]
    fn test_driver_is_lazy() {
        let options = DriverOptions {
            prefix: "jos_".to_string(),
            database: Some("joomla".to_string()),
            ..DriverOptions::default()
        };
        let driver = MysqlDriver::new(MysqlFlavor::Mysqli, &options);
        assert!(!driver.connected());
        assert_eq!(driver.prefix(), "jos_");
        assert_eq!(driver.database(), "joomla");
        assert_eq!(driver.replace_prefix("SELECT * FROM `#__test` WHERE a = '#__'"), "SELECT * FROM `jos_test` WHERE a = '#__'");
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(from_mysql(mysql::Value::NULL), Value::Null);
        assert_eq!(from_mysql(mysql::Value::Bytes(b"Row 1".to_vec())), Value::from("Row 1"));
        assert_eq!(from_mysql(mysql::Value::Bytes(vec![0xff, 0x00])), Value::Blob(vec![0xff, 0x00]));
        assert_eq!(from_mysql(mysql::Value::UInt(7)), Value::Integer(7));
        assert_eq!(from_mysql(mysql::Value::UInt(u64::MAX)), Value::from(u64::MAX.to_string()));
        assert_eq!(from_mysql(mysql::Value::Date(2021, 3, 4, 0, 0, 0, 0)), Value::from("2021-03-04"));
        assert_eq!(
            from_mysql(mysql::Value::Date(2021, 3, 4, 5, 6, 7, 0)),
            Value::from("2021-03-04 05:06:07")
        );
        assert_eq!(
            from_mysql(mysql::Value::Date(0, 0, 0, 0, 0, 0, 0)),
            Value::from("0000-00-00 00:00:00")
        );
        assert_eq!(from_mysql(mysql::Value::Time(true, 1, 2, 3, 4, 0)), Value::from("-26:03:04"));
    }

    #[test]
    fn test_params_conversion() {
        assert_eq!(to_params(&BoundParams::default()), Params::Empty);
        assert_eq!(
            to_params(&BoundParams::Positional(vec![Value::Integer(1), Value::Null])),
            Params::Positional(vec![mysql::Value::Int(1), mysql::Value::NULL])
        );
        assert_eq!(to_mysql(&Value::from("x")), mysql::Value::Bytes(b"x".to_vec()));
    }
}

/// # Test Utilities Module
///
/// Shared fixtures for unit tests:
/// - `record` builds an ordered record from literal pairs
/// - `VecCursor` replays canned rows through the cursor interface
/// - `MockDriver` serves canned metadata and rows and records every statement
///   it is asked to run, so exporter and importer behavior can be asserted
///   without a server
use crate::adapters::mysql::MysqlDialect;
use crate::adapters::sqlite::SqliteDialect;
use crate::core::db::driver::{DatabaseDriver, ResultCursor, ServerType, StatementInterface};
use crate::core::value::{BoundParams, Record, Value};
use crate::core::{DatabaseError, Result};
use crate::query::SqlDialect;
use indexmap::IndexMap;
use std::sync::Arc;

/// Builds a record from `(column, value)` pairs, keeping their order.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// A cursor over rows held in memory.
#[derive(Debug)]
pub struct VecCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Record>,
}

impl VecCursor {
    pub fn new(columns: &[&str], rows: Vec<Record>) -> Self {
        VecCursor {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows.into_iter(),
        }
    }
}

impl ResultCursor for VecCursor {
    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<Option<Record>> {
        Ok(self.rows.next())
    }
}

/// A statement as the mock driver saw it: SQL after prefix substitution and
/// the parameters bound to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: BoundParams,
}

/// Scripted driver for exporter and importer tests.
#[derive(Debug)]
pub struct MockDriver {
    pub server_type: ServerType,
    pub prefix: String,
    pub database: String,
    /// Column metadata per real table name
    pub columns: IndexMap<String, IndexMap<String, Record>>,
    /// Key metadata per real table name
    pub keys: IndexMap<String, Vec<Record>>,
    /// Rows returned by queries naming the (quoted) table
    pub rows: IndexMap<String, Vec<Record>>,
    pub tables: Vec<String>,
    /// Statements containing this text fail with an execution error
    pub fail_on: Option<String>,
    pub executed: Vec<ExecutedStatement>,
    connected: bool,
}

impl MockDriver {
    pub fn new(server_type: ServerType) -> Self {
        MockDriver {
            server_type,
            prefix: "jos_".to_string(),
            database: String::new(),
            columns: IndexMap::new(),
            keys: IndexMap::new(),
            rows: IndexMap::new(),
            tables: Vec::new(),
            fail_on: None,
            executed: Vec::new(),
            connected: false,
        }
    }

    /// The `jos_test` table with two columns, a primary key and two rows.
    pub fn mysql_jos_test() -> Self {
        let mut driver = MockDriver::new(ServerType::Mysql);
        let mut columns = IndexMap::new();
        columns.insert(
            "id".to_string(),
            record(&[
                ("Field", Value::from("id")),
                ("Type", Value::from("int(11) unsigned")),
                ("Collation", Value::Null),
                ("Null", Value::from("NO")),
                ("Key", Value::from("PRI")),
                ("Default", Value::from("")),
                ("Extra", Value::from("auto_increment")),
                ("Privileges", Value::from("select,insert,update,references")),
                ("Comment", Value::from("")),
            ]),
        );
        columns.insert(
            "title".to_string(),
            record(&[
                ("Field", Value::from("title")),
                ("Type", Value::from("varchar(255)")),
                ("Collation", Value::from("utf8_general_ci")),
                ("Null", Value::from("NO")),
                ("Key", Value::from("")),
                ("Default", Value::from("")),
                ("Extra", Value::from("")),
                ("Privileges", Value::from("select,insert,update,references")),
                ("Comment", Value::from("")),
            ]),
        );
        driver.columns.insert("jos_test".to_string(), columns);
        driver.keys.insert(
            "jos_test".to_string(),
            vec![record(&[
                ("Table", Value::from("jos_test")),
                ("Non_unique", Value::from("0")),
                ("Key_name", Value::from("PRIMARY")),
                ("Seq_in_index", Value::from("1")),
                ("Column_name", Value::from("id")),
                ("Collation", Value::from("A")),
                ("Cardinality", Value::from("2695")),
                ("Sub_part", Value::from("")),
                ("Packed", Value::from("")),
                ("Null", Value::from("")),
                ("Index_type", Value::from("BTREE")),
                ("Comment", Value::from("")),
            ])],
        );
        driver.rows.insert(
            "jos_test".to_string(),
            vec![
                record(&[("id", Value::Integer(1)), ("title", Value::from("Row 1"))]),
                record(&[("id", Value::Integer(2)), ("title", Value::from("Row 2"))]),
            ],
        );
        driver.tables.push("jos_test".to_string());
        driver
    }

    /// SQL of every statement run so far.
    pub fn executed_sql(&self) -> Vec<&str> {
        self.executed.iter().map(|s| s.sql.as_str()).collect()
    }
}

struct MockStatement<'d> {
    driver: &'d mut MockDriver,
    sql: String,
    params: BoundParams,
}

impl MockStatement<'_> {
    fn record(&mut self) -> Result<()> {
        self.driver.executed.push(ExecutedStatement {
            sql: self.sql.clone(),
            params: self.params.clone(),
        });
        match &self.driver.fail_on {
            Some(needle) if self.sql.contains(needle.as_str()) => Err(DatabaseError::execution(
                self.driver.name(),
                Some(&self.sql),
                "scripted failure",
            )),
            _ => Ok(()),
        }
    }
}

impl StatementInterface for MockStatement<'_> {
    fn bind(&mut self, params: &BoundParams) -> Result<()> {
        self.params = params.clone();
        Ok(())
    }

    fn execute(&mut self) -> Result<u64> {
        self.record()?;
        Ok(1)
    }

    fn open_cursor(&mut self) -> Result<Box<dyn ResultCursor + '_>> {
        self.record()?;
        let dialect = self.driver.dialect();
        let rows = self
            .driver
            .rows
            .iter()
            .find(|(table, _)| self.sql.contains(&dialect.quote_name(table, None)))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        let columns: Vec<String> = rows.first().map(|r| r.keys().cloned().collect()).unwrap_or_default();
        let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
        Ok(Box::new(VecCursor::new(&columns, rows)))
    }
}

impl DatabaseDriver for MockDriver {
    fn name(&self) -> &str {
        match self.server_type {
            ServerType::Mysql => "mysqli",
            ServerType::Sqlite => "sqlite",
        }
    }

    fn server_type(&self) -> ServerType {
        self.server_type
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        match self.server_type {
            ServerType::Mysql => Arc::new(MysqlDialect),
            ServerType::Sqlite => Arc::new(SqliteDialect),
        }
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn StatementInterface + '_>> {
        self.connect()?;
        let sql = self.replace_prefix(sql);
        Ok(Box::new(MockStatement {
            driver: self,
            sql,
            params: BoundParams::default(),
        }))
    }

    fn table_columns(&mut self, table: &str) -> Result<IndexMap<String, Record>> {
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }

    fn table_keys(&mut self, table: &str) -> Result<Vec<Record>> {
        Ok(self.keys.get(table).cloned().unwrap_or_default())
    }

    fn table_list(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.clone())
    }
}

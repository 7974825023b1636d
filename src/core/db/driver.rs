/// Driver Capability Contract
///
/// [`DatabaseDriver`] is the only surface the query builder, exporter,
/// importer and iterator depend on. Adapters implement the connection-bound
/// primitives; everything else is provided on top of them.
use crate::core::value::{BoundParams, Record};
use crate::core::Result;
use crate::query::{DatabaseQuery, SqlDialect};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Token replaced by the driver's table prefix when a statement is prepared.
pub const PREFIX_TOKEN: &str = "#__";

/// Database server family an adapter talks to.
///
/// Exporters and importers are built for one family and reject drivers of
/// another in their check phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerType {
    Mysql,
    Sqlite,
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Mysql => f.write_str("mysql"),
            ServerType::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// A forward-only cursor over one result set.
pub trait ResultCursor {
    /// Column names of the result set, in order.
    fn column_names(&self) -> &[String];

    /// Fetches the next row, or `None` once the result set is exhausted.
    fn fetch(&mut self) -> Result<Option<Record>>;
}

/// A prepared statement handle borrowed from a driver.
pub trait StatementInterface {
    /// Binds parameters, replacing any previously bound values.
    fn bind(&mut self, params: &BoundParams) -> Result<()>;

    /// Executes a statement that returns no rows and reports affected rows.
    fn execute(&mut self) -> Result<u64>;

    /// Executes the statement and opens a cursor over its result set.
    ///
    /// The cursor borrows the statement; dropping it releases the result set.
    fn open_cursor(&mut self) -> Result<Box<dyn ResultCursor + '_>>;
}

/// The capability set every adapter provides.
pub trait DatabaseDriver {
    /// Adapter name, e.g. `"mysqli"`; used in error messages
    fn name(&self) -> &str;

    fn server_type(&self) -> ServerType;

    fn dialect(&self) -> Arc<dyn SqlDialect>;

    /// Table prefix substituted for [`PREFIX_TOKEN`]
    fn prefix(&self) -> &str;

    /// Name of the currently selected database, possibly empty
    fn database(&self) -> &str;

    /// Opens the connection if it is not open yet.
    fn connect(&mut self) -> Result<()>;

    fn connected(&self) -> bool;

    fn disconnect(&mut self);

    /// Prepares `sql` after prefix substitution.
    fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn StatementInterface + '_>>;

    /// Column metadata keyed by column name, in native column order.
    fn table_columns(&mut self, table: &str) -> Result<IndexMap<String, Record>>;

    /// Key/index metadata records, in native index definition order.
    fn table_keys(&mut self, table: &str) -> Result<Vec<Record>>;

    /// Names of all tables in the current database.
    fn table_list(&mut self) -> Result<Vec<String>>;

    fn quote_name(&self, name: &str) -> String {
        self.dialect().quote_name(name, None)
    }

    /// String literal for `text`; pass `escape = false` for text that is
    /// already escaped.
    fn quote(&self, text: &str, escape: bool) -> String {
        self.dialect().quote(text, escape)
    }

    fn escape(&self, text: &str, extra: bool) -> String {
        self.dialect().escape(text, extra)
    }

    /// Creates an empty query bound to this driver's dialect.
    fn create_query(&self) -> DatabaseQuery {
        DatabaseQuery::new(self.dialect())
    }

    /// Substitutes the table prefix for [`PREFIX_TOKEN`] outside string literals.
    fn replace_prefix(&self, sql: &str) -> String {
        replace_prefix(sql, PREFIX_TOKEN, self.prefix(), self.dialect().literal_quotes())
    }

    /// Executes a statement that returns no rows.
    fn execute(&mut self, sql: &str, params: &BoundParams) -> Result<u64> {
        let mut statement = self.prepare_statement(sql)?;
        statement.bind(params)?;
        statement.execute()
    }

    /// Runs `sql` and collects every row.
    fn load_object_list(&mut self, sql: &str, params: &BoundParams) -> Result<Vec<Record>> {
        debug!("Loading rows for: {}", sql);
        let mut statement = self.prepare_statement(sql)?;
        statement.bind(params)?;
        let mut cursor = statement.open_cursor()?;

        let mut rows = Vec::new();
        while let Some(row) = cursor.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Renders and runs a query, collecting every row.
    fn load_query(&mut self, query: &DatabaseQuery) -> Result<Vec<Record>> {
        let sql = query.render()?;
        self.load_object_list(&sql, query.bounded())
    }

    /// Renders and executes a query that returns no rows.
    fn execute_query(&mut self, query: &DatabaseQuery) -> Result<u64> {
        let sql = query.render()?;
        self.execute(&sql, query.bounded())
    }
}

/// Replaces `token` with `prefix` everywhere except inside string literals
/// delimited by one of `literal_quotes`.
///
/// Inside a literal, a backslash escapes the next character and a doubled
/// quote is treated as an escaped quote.
pub fn replace_prefix(sql: &str, token: &str, prefix: &str, literal_quotes: &[char]) -> String {
    if token.is_empty() {
        return sql.to_string();
    }

    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while !rest.is_empty() {
        let next_quote = rest.find(|c| literal_quotes.contains(&c));
        let (plain, tail) = match next_quote {
            Some(pos) => rest.split_at(pos),
            None => (rest, ""),
        };
        out.push_str(&plain.replace(token, prefix));

        if tail.is_empty() {
            break;
        }

        let mut chars = tail.char_indices();
        let (_, quote) = match chars.next() {
            Some(first) => first,
            None => break,
        };
        let mut end = tail.len();
        let mut escaped = false;
        let mut iter = chars.peekable();
        while let Some((pos, c)) = iter.next() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                if matches!(iter.peek(), Some((_, next)) if *next == quote) {
                    iter.next();
                } else {
                    end = pos + c.len_utf8();
                    break;
                }
            }
        }

        out.push_str(&tail[..end]);
        rest = &tail[end..];
    }

    out
}

/// Query Builder Module
///
/// [`DatabaseQuery`] assembles one SQL statement from dialect-neutral clause
/// calls and renders it through the [`SqlDialect`] it was created with.
///
/// ## Statement types
///
/// A fresh query has the `Unknown` type. SELECT-family clauses (`select`,
/// `from`, `where_`, `join`, `group`, `having`, `order`, `limit`) promote it to
/// `Select`; `insert`, `update` and `delete` set their own type. A clause that
/// does not belong to the active type fails immediately with
/// [`DatabaseError::QueryState`].
///
/// ## Rendering
///
/// [`DatabaseQuery::render`] is pure: it never mutates the builder, so two
/// renders without intervening mutation are byte-identical. Cross-clause
/// consistency (an INSERT's column and value counts) is only checked there.
pub mod dialect;
pub mod element;

pub use dialect::{SqlDialect, StructureShape};
pub use element::QueryElement;

use crate::core::value::{BoundParams, Value};
use crate::core::{DatabaseError, Result};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// The statement a query is building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// No statement-defining call made yet; renders as an empty string
    Unknown,
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementType::Unknown => "UNKNOWN",
            StatementType::Select => "SELECT",
            StatementType::Insert => "INSERT",
            StatementType::Update => "UPDATE",
            StatementType::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Boolean glue between conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Glue {
    #[default]
    And,
    Or,
}

impl Glue {
    fn padded(self) -> &'static str {
        match self {
            Glue::And => " AND ",
            Glue::Or => " OR ",
        }
    }
}

/// Join flavors accepted by [`DatabaseQuery::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Outer,
    Cross,
}

impl JoinType {
    fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Outer => "OUTER JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// Clause selector for [`DatabaseQuery::clear_clause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clause {
    Select,
    From,
    Join,
    Where,
    Group,
    Having,
    Order,
    Limit,
    Insert,
    Columns,
    Values,
    Update,
    Set,
    Delete,
    Bindings,
}

const SELECT_ONLY: &[StatementType] = &[StatementType::Select];
const FILTERABLE: &[StatementType] = &[
    StatementType::Select,
    StatementType::Update,
    StatementType::Delete,
];
const JOINABLE: &[StatementType] = &[StatementType::Select, StatementType::Update];
const FROM_CAPABLE: &[StatementType] = &[StatementType::Select, StatementType::Delete];

/// One SQL statement under construction.
#[derive(Debug, Clone)]
pub struct DatabaseQuery {
    dialect: Arc<dyn SqlDialect>,
    statement_type: StatementType,
    select: Option<QueryElement>,
    from: Option<QueryElement>,
    joins: Vec<QueryElement>,
    where_: Option<QueryElement>,
    group: Option<QueryElement>,
    having: Option<QueryElement>,
    order: Option<QueryElement>,
    limit: u64,
    offset: u64,
    insert: Option<QueryElement>,
    columns: Option<QueryElement>,
    values: Vec<QueryElement>,
    update: Option<QueryElement>,
    set: Option<QueryElement>,
    bounded: BoundParams,
}

impl DatabaseQuery {
    /// Creates an empty query rendering through `dialect`.
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        DatabaseQuery {
            dialect,
            statement_type: StatementType::Unknown,
            select: None,
            from: None,
            joins: Vec::new(),
            where_: None,
            group: None,
            having: None,
            order: None,
            limit: 0,
            offset: 0,
            insert: None,
            columns: None,
            values: Vec::new(),
            update: None,
            set: None,
            bounded: BoundParams::default(),
        }
    }

    pub fn dialect(&self) -> &Arc<dyn SqlDialect> {
        &self.dialect
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Parameters bound so far, in placeholder order.
    pub fn bounded(&self) -> &BoundParams {
        &self.bounded
    }

    /// Checks that `clause` fits the active statement type, promoting an
    /// `Unknown` query to `Select` when the clause belongs to SELECT.
    fn enter(&mut self, clause: &str, allowed: &[StatementType]) -> Result<()> {
        if allowed.contains(&self.statement_type) {
            return Ok(());
        }

        if self.statement_type == StatementType::Unknown && allowed.contains(&StatementType::Select) {
            self.statement_type = StatementType::Select;
            return Ok(());
        }

        Err(DatabaseError::QueryState(format!(
            "{clause} cannot be used in a {} statement",
            self.statement_type
        )))
    }

    /// Switches to a statement type set by a statement-defining call.
    fn define(&mut self, clause: &str, statement_type: StatementType) -> Result<()> {
        match self.statement_type {
            StatementType::Unknown => {
                self.statement_type = statement_type;
                Ok(())
            }
            current if current == statement_type => Ok(()),
            current => Err(DatabaseError::QueryState(format!(
                "{clause} cannot be used in a {current} statement"
            ))),
        }
    }

    fn accumulate<I, S>(slot: &mut Option<QueryElement>, name: &str, items: I, glue: &str)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match slot {
            Some(element) => element.append(items),
            None => *slot = Some(QueryElement::new(name, items, glue)),
        }
    }

    /// Adds columns to the SELECT list.
    pub fn select<I, S>(&mut self, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("SELECT", SELECT_ONLY)?;
        Self::accumulate(&mut self.select, "SELECT", columns, ", ");
        Ok(self)
    }

    /// Adds tables to the FROM list.
    pub fn from<I, S>(&mut self, tables: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("FROM", FROM_CAPABLE)?;
        Self::accumulate(&mut self.from, "FROM", tables, ", ");
        Ok(self)
    }

    /// Adds AND-glued WHERE conditions.
    pub fn where_<I, S>(&mut self, conditions: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.where_with(conditions, Glue::And)
    }

    /// Adds WHERE conditions.
    ///
    /// The glue only applies when the clause is created; later calls append
    /// using the original glue. Use [`DatabaseQuery::extend_where`] to mix.
    pub fn where_with<I, S>(&mut self, conditions: I, glue: Glue) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("WHERE", FILTERABLE)?;
        Self::accumulate(&mut self.where_, "WHERE", conditions, glue.padded());
        Ok(self)
    }

    /// Wraps the existing WHERE clause and a new condition group:
    /// `(existing) OUTER (c1 INNER c2)`.
    pub fn extend_where<I, S>(&mut self, outer: Glue, conditions: I, inner: Glue) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("WHERE", FILTERABLE)?;
        let group: Vec<String> = conditions.into_iter().map(Into::into).collect();
        let group = format!("({})", group.join(inner.padded()));

        self.where_ = Some(match self.where_.take() {
            Some(existing) => QueryElement::new("WHERE", [format!("({})", existing.body()), group], outer.padded()),
            None => QueryElement::new("WHERE", [group], outer.padded()),
        });
        Ok(self)
    }

    /// Adds a JOIN clause. Each call adds its own join, in call order.
    pub fn join(&mut self, join_type: JoinType, table: &str, condition: Option<&str>) -> Result<&mut Self> {
        self.enter("JOIN", JOINABLE)?;
        let target = match condition {
            Some(condition) => format!("{table} ON {condition}"),
            None => table.to_string(),
        };
        self.joins.push(QueryElement::new(join_type.keyword(), [target], ""));
        Ok(self)
    }

    pub fn inner_join(&mut self, table: &str, condition: &str) -> Result<&mut Self> {
        self.join(JoinType::Inner, table, Some(condition))
    }

    pub fn left_join(&mut self, table: &str, condition: &str) -> Result<&mut Self> {
        self.join(JoinType::Left, table, Some(condition))
    }

    pub fn group<I, S>(&mut self, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("GROUP BY", SELECT_ONLY)?;
        Self::accumulate(&mut self.group, "GROUP BY", columns, ", ");
        Ok(self)
    }

    pub fn having<I, S>(&mut self, conditions: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.having_with(conditions, Glue::And)
    }

    pub fn having_with<I, S>(&mut self, conditions: I, glue: Glue) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("HAVING", SELECT_ONLY)?;
        Self::accumulate(&mut self.having, "HAVING", conditions, glue.padded());
        Ok(self)
    }

    pub fn order<I, S>(&mut self, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("ORDER BY", SELECT_ONLY)?;
        Self::accumulate(&mut self.order, "ORDER BY", columns, ", ");
        Ok(self)
    }

    /// Records a row limit and offset; the syntax is chosen by the dialect at render time.
    pub fn limit(&mut self, limit: u64, offset: u64) -> Result<&mut Self> {
        self.enter("LIMIT", SELECT_ONLY)?;
        self.limit = limit;
        self.offset = offset;
        Ok(self)
    }

    /// Starts an INSERT into `table`.
    pub fn insert(&mut self, table: &str) -> Result<&mut Self> {
        self.define("INSERT", StatementType::Insert)?;
        self.insert = Some(QueryElement::new("INSERT INTO", [table], ""));
        Ok(self)
    }

    pub fn columns<I, S>(&mut self, columns: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("COLUMNS", &[StatementType::Insert])?;
        Self::accumulate(&mut self.columns, "", columns, ", ");
        Ok(self)
    }

    /// Adds one row of value expressions to an INSERT.
    pub fn values<I, S>(&mut self, row: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("VALUES", &[StatementType::Insert])?;
        self.values.push(QueryElement::new("", row, ", "));
        Ok(self)
    }

    /// Binds every value positionally and adds the placeholders as one INSERT row.
    pub fn bind_row(&mut self, row: Vec<Value>) -> Result<&mut Self> {
        self.enter("VALUES", &[StatementType::Insert])?;
        let placeholders = row
            .into_iter()
            .map(|value| self.bind_value(value))
            .collect::<Result<Vec<_>>>()?;
        self.values.push(QueryElement::new("", placeholders, ", "));
        Ok(self)
    }

    /// Starts an UPDATE of `table`.
    pub fn update(&mut self, table: &str) -> Result<&mut Self> {
        self.define("UPDATE", StatementType::Update)?;
        self.update = Some(QueryElement::new("UPDATE", [table], ""));
        Ok(self)
    }

    /// Adds `column = expression` assignments to an UPDATE.
    pub fn set<I, S>(&mut self, assignments: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enter("SET", &[StatementType::Update])?;
        Self::accumulate(&mut self.set, "SET", assignments, ", ");
        Ok(self)
    }

    /// Starts a DELETE, optionally naming the table (otherwise use `from`).
    pub fn delete(&mut self, table: Option<&str>) -> Result<&mut Self> {
        self.define("DELETE", StatementType::Delete)?;
        if let Some(table) = table {
            Self::accumulate(&mut self.from, "FROM", [table], ", ");
        }
        Ok(self)
    }

    /// Binds a positional parameter and returns its placeholder.
    pub fn bind_value(&mut self, value: Value) -> Result<String> {
        match &mut self.bounded {
            BoundParams::Positional(values) => {
                values.push(value);
                Ok("?".to_string())
            }
            BoundParams::Named(_) => Err(DatabaseError::QueryState(
                "positional parameters cannot be mixed with named parameters".to_string(),
            )),
        }
    }

    /// Binds a named parameter and returns its `:name` placeholder.
    ///
    /// Binding the same name twice replaces the earlier value.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<String> {
        let key = name.trim_start_matches(':').to_string();
        if key.is_empty() {
            return Err(DatabaseError::QueryState("parameter name cannot be empty".to_string()));
        }

        if let BoundParams::Positional(values) = &self.bounded {
            if !values.is_empty() {
                return Err(DatabaseError::QueryState(
                    "named parameters cannot be mixed with positional parameters".to_string(),
                ));
            }
            self.bounded = BoundParams::Named(IndexMap::new());
        }

        if let BoundParams::Named(values) = &mut self.bounded {
            values.insert(key.clone(), value);
        }
        Ok(format!(":{key}"))
    }

    /// Resets the query to the `Unknown` state.
    pub fn clear(&mut self) -> &mut Self {
        let dialect = Arc::clone(&self.dialect);
        *self = DatabaseQuery::new(dialect);
        self
    }

    /// Resets one clause. Clearing the clause that defined the statement type
    /// returns the query to `Unknown` when nothing else is left.
    pub fn clear_clause(&mut self, clause: Clause) -> &mut Self {
        match clause {
            Clause::Select => self.select = None,
            Clause::From => self.from = None,
            Clause::Join => self.joins.clear(),
            Clause::Where => self.where_ = None,
            Clause::Group => self.group = None,
            Clause::Having => self.having = None,
            Clause::Order => self.order = None,
            Clause::Limit => {
                self.limit = 0;
                self.offset = 0;
            }
            Clause::Insert => self.insert = None,
            Clause::Columns => self.columns = None,
            Clause::Values => self.values.clear(),
            Clause::Update => self.update = None,
            Clause::Set => self.set = None,
            Clause::Delete => {}
            Clause::Bindings => self.bounded = BoundParams::default(),
        }

        if clause == Clause::Delete && self.statement_type == StatementType::Delete {
            self.from = None;
            self.where_ = None;
            self.statement_type = StatementType::Unknown;
        }

        if self.is_blank() {
            self.statement_type = StatementType::Unknown;
        }
        self
    }

    fn is_blank(&self) -> bool {
        self.select.is_none()
            && self.from.is_none()
            && self.joins.is_empty()
            && self.where_.is_none()
            && self.group.is_none()
            && self.having.is_none()
            && self.order.is_none()
            && self.limit == 0
            && self.offset == 0
            && self.insert.is_none()
            && self.columns.is_none()
            && self.values.is_empty()
            && self.update.is_none()
            && self.set.is_none()
            && self.statement_type != StatementType::Delete
    }

    pub fn quote_name(&self, name: &str, alias: Option<&str>) -> String {
        self.dialect.quote_name(name, alias)
    }

    pub fn quote(&self, text: &str, escape: bool) -> String {
        self.dialect.quote(text, escape)
    }

    pub fn escape(&self, text: &str, extra: bool) -> String {
        self.dialect.escape(text, extra)
    }

    pub fn group_concat(&self, expression: &str, separator: &str) -> String {
        self.dialect.group_concat(expression, separator)
    }

    pub fn concatenate(&self, values: &[String], separator: Option<&str>) -> String {
        self.dialect.concatenate(values, separator)
    }

    pub fn char_length(&self, field: &str) -> String {
        self.dialect.char_length(field)
    }

    /// Renders the statement.
    ///
    /// Clauses are emitted in SQL grammar order, one per line, and empty
    /// clauses are omitted. An `Unknown` query renders as an empty string.
    pub fn render(&self) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        let push = |parts: &mut Vec<String>, element: &Option<QueryElement>| {
            if let Some(element) = element.as_ref().filter(|e| !e.is_empty()) {
                parts.push(element.to_string());
            }
        };

        match self.statement_type {
            StatementType::Unknown => return Ok(String::new()),
            StatementType::Select => {
                if self.select.as_ref().map_or(true, QueryElement::is_empty) {
                    return Err(DatabaseError::QueryState("SELECT statement has no columns".to_string()));
                }
                push(&mut parts, &self.select);
                push(&mut parts, &self.from);
                parts.extend(self.joins.iter().map(ToString::to_string));
                push(&mut parts, &self.where_);
                push(&mut parts, &self.group);
                push(&mut parts, &self.having);
                push(&mut parts, &self.order);

                let sql = parts.join("\n");
                if self.limit > 0 || self.offset > 0 {
                    return Ok(self.dialect.process_limit(sql, self.limit, self.offset));
                }
                return Ok(sql);
            }
            StatementType::Insert => {
                let target = self
                    .insert
                    .as_ref()
                    .ok_or_else(|| DatabaseError::QueryState("INSERT statement has no table".to_string()))?;
                let columns = self
                    .columns
                    .as_ref()
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| DatabaseError::QueryState("INSERT statement has no columns".to_string()))?;
                if self.values.is_empty() {
                    return Err(DatabaseError::QueryState("INSERT statement has no values".to_string()));
                }
                let expected = columns.elements().len();
                for row in &self.values {
                    if row.elements().len() != expected {
                        return Err(DatabaseError::QueryState(format!(
                            "INSERT column count ({expected}) does not match value count ({})",
                            row.elements().len()
                        )));
                    }
                }

                parts.push(format!("{target} ({columns})"));
                let rows = self
                    .values
                    .iter()
                    .map(|row| format!("({row})"))
                    .collect::<Vec<_>>()
                    .join(",\n");
                parts.push(format!("VALUES {rows}"));
            }
            StatementType::Update => {
                let target = self
                    .update
                    .as_ref()
                    .ok_or_else(|| DatabaseError::QueryState("UPDATE statement has no table".to_string()))?;
                if self.set.as_ref().map_or(true, QueryElement::is_empty) {
                    return Err(DatabaseError::QueryState("UPDATE statement has no SET clause".to_string()));
                }
                parts.push(target.to_string());
                parts.extend(self.joins.iter().map(ToString::to_string));
                push(&mut parts, &self.set);
                push(&mut parts, &self.where_);
            }
            StatementType::Delete => {
                if self.from.as_ref().map_or(true, QueryElement::is_empty) {
                    return Err(DatabaseError::QueryState("DELETE statement has no table".to_string()));
                }
                parts.push("DELETE".to_string());
                push(&mut parts, &self.from);
                push(&mut parts, &self.where_);
            }
        }

        Ok(parts.join("\n"))
    }
}

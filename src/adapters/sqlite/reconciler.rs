use crate::core::value::Record;
use crate::core::{DatabaseError, Result};
use crate::diff::{attr, attr_differs, group_keys, KeyDefinition, StructureReconciler};
use crate::dump::TableStructure;
use crate::query::SqlDialect;

/// Index created by `CREATE INDEX`; the other origins are table constraints
const ORIGIN_INDEX: &str = "c";
const ORIGIN_UNIQUE: &str = "u";
const ORIGIN_PRIMARY: &str = "pk";

/// DDL for SQLite, built from `table_info` / `index_list` attributes.
///
/// SQLite cannot alter an existing column or attach constraints to an
/// existing table; those differences are reported as reconciliation errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteReconciler;

impl SqliteReconciler {
    fn column_sql(&self, dialect: &dyn SqlDialect, table: &str, field: &Record) -> Result<String> {
        let name = attr(field, "name")
            .ok_or_else(|| DatabaseError::reconciliation(table, None, "field without a name attribute"))?;

        let mut sql = dialect.quote_name(&name, None);
        if let Some(column_type) = attr(field, "type").filter(|t| !t.is_empty()) {
            sql.push(' ');
            sql.push_str(&column_type);
        }
        if attr(field, "notnull").as_deref() == Some("1") {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = attr(field, "dflt_value") {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        Ok(sql)
    }

    fn column_list(&self, dialect: &dyn SqlDialect, key: &KeyDefinition) -> String {
        key.column_values("column")
            .iter()
            .map(|column| dialect.quote_name(column, None))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn index_sql(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> String {
        let unique = if key.attr("unique").as_deref() == Some("1") {
            "UNIQUE "
        } else {
            ""
        };
        format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            dialect.quote_name(&key.name, None),
            dialect.quote_name(table, None),
            self.column_list(dialect, key)
        )
    }
}

fn pk_position(field: &Record) -> u32 {
    attr(field, "pk").and_then(|pk| pk.parse().ok()).unwrap_or(0)
}

/// Autoindexes are numbered in constraint declaration order.
fn autoindex_number(name: &str) -> usize {
    name.rsplit('_').next().and_then(|n| n.parse().ok()).unwrap_or(usize::MAX)
}

impl StructureReconciler for SqliteReconciler {
    fn create_table(&self, dialect: &dyn SqlDialect, table: &TableStructure) -> Result<Vec<String>> {
        if table.fields.is_empty() {
            return Err(DatabaseError::reconciliation(&table.name, None, "no columns declared"));
        }

        let mut definitions = table
            .fields
            .iter()
            .map(|field| self.column_sql(dialect, &table.name, field))
            .collect::<Result<Vec<_>>>()?;

        let keys = group_keys(&table.keys, "name");

        // Constraints are emitted in autoindex order so a recreated table
        // numbers its autoindexes the way the dumped one did.
        let mut constraints: Vec<(usize, String)> = Vec::new();

        let mut primary: Vec<&Record> = table.fields.iter().filter(|f| pk_position(f) > 0).collect();
        primary.sort_by_key(|f| pk_position(f));
        if !primary.is_empty() {
            let columns = primary
                .iter()
                .filter_map(|f| attr(f, "name"))
                .map(|name| dialect.quote_name(&name, None))
                .collect::<Vec<_>>()
                .join(", ");
            let position = keys
                .iter()
                .find(|key| key.attr("origin").as_deref() == Some(ORIGIN_PRIMARY))
                .map_or(0, |key| autoindex_number(&key.name));
            constraints.push((position, format!("PRIMARY KEY ({columns})")));
        }

        for key in keys
            .iter()
            .filter(|key| key.attr("origin").as_deref() == Some(ORIGIN_UNIQUE))
        {
            constraints.push((
                autoindex_number(&key.name),
                format!("UNIQUE ({})", self.column_list(dialect, key)),
            ));
        }
        constraints.sort_by_key(|(position, _)| *position);
        definitions.extend(constraints.into_iter().map(|(_, sql)| sql));

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            dialect.quote_name(&table.name, None),
            definitions.join(",\n  ")
        )];
        statements.extend(
            keys.iter()
                .filter(|key| key.attr("origin").as_deref() == Some(ORIGIN_INDEX))
                .map(|key| self.index_sql(dialect, &table.name, key)),
        );
        Ok(statements)
    }

    fn column_changed(&self, declared: &Record, live: &Record) -> bool {
        let declared_type = attr(declared, "type").unwrap_or_default();
        let live_type = attr(live, "type").unwrap_or_default();
        !declared_type.eq_ignore_ascii_case(&live_type)
            || ["notnull", "dflt_value", "pk"]
                .iter()
                .any(|name| attr_differs(declared, live, name))
    }

    /// SQLite names constraint indexes itself (`sqlite_autoindex_<table>_N`),
    /// so those are identified by what they constrain.
    fn key_identity(&self, key: &KeyDefinition) -> String {
        match key.attr("origin").as_deref() {
            Some(ORIGIN_INDEX) | None => key.name.clone(),
            Some(origin) => format!("{origin}({})", key.column_values("column").join(",")),
        }
    }

    fn key_changed(&self, declared: &KeyDefinition, live: &KeyDefinition) -> bool {
        attr_differs(&declared.parts[0], &live.parts[0], "unique")
            || attr_differs(&declared.parts[0], &live.parts[0], "origin")
            || declared.column_values("column") != live.column_values("column")
    }

    fn add_column(&self, dialect: &dyn SqlDialect, table: &str, field: &Record) -> Result<String> {
        if pk_position(field) > 0 {
            let name = attr(field, "name").unwrap_or_default();
            return Err(DatabaseError::reconciliation(
                table,
                Some(name.as_ref()),
                "SQLite cannot add a primary key column to an existing table",
            ));
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            dialect.quote_name(table, None),
            self.column_sql(dialect, table, field)?
        ))
    }

    fn change_column(&self, _dialect: &dyn SqlDialect, table: &str, field: &Record, live: &Record) -> Result<String> {
        let name = attr(field, "name").unwrap_or_default();
        Err(DatabaseError::reconciliation(
            table,
            Some(name.as_ref()),
            format!(
                "SQLite cannot change an existing column (declared {}, found {})",
                attr(field, "type").unwrap_or_default(),
                attr(live, "type").unwrap_or_default()
            ),
        ))
    }

    fn drop_column(&self, dialect: &dyn SqlDialect, table: &str, column: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            dialect.quote_name(table, None),
            dialect.quote_name(column, None)
        ))
    }

    fn add_key(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> Result<String> {
        if key.attr("origin").as_deref() != Some(ORIGIN_INDEX) {
            return Err(DatabaseError::reconciliation(
                table,
                None,
                format!("constraint {} can only be created together with the table", key.name),
            ));
        }
        Ok(self.index_sql(dialect, table, key))
    }

    fn drop_key(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> Result<String> {
        if key.attr("origin").as_deref() != Some(ORIGIN_INDEX) {
            return Err(DatabaseError::reconciliation(
                table,
                None,
                format!("constraint {} cannot be dropped from an existing table", key.name),
            ));
        }
        Ok(format!("DROP INDEX {}", dialect.quote_name(&key.name, None)))
    }
}

use crate::core::value::Record;
use crate::core::{DatabaseError, Result};
use crate::diff::{attr, attr_differs, group_keys, KeyDefinition, StructureReconciler};
use crate::dump::TableStructure;
use crate::query::SqlDialect;
use once_cell::sync::Lazy;
use regex::Regex;

/// Column types that cannot carry a literal default.
const NO_DEFAULT_TYPES: &[&str] = &[
    "blob",
    "tinyblob",
    "mediumblob",
    "longblob",
    "text",
    "tinytext",
    "mediumtext",
    "longtext",
    "json",
    "geometry",
];

/// Integer display widths, which MySQL 8.0.19+ no longer reports.
static INTEGER_WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(tinyint|smallint|mediumint|int|integer|bigint)\(\d+\)").expect("valid integer width pattern")
});

/// DDL for MySQL, built from `SHOW FULL COLUMNS` / `SHOW KEYS` attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlReconciler;

impl MysqlReconciler {
    fn column_sql(&self, dialect: &dyn SqlDialect, table: &str, field: &Record) -> Result<String> {
        let name = attr(field, "Field")
            .ok_or_else(|| DatabaseError::reconciliation(table, None, "field without a Field attribute"))?;
        let column_type = attr(field, "Type")
            .ok_or_else(|| DatabaseError::reconciliation(table, Some(name.as_ref()), "field without a Type attribute"))?;
        let nullable = attr(field, "Null").as_deref() != Some("NO");
        let default = attr(field, "Default");
        let extra = attr(field, "Extra").map(|e| clean_extra(&e)).unwrap_or_default();

        let base_type = column_type.split('(').next().unwrap_or_default().trim().to_lowercase();
        let takes_default = !NO_DEFAULT_TYPES.contains(&base_type.as_str())
            && !extra.to_lowercase().contains("auto_increment");

        let mut sql = format!("{} {}", dialect.quote_name(&name, None), column_type);
        match (nullable, default) {
            (false, Some(default)) if takes_default => {
                sql.push_str(&format!(" NOT NULL DEFAULT {}", default_literal(dialect, &default)));
            }
            (false, _) => sql.push_str(" NOT NULL"),
            (true, Some(default)) if takes_default => {
                sql.push_str(&format!(" DEFAULT {}", default_literal(dialect, &default)));
            }
            (true, _) => sql.push_str(" DEFAULT NULL"),
        }

        if !extra.is_empty() {
            sql.push(' ');
            sql.push_str(&extra.to_uppercase());
        }
        Ok(sql)
    }

    fn key_sql(&self, dialect: &dyn SqlDialect, key: &KeyDefinition) -> String {
        let kind = if key.name == "PRIMARY" {
            "PRIMARY KEY".to_string()
        } else if key.attr("Index_type").as_deref() == Some("FULLTEXT") {
            format!("FULLTEXT KEY {}", dialect.quote_name(&key.name, None))
        } else if key.attr("Non_unique").as_deref() == Some("0") {
            format!("UNIQUE KEY {}", dialect.quote_name(&key.name, None))
        } else {
            format!("KEY {}", dialect.quote_name(&key.name, None))
        };

        let columns = key
            .parts
            .iter()
            .filter_map(|part| {
                let column = attr(part, "Column_name")?;
                let length = attr(part, "Sub_part")
                    .filter(|length| !length.is_empty())
                    .map(|length| format!("({length})"))
                    .unwrap_or_default();
                Some(format!("{}{}", dialect.quote_name(&column, None), length))
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!("{kind} ({columns})")
    }
}

/// Removes `Extra` tokens that describe server state rather than DDL.
fn clean_extra(extra: &str) -> String {
    extra
        .split_whitespace()
        .filter(|token| !token.eq_ignore_ascii_case("DEFAULT_GENERATED"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column type as compared between dump and server.
fn comparable_type(column_type: &str) -> String {
    INTEGER_WIDTH.replace(column_type.trim(), "$1").to_lowercase()
}

fn default_literal(dialect: &dyn SqlDialect, default: &str) -> String {
    let upper = default.to_uppercase();
    if upper.starts_with("CURRENT_TIMESTAMP") || upper == "NULL" {
        default.to_string()
    } else {
        dialect.quote(default, true)
    }
}

impl StructureReconciler for MysqlReconciler {
    fn create_table(&self, dialect: &dyn SqlDialect, table: &TableStructure) -> Result<Vec<String>> {
        if table.fields.is_empty() {
            return Err(DatabaseError::reconciliation(&table.name, None, "no columns declared"));
        }

        let mut definitions = table
            .fields
            .iter()
            .map(|field| self.column_sql(dialect, &table.name, field))
            .collect::<Result<Vec<_>>>()?;
        definitions.extend(
            group_keys(&table.keys, "Key_name")
                .iter()
                .map(|key| self.key_sql(dialect, key)),
        );

        Ok(vec![format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            dialect.quote_name(&table.name, None),
            definitions.join(",\n  ")
        )])
    }

    fn column_changed(&self, declared: &Record, live: &Record) -> bool {
        let declared_type = attr(declared, "Type").map(|t| comparable_type(&t));
        let live_type = attr(live, "Type").map(|t| comparable_type(&t));
        declared_type != live_type
            || ["Null", "Default"]
                .iter()
                .any(|name| attr_differs(declared, live, name))
            || clean_extra(&attr(declared, "Extra").unwrap_or_default())
                != clean_extra(&attr(live, "Extra").unwrap_or_default())
    }

    fn key_changed(&self, declared: &KeyDefinition, live: &KeyDefinition) -> bool {
        declared.parts.len() != live.parts.len()
            || declared.parts.iter().zip(&live.parts).any(|(d, l)| {
                ["Non_unique", "Column_name", "Seq_in_index", "Sub_part", "Index_type"]
                    .iter()
                    .any(|name| attr_differs(d, l, name))
            })
    }

    fn add_column(&self, dialect: &dyn SqlDialect, table: &str, field: &Record) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            dialect.quote_name(table, None),
            self.column_sql(dialect, table, field)?
        ))
    }

    fn change_column(&self, dialect: &dyn SqlDialect, table: &str, field: &Record, _live: &Record) -> Result<String> {
        let name = attr(field, "Field").unwrap_or_default();
        Ok(format!(
            "ALTER TABLE {} CHANGE COLUMN {} {}",
            dialect.quote_name(table, None),
            dialect.quote_name(&name, None),
            self.column_sql(dialect, table, field)?
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
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            dialect.quote_name(table, None),
            self.key_sql(dialect, key)
        ))
    }

    fn drop_key(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> Result<String> {
        let target = if key.name == "PRIMARY" {
            "PRIMARY KEY".to_string()
        } else {
            format!("KEY {}", dialect.quote_name(&key.name, None))
        };
        Ok(format!("ALTER TABLE {} DROP {}", dialect.quote_name(table, None), target))
    }
}

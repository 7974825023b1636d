use crate::query::{SqlDialect, StructureShape};

static SQLITE_SHAPE: StructureShape = StructureShape {
    field_attributes: &["name", "type", "notnull", "dflt_value", "pk"],
    key_attributes: &["table", "name", "unique", "origin", "seqno", "column"],
    field_name: "name",
    key_name: "name",
    key_table: Some("table"),
};

/// SQLite syntax: double-quoted identifiers, `LIMIT n OFFSET m`, `||` concatenation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn name_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    fn literal_quotes(&self) -> &'static [char] {
        &['\'']
    }

    fn escape(&self, text: &str, extra: bool) -> String {
        let escaped = text.replace('\'', "''");
        if extra {
            escaped.replace('%', "\\%").replace('_', "\\_")
        } else {
            escaped
        }
    }

    fn process_limit(&self, sql: String, limit: u64, offset: u64) -> String {
        match (limit, offset) {
            (0, 0) => sql,
            (0, offset) => format!("{sql} LIMIT -1 OFFSET {offset}"),
            (limit, 0) => format!("{sql} LIMIT {limit}"),
            (limit, offset) => format!("{sql} LIMIT {limit} OFFSET {offset}"),
        }
    }

    fn group_concat(&self, expression: &str, separator: &str) -> String {
        format!("group_concat({expression}, {})", self.quote(separator, true))
    }

    fn concatenate(&self, values: &[String], separator: Option<&str>) -> String {
        match separator {
            Some(separator) => {
                let glue = format!(" || {} || ", self.quote(separator, true));
                values.join(&glue)
            }
            None => values.join(" || "),
        }
    }

    fn char_length(&self, field: &str) -> String {
        format!("length({field})")
    }

    fn structure_shape(&self) -> &'static StructureShape {
        &SQLITE_SHAPE
    }
}

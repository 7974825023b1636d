use crate::query::{SqlDialect, StructureShape};

/// Largest row count MySQL accepts in `LIMIT offset, count`
const MAX_ROWS: u64 = 18_446_744_073_709_551_615;

static MYSQL_SHAPE: StructureShape = StructureShape {
    field_attributes: &["Field", "Type", "Null", "Key", "Default", "Extra"],
    key_attributes: &[
        "Table",
        "Non_unique",
        "Key_name",
        "Seq_in_index",
        "Column_name",
        "Collation",
        "Null",
        "Index_type",
        "Sub_part",
        "Comment",
    ],
    field_name: "Field",
    key_name: "Key_name",
    key_table: Some("Table"),
};

/// MySQL syntax: backtick identifiers, `LIMIT offset, count`, `GROUP_CONCAT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn name_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn literal_quotes(&self) -> &'static [char] {
        &['\'', '"']
    }

    fn escape(&self, text: &str, extra: bool) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '\0' => escaped.push_str("\\0"),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\x1a' => escaped.push_str("\\Z"),
                '\\' | '\'' | '"' => {
                    escaped.push('\\');
                    escaped.push(c);
                }
                '%' | '_' if extra => {
                    escaped.push('\\');
                    escaped.push(c);
                }
                _ => escaped.push(c),
            }
        }
        escaped
    }

    fn process_limit(&self, sql: String, limit: u64, offset: u64) -> String {
        match (limit, offset) {
            (0, 0) => sql,
            (0, offset) => format!("{sql} LIMIT {offset}, {MAX_ROWS}"),
            (limit, 0) => format!("{sql} LIMIT {limit}"),
            (limit, offset) => format!("{sql} LIMIT {offset}, {limit}"),
        }
    }

    fn group_concat(&self, expression: &str, separator: &str) -> String {
        format!("GROUP_CONCAT({expression} SEPARATOR {})", self.quote(separator, true))
    }

    fn concatenate(&self, values: &[String], separator: Option<&str>) -> String {
        match separator {
            Some(separator) => format!("CONCAT_WS({}, {})", self.quote(separator, true), values.join(", ")),
            None => format!("CONCAT({})", values.join(", ")),
        }
    }

    fn char_length(&self, field: &str) -> String {
        format!("CHAR_LENGTH({field})")
    }

    fn structure_shape(&self) -> &'static StructureShape {
        &MYSQL_SHAPE
    }
}

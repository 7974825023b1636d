/// SQL Dialect Strategy
///
/// Everything that differs between adapters when rendering SQL lives behind
/// [`SqlDialect`]: identifier quoting, literal escaping, LIMIT/OFFSET syntax,
/// aggregate idioms, and the native metadata attribute names written into
/// dump documents. The query builder holds a dialect, never a driver.
use std::fmt;

/// Native metadata attribute names an adapter reports for columns and keys.
///
/// The dump format is adapter-specific: these names are written verbatim as
/// XML attributes, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureShape {
    /// Attributes emitted on `<field>` elements
    pub field_attributes: &'static [&'static str],
    /// Attributes emitted on `<key>` elements
    pub key_attributes: &'static [&'static str],
    /// Attribute holding the column name
    pub field_name: &'static str,
    /// Attribute holding the index name
    pub key_name: &'static str,
    /// Attribute holding the owning table name (rewritten to the generic `#__` form)
    pub key_table: Option<&'static str>,
}

/// Per-adapter SQL syntax strategy.
pub trait SqlDialect: fmt::Debug + Send + Sync {
    /// Dialect identifier, e.g. `"mysql"`
    fn name(&self) -> &'static str;

    /// Opening and closing identifier quote characters.
    fn name_quotes(&self) -> (char, char);

    /// Characters that delimit string literals.
    ///
    /// Prefix substitution never touches text inside these quotes.
    fn literal_quotes(&self) -> &'static [char];

    /// Escapes `text` for inclusion in a string literal.
    ///
    /// When `extra` is set, `%` and `_` are escaped as well so the result can
    /// be used inside a LIKE pattern.
    fn escape(&self, text: &str, extra: bool) -> String;

    /// Appends the dialect's LIMIT/OFFSET syntax to `sql`.
    ///
    /// A zero `limit` with a zero `offset` leaves the statement unchanged.
    fn process_limit(&self, sql: String, limit: u64, offset: u64) -> String;

    /// Aggregate concatenation of `expression` across grouped rows.
    fn group_concat(&self, expression: &str, separator: &str) -> String;

    /// Concatenates expressions, optionally joined by a literal separator.
    fn concatenate(&self, values: &[String], separator: Option<&str>) -> String;

    /// Character length of an expression.
    fn char_length(&self, field: &str) -> String;

    /// Native metadata attribute layout used by dump documents.
    fn structure_shape(&self) -> &'static StructureShape;

    /// Quotes an identifier, splitting dotted names into quoted parts.
    ///
    /// `*` parts are left bare and embedded closing quotes are doubled. When
    /// `alias` is given the result is `name AS alias`.
    fn quote_name(&self, name: &str, alias: Option<&str>) -> String {
        let (open, close) = self.name_quotes();
        let quote_part = |part: &str| {
            if part == "*" {
                part.to_string()
            } else {
                let doubled = format!("{close}{close}");
                format!("{open}{}{close}", part.replace(close, &doubled))
            }
        };

        let quoted = name.split('.').map(quote_part).collect::<Vec<_>>().join(".");

        match alias {
            Some(alias) => format!("{quoted} AS {}", quote_part(alias)),
            None => quoted,
        }
    }

    /// Wraps `text` in single quotes, escaping it first unless told otherwise.
    fn quote(&self, text: &str, escape: bool) -> String {
        if escape {
            format!("'{}'", self.escape(text, false))
        } else {
            format!("'{text}'")
        }
    }
}

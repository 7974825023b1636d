/// Cell values and row records
///
/// Backends convert their native column types into [`Value`] so that the
/// exporter, importer and iterator never see driver-specific types.
use indexmap::IndexMap;
use std::borrow::Cow;
use std::fmt;

/// A single cell value as returned by a driver or bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// One result row: column name to value, in result-set column order.
pub type Record = IndexMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the literal text of the value, or `None` for NULL.
    ///
    /// This is the stringification used by the dump format. Blobs are decoded
    /// as lossy UTF-8.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(Cow::Owned(i.to_string())),
            Value::Real(f) => Some(Cow::Owned(f.to_string())),
            Value::Text(t) => Some(Cow::Borrowed(t.as_str())),
            Value::Blob(b) => Some(String::from_utf8_lossy(b)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Value::from(*f),
            Value::Text(t) => serde_json::Value::String(t.clone()),
            Value::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

/// Converts a record into a JSON object, preserving column order.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    let object = record
        .iter()
        .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(object)
}

/// Parameters bound to a statement before execution.
///
/// A statement uses either positional (`?`) or named (`:name`) placeholders,
/// never both.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundParams {
    Positional(Vec<Value>),
    Named(IndexMap<String, Value>),
}

impl Default for BoundParams {
    fn default() -> Self {
        BoundParams::Positional(Vec::new())
    }
}

impl BoundParams {
    pub fn is_empty(&self) -> bool {
        match self {
            BoundParams::Positional(values) => values.is_empty(),
            BoundParams::Named(values) => values.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BoundParams::Positional(values) => values.len(),
            BoundParams::Named(values) => values.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_representation() {
        assert_eq!(Value::Integer(42).as_text().as_deref(), Some("42"));
        assert_eq!(Value::Real(1.5).as_text().as_deref(), Some("1.5"));
        assert_eq!(Value::from("Row 1").as_text().as_deref(), Some("Row 1"));
        assert_eq!(Value::Text(String::new()).as_text().as_deref(), Some(""));
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Integer(7));
    }

    #[test]
    fn test_record_to_json_keeps_order() {
        let mut record = Record::new();
        record.insert("title".to_string(), Value::from("Row 1"));
        record.insert("id".to_string(), Value::Integer(1));
        record.insert("body".to_string(), Value::Null);

        let json = record_to_json(&record);
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["title", "id", "body"]);
        assert_eq!(json["id"], serde_json::json!(1));
        assert!(json["body"].is_null());
    }

    #[test]
    fn test_bound_params_len() {
        assert!(BoundParams::default().is_empty());
        let params = BoundParams::Positional(vec![Value::Integer(1), Value::Null]);
        assert_eq!(params.len(), 2);
    }
}

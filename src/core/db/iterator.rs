/// Result Iterator Module
///
/// [`DatabaseIterator`] walks a statement's result set one row at a time. It
/// is single-pass: once a row has been fetched it cannot be restarted, and the
/// underlying cursor is dropped as soon as the result set is exhausted.
use crate::core::db::driver::ResultCursor;
use crate::core::value::{record_to_json, Record, Value};
use crate::core::{DatabaseError, Result};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::debug;

/// Lazy, forward-only iterator over a result set.
///
/// Each item is `(key, row)`. The key is the value of the configured key
/// column, or the zero-based row index when no key column is set.
pub struct DatabaseIterator<'s> {
    cursor: Option<Box<dyn ResultCursor + 's>>,
    key_column: Option<String>,
    fetched: usize,
    exhausted: bool,
}

impl<'s> DatabaseIterator<'s> {
    /// Wraps `cursor`, keying rows by `key_column` if given.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Iterator` if the key column is not part of the
    /// result set.
    pub fn new(cursor: Box<dyn ResultCursor + 's>, key_column: Option<&str>) -> Result<Self> {
        if let Some(key) = key_column {
            if !cursor.column_names().iter().any(|c| c == key) {
                return Err(DatabaseError::Iterator(format!(
                    "key column `{key}` does not exist in the result set"
                )));
            }
        }

        Ok(DatabaseIterator {
            cursor: Some(cursor),
            key_column: key_column.map(str::to_string),
            fetched: 0,
            exhausted: false,
        })
    }

    /// Number of rows fetched so far.
    pub fn position(&self) -> usize {
        self.fetched
    }

    /// Whether the result set has been fully consumed and released.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Column names of the underlying result set, while it is still open.
    pub fn column_names(&self) -> Option<&[String]> {
        self.cursor.as_ref().map(|c| c.column_names())
    }

    /// Restarting is only possible before the first fetch.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Iterator` once any row has been fetched.
    pub fn rewind(&mut self) -> Result<()> {
        if self.fetched > 0 || self.exhausted {
            return Err(DatabaseError::Iterator(
                "the result set has already been consumed and cannot be rewound".to_string(),
            ));
        }
        Ok(())
    }

    /// Releases the result set early.
    pub fn close(&mut self) {
        self.cursor = None;
        self.exhausted = true;
    }

    /// Adapts the iterator to deserialize each row into `T`.
    pub fn typed<T: DeserializeOwned>(self) -> TypedIterator<'s, T> {
        TypedIterator {
            inner: self,
            marker: PhantomData,
        }
    }

    fn key_for(&self, row: &Record) -> Value {
        match &self.key_column {
            Some(key) => row.get(key).cloned().unwrap_or(Value::Null),
            None => Value::Integer(self.fetched as i64),
        }
    }
}

impl Iterator for DatabaseIterator<'_> {
    type Item = Result<(Value, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;

        match cursor.fetch() {
            Ok(Some(row)) => {
                let key = self.key_for(&row);
                self.fetched += 1;
                Some(Ok((key, row)))
            }
            Ok(None) => {
                debug!("Result set exhausted after {} rows", self.fetched);
                self.close();
                None
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for DatabaseIterator<'_> {}

/// Iterator yielding rows deserialized into `T`.
pub struct TypedIterator<'s, T> {
    inner: DatabaseIterator<'s>,
    marker: PhantomData<T>,
}

impl<T: DeserializeOwned> Iterator for TypedIterator<'_, T> {
    type Item = Result<(Value, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.and_then(|(key, row)| {
            let object = serde_json::from_value(record_to_json(&row))?;
            Ok((key, object))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{record, VecCursor};
    use serde::Deserialize;

    fn cursor() -> Box<dyn ResultCursor + 'static> {
        Box::new(VecCursor::new(
            &["id", "title"],
            vec![
                record(&[("id", Value::Integer(10)), ("title", Value::from("Row 1"))]),
                record(&[("id", Value::Integer(20)), ("title", Value::from("Row 2"))]),
            ],
        ))
    }

    #[test]
    fn test_iterates_with_index_keys() {
        let iterator = DatabaseIterator::new(cursor(), None).unwrap();
        let keys: Vec<Value> = iterator.map(|item| item.unwrap().0).collect();
        assert_eq!(keys, vec![Value::Integer(0), Value::Integer(1)]);
    }

    #[test]
    fn test_iterates_with_key_column() {
        let iterator = DatabaseIterator::new(cursor(), Some("id")).unwrap();
        let items: Vec<(Value, Record)> = iterator.map(Result::unwrap).collect();
        assert_eq!(items[0].0, Value::Integer(10));
        assert_eq!(items[1].0, Value::Integer(20));
        assert_eq!(items[1].1["title"], Value::from("Row 2"));
    }

    #[test]
    fn test_missing_key_column_fails() {
        let result = DatabaseIterator::new(cursor(), Some("missing"));
        assert!(matches!(result, Err(DatabaseError::Iterator(_))));
    }

    #[test]
    fn test_fetches_lazily_and_releases_on_exhaustion() {
        let mut iterator = DatabaseIterator::new(cursor(), None).unwrap();
        assert!(iterator.rewind().is_ok());

        iterator.next().unwrap().unwrap();
        assert_eq!(iterator.position(), 1);
        assert!(iterator.column_names().is_some());

        iterator.next().unwrap().unwrap();
        assert!(iterator.next().is_none());
        assert!(iterator.is_exhausted());
        assert!(iterator.column_names().is_none());
        assert!(iterator.next().is_none());
    }

    #[test]
    fn test_rewind_after_consumption_fails() {
        let mut iterator = DatabaseIterator::new(cursor(), None).unwrap();
        iterator.next();
        assert!(matches!(iterator.rewind(), Err(DatabaseError::Iterator(_))));
    }

    #[test]
    fn test_typed_rows() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Article {
            id: i64,
            title: String,
        }

        let iterator = DatabaseIterator::new(cursor(), Some("id")).unwrap();
        let articles: Vec<Article> = iterator.typed::<Article>().map(|item| item.unwrap().1).collect();
        assert_eq!(
            articles,
            vec![
                Article { id: 10, title: "Row 1".to_string() },
                Article { id: 20, title: "Row 2".to_string() },
            ]
        );
    }
}

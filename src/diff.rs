/// Structure Reconciliation
///
/// Compares the structure declared in a dump against the live structure a
/// driver reports and turns the differences into DDL. Columns and keys are
/// matched by name, so declaration order never causes a column to be
/// dropped and recreated.
///
/// The comparison is shared; the SQL is per adapter, behind
/// [`StructureReconciler`].
use crate::core::value::{Record, Value};
use crate::core::Result;
use crate::dump::TableStructure;
use crate::query::{SqlDialect, StructureShape};
use indexmap::IndexMap;
use std::borrow::Cow;

/// Reads a metadata attribute as text; NULL and missing read as `None`.
pub fn attr<'r>(record: &'r Record, name: &str) -> Option<Cow<'r, str>> {
    record.get(name).and_then(Value::as_text)
}

/// Compares one attribute of two records, treating NULL and missing alike.
pub fn attr_differs(a: &Record, b: &Record, name: &str) -> bool {
    attr(a, name) != attr(b, name)
}

/// All parts of one index, grouped by index name.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDefinition {
    pub name: String,
    /// One record per indexed column, in sequence order
    pub parts: Vec<Record>,
}

impl KeyDefinition {
    /// Reads `name` from the first part.
    pub fn attr(&self, name: &str) -> Option<Cow<'_, str>> {
        self.parts.first().and_then(|part| attr(part, name))
    }

    /// Values of `name` across all parts, in order.
    pub fn column_values(&self, name: &str) -> Vec<String> {
        self.parts
            .iter()
            .filter_map(|part| attr(part, name).map(Cow::into_owned))
            .collect()
    }
}

/// Groups key part records by `key_name`, keeping first-appearance order.
pub fn group_keys(records: &[Record], key_name: &str) -> Vec<KeyDefinition> {
    let mut groups: IndexMap<String, Vec<Record>> = IndexMap::new();
    for record in records {
        if let Some(name) = attr(record, key_name) {
            groups.entry(name.into_owned()).or_default().push(record.clone());
        }
    }
    groups
        .into_iter()
        .map(|(name, parts)| KeyDefinition { name, parts })
        .collect()
}

/// Differences between a declared and a live table.
#[derive(Debug, Default)]
pub struct StructureDiff<'a> {
    /// Declared columns missing from the live table
    pub added_columns: Vec<&'a Record>,
    /// Declared columns whose definition differs, with the live record
    pub changed_columns: Vec<(&'a Record, &'a Record)>,
    /// Live columns not declared
    pub dropped_columns: Vec<String>,
    /// Declared keys that are missing or changed
    pub added_keys: Vec<KeyDefinition>,
    /// Live keys that are not declared or changed
    pub dropped_keys: Vec<KeyDefinition>,
}

impl StructureDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.dropped_columns.is_empty()
            && self.added_keys.is_empty()
            && self.dropped_keys.is_empty()
    }
}

/// Compares declared against live structure using `reconciler`'s notion of
/// a changed column or key.
pub fn compare_structure<'a, R: StructureReconciler + ?Sized>(
    reconciler: &R,
    shape: &StructureShape,
    declared: &'a TableStructure,
    live_columns: &'a IndexMap<String, Record>,
    live_keys: &[Record],
) -> StructureDiff<'a> {
    let mut diff = StructureDiff::default();

    for field in &declared.fields {
        let name = match attr(field, shape.field_name) {
            Some(name) => name,
            None => continue,
        };
        match live_columns.get(name.as_ref()) {
            None => diff.added_columns.push(field),
            Some(live) if reconciler.column_changed(field, live) => diff.changed_columns.push((field, live)),
            Some(_) => {}
        }
    }

    for name in live_columns.keys() {
        let declared_here = declared
            .fields
            .iter()
            .any(|field| attr(field, shape.field_name).as_deref() == Some(name.as_str()));
        if !declared_here {
            diff.dropped_columns.push(name.clone());
        }
    }

    let declared_keys = group_keys(&declared.keys, shape.key_name);
    let live_keys = group_keys(live_keys, shape.key_name);

    for key in &declared_keys {
        let identity = reconciler.key_identity(key);
        match live_keys.iter().find(|live| reconciler.key_identity(live) == identity) {
            None => diff.added_keys.push(key.clone()),
            Some(live) if reconciler.key_changed(key, live) => {
                diff.dropped_keys.push(live.clone());
                diff.added_keys.push(key.clone());
            }
            Some(_) => {}
        }
    }

    for live in live_keys {
        let identity = reconciler.key_identity(&live);
        if !declared_keys.iter().any(|key| reconciler.key_identity(key) == identity) {
            diff.dropped_keys.push(live);
        }
    }

    diff
}

/// Adapter-specific DDL generation for structure imports.
pub trait StructureReconciler: Send + Sync {
    /// Statements creating `table` from scratch, keys included.
    fn create_table(&self, dialect: &dyn SqlDialect, table: &TableStructure) -> Result<Vec<String>>;

    /// Whether a declared column differs from its live counterpart.
    fn column_changed(&self, declared: &Record, live: &Record) -> bool;

    /// What pairs a declared key with a live one. Defaults to the key name;
    /// adapters whose engine names some keys itself override this.
    fn key_identity(&self, key: &KeyDefinition) -> String {
        key.name.clone()
    }

    /// Whether a declared key differs from its live counterpart.
    fn key_changed(&self, declared: &KeyDefinition, live: &KeyDefinition) -> bool;

    fn add_column(&self, dialect: &dyn SqlDialect, table: &str, field: &Record) -> Result<String>;

    fn change_column(&self, dialect: &dyn SqlDialect, table: &str, field: &Record, live: &Record) -> Result<String>;

    fn drop_column(&self, dialect: &dyn SqlDialect, table: &str, column: &str) -> Result<String>;

    fn add_key(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> Result<String>;

    fn drop_key(&self, dialect: &dyn SqlDialect, table: &str, key: &KeyDefinition) -> Result<String>;

    /// Statements converging an existing table onto `declared`.
    ///
    /// Emission order: drop stale keys, add or change columns, drop
    /// undeclared columns, add keys.
    fn alter_table(
        &self,
        dialect: &dyn SqlDialect,
        declared: &TableStructure,
        live_columns: &IndexMap<String, Record>,
        live_keys: &[Record],
    ) -> Result<Vec<String>> {
        let diff = compare_structure(self, dialect.structure_shape(), declared, live_columns, live_keys);
        let table = declared.name.as_str();
        let mut statements = Vec::new();

        for key in &diff.dropped_keys {
            statements.push(self.drop_key(dialect, table, key)?);
        }
        for field in &diff.added_columns {
            statements.push(self.add_column(dialect, table, field)?);
        }
        for (field, live) in &diff.changed_columns {
            statements.push(self.change_column(dialect, table, field, live)?);
        }
        for column in &diff.dropped_columns {
            statements.push(self.drop_column(dialect, table, column)?);
        }
        for key in &diff.added_keys {
            statements.push(self.add_key(dialect, table, key)?);
        }

        Ok(statements)
    }
}

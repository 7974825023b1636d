/// Importer Module
///
/// Loads per-table dump files (`<table>.xml` inside a folder) into a live
/// database. With structure enabled, each declared table is created when
/// missing, otherwise altered in place using the adapter's
/// [`StructureReconciler`]. Rows are then inserted one bound statement at a
/// time, in document order.
use crate::batch::{BatchMode, BatchReport};
use crate::core::db::driver::{replace_prefix, DatabaseDriver, ServerType, PREFIX_TOKEN};
use crate::core::value::BoundParams;
use crate::core::{DatabaseError, Result};
use crate::diff::StructureReconciler;
use crate::dump::{DumpDocument, DumpSection};
use crate::exporter::{tables_from_value, validate_tables, DumpFormat, NO_TABLES, WRONG_DRIVER};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImporterOptions {
    pub with_structure: bool,
}

impl Default for ImporterOptions {
    fn default() -> Self {
        ImporterOptions { with_structure: true }
    }
}

/// Imports dump files into a database of one server type.
pub struct DatabaseImporter<'a> {
    server_type: ServerType,
    reconciler: Box<dyn StructureReconciler>,
    driver: Option<&'a mut dyn DatabaseDriver>,
    options: ImporterOptions,
    format: DumpFormat,
    from: Vec<String>,
    folder: PathBuf,
}

impl<'a> DatabaseImporter<'a> {
    pub fn new(server_type: ServerType, reconciler: Box<dyn StructureReconciler>) -> Self {
        DatabaseImporter {
            server_type,
            reconciler,
            driver: None,
            options: ImporterOptions::default(),
            format: DumpFormat::default(),
            from: Vec::new(),
            folder: PathBuf::from("."),
        }
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn options(&self) -> ImporterOptions {
        self.options
    }

    pub fn format(&self) -> DumpFormat {
        self.format
    }

    pub fn tables(&self) -> &[String] {
        &self.from
    }

    /// Whether a driver has been injected.
    pub fn has_dbo(&self) -> bool {
        self.driver.is_some()
    }

    pub fn set_dbo(&mut self, driver: &'a mut dyn DatabaseDriver) -> &mut Self {
        self.driver = Some(driver);
        self
    }

    pub fn as_xml(&mut self) -> &mut Self {
        self.format = DumpFormat::Xml;
        self
    }

    pub fn with_structure(&mut self, enabled: bool) -> &mut Self {
        self.options.with_structure = enabled;
        self
    }

    pub fn from<I, S>(&mut self, tables: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from = validate_tables(tables.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    pub fn from_value(&mut self, tables: &serde_json::Value) -> Result<&mut Self> {
        self.from = validate_tables(tables_from_value(tables, "importer")?)?;
        Ok(self)
    }

    /// Folder holding the `<table>.xml` files; defaults to the working directory.
    pub fn folder(&mut self, folder: impl AsRef<Path>) -> &mut Self {
        self.folder = folder.as_ref().to_path_buf();
        self
    }

    pub fn check(&self) -> Result<&Self> {
        match &self.driver {
            Some(driver) if driver.server_type() == self.server_type => {}
            _ => return Err(DatabaseError::Precondition(WRONG_DRIVER.to_string())),
        }
        if self.from.is_empty() {
            return Err(DatabaseError::Precondition(NO_TABLES.to_string()));
        }
        Ok(self)
    }

    fn driver(&mut self) -> Result<&mut (dyn DatabaseDriver + 'a)> {
        match self.driver.as_deref_mut() {
            Some(driver) if driver.server_type() == self.server_type => Ok(driver),
            _ => Err(DatabaseError::Precondition(WRONG_DRIVER.to_string())),
        }
    }

    /// Creates or alters every table declared in `document`. Use
    /// [`import_table`](Self::import_table) to touch a single table.
    pub fn merge_structure(&mut self, document: &DumpDocument) -> Result<()> {
        let reconciler = &*self.reconciler;
        let driver = match self.driver.as_deref_mut() {
            Some(driver) if driver.server_type() == self.server_type => driver,
            _ => return Err(DatabaseError::Precondition(WRONG_DRIVER.to_string())),
        };
        let dialect = driver.dialect();
        let existing = driver.table_list()?;

        for declared in document.structures() {
            let table = replace_prefix(&declared.name, PREFIX_TOKEN, driver.prefix(), &[]);
            let statements = if existing.contains(&table) {
                let live_columns = driver.table_columns(&table)?;
                let live_keys = driver.table_keys(&table)?;
                reconciler.alter_table(dialect.as_ref(), declared, &live_columns, &live_keys)?
            } else {
                info!("Creating table {}", table);
                reconciler.create_table(dialect.as_ref(), declared)?
            };

            if statements.is_empty() {
                debug!("{}: structure is current", table);
            }
            for sql in &statements {
                info!("{}: {}", table, sql);
                driver
                    .execute(sql, &BoundParams::default())
                    .map_err(|e| DatabaseError::reconciliation(&table, None, e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Inserts every row of `document`, returning the number of rows inserted.
    pub fn import_data(&mut self, document: &DumpDocument) -> Result<u64> {
        let driver = self.driver()?;
        let mut inserted = 0;

        for data in document.data() {
            let table = driver.quote_name(&data.name);
            for row in &data.rows {
                let mut query = driver.create_query();
                query
                    .insert(&table)?
                    .columns(row.keys().map(|column| driver.quote_name(column)))?
                    .bind_row(row.values().cloned().collect())?;
                inserted += driver.execute_query(&query)?;
            }
            debug!("{}: {} row(s) imported", data.name, data.rows.len());
        }
        Ok(inserted)
    }

    /// Imports `<folder>/<table>.xml`.
    pub fn import_table(&mut self, table: &str) -> Result<()> {
        let file = format!("{table}.xml");
        let path = self.folder.join(&file);
        if !path.is_file() {
            return Err(DatabaseError::MissingResource { file });
        }

        info!("Importing {} from {}", table, path.display());
        let prefix = self.driver()?.prefix().to_string();
        let document = sections_for(DumpDocument::read_file(&path)?, table, &prefix);
        if self.options.with_structure {
            self.merge_structure(&document)?;
        }
        self.import_data(&document)?;
        Ok(())
    }

    /// Imports every configured table.
    ///
    /// In [`BatchMode::All`] failures are collected per table; in
    /// [`BatchMode::Single`] the first failure is returned.
    pub fn run(&mut self, mode: BatchMode) -> Result<BatchReport> {
        self.check()?;
        let tables = self.from.clone();
        let mut report = BatchReport::new();

        for table in &tables {
            match self.import_table(table) {
                Ok(()) => report.record_success(table),
                Err(e) if mode == BatchMode::Single => return Err(e),
                Err(e) => report.record_failure(table, e),
            }
        }
        Ok(report)
    }
}

/// Keeps the sections of `document` that describe `table`.
///
/// A section matches when it names `table` either verbatim or in its `#__`
/// form. A file exported under another prefix matches nothing, so its
/// leading table is taken instead.
fn sections_for(mut document: DumpDocument, table: &str, prefix: &str) -> DumpDocument {
    let real = |name: &str| replace_prefix(name, PREFIX_TOKEN, prefix, &[]);
    let requested = real(table);
    let target = document
        .sections
        .iter()
        .map(DumpSection::table_name)
        .find(|name| *name == table || real(*name) == requested)
        .or_else(|| document.sections.first().map(DumpSection::table_name))
        .map(str::to_string);

    if let Some(target) = target {
        document.sections.retain(|section| {
            let keep = section.table_name() == target;
            if !keep {
                warn!("{}: skipping section for {}", table, section.table_name());
            }
            keep
        });
    }
    document
}

/// Exporter Module
///
/// Builds dump documents for a list of tables from a live driver. Structure
/// sections carry the driver's native column and key metadata, filtered to
/// the attribute layout of its dialect; data sections carry every row of the
/// table as text.
///
/// Table names in the dump are generic: a leading driver prefix is replaced
/// by `#__`, so a dump taken from `jos_users` can be imported under any
/// prefix.
use crate::batch::{BatchMode, BatchReport};
use crate::core::db::driver::{DatabaseDriver, ServerType, PREFIX_TOKEN};
use crate::core::value::{Record, Value};
use crate::core::{DatabaseError, Result};
use crate::dump::{DumpDocument, TableData, TableStructure};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub(crate) const WRONG_DRIVER: &str = "Database connection wrong type.";
pub(crate) const NO_TABLES: &str = "ERROR: No Tables Specified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExporterOptions {
    pub with_structure: bool,
    pub with_data: bool,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        ExporterOptions {
            with_structure: true,
            with_data: false,
        }
    }
}

/// Serialization formats for dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpFormat {
    #[default]
    Xml,
}

/// Parses a table selection given as a JSON string or array of strings.
pub(crate) fn tables_from_value(value: &serde_json::Value, component: &str) -> Result<Vec<String>> {
    let invalid = || {
        DatabaseError::InvalidArgument(format!(
            "The {component} requires either a single table name or array of table names"
        ))
    };
    match value {
        serde_json::Value::String(table) => Ok(vec![table.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

pub(crate) fn validate_tables(tables: Vec<String>) -> Result<Vec<String>> {
    if tables.iter().any(|t| t.trim().is_empty()) {
        return Err(DatabaseError::InvalidArgument("table names cannot be empty".to_string()));
    }
    Ok(tables)
}

/// Replaces a leading `prefix` with the `#__` token.
///
/// An empty prefix leaves the name unchanged.
pub fn generic_table_name(prefix: &str, table: &str) -> String {
    match table.strip_prefix(prefix) {
        Some(rest) if !prefix.is_empty() => format!("{PREFIX_TOKEN}{rest}"),
        _ => table.to_string(),
    }
}

/// Keeps the `attributes` of `record`, in that order; NULL values are dropped.
fn project(record: &Record, attributes: &[&str]) -> Record {
    attributes
        .iter()
        .filter_map(|name| {
            let text = record.get(*name)?.as_text()?;
            Some((name.to_string(), Value::Text(text.into_owned())))
        })
        .collect()
}

/// Exports tables of one server type as dump documents.
pub struct DatabaseExporter<'a> {
    server_type: ServerType,
    driver: Option<&'a mut dyn DatabaseDriver>,
    options: ExporterOptions,
    format: DumpFormat,
    from: Vec<String>,
}

impl<'a> DatabaseExporter<'a> {
    pub fn new(server_type: ServerType) -> Self {
        DatabaseExporter {
            server_type,
            driver: None,
            options: ExporterOptions::default(),
            format: DumpFormat::default(),
            from: Vec::new(),
        }
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn options(&self) -> ExporterOptions {
        self.options
    }

    pub fn format(&self) -> DumpFormat {
        self.format
    }

    /// Tables to export, in export order.
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

    pub fn with_data(&mut self, enabled: bool) -> &mut Self {
        self.options.with_data = enabled;
        self
    }

    /// Sets the tables to export. Empty names are rejected here.
    pub fn from<I, S>(&mut self, tables: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from = validate_tables(tables.into_iter().map(Into::into).collect())?;
        Ok(self)
    }

    /// Sets the tables from a JSON string or array of strings.
    pub fn from_value(&mut self, tables: &serde_json::Value) -> Result<&mut Self> {
        self.from = validate_tables(tables_from_value(tables, "exporter")?)?;
        Ok(self)
    }

    /// Validates the driver and the table list before any I/O.
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
        self.driver
            .as_deref_mut()
            .ok_or_else(|| DatabaseError::Precondition(WRONG_DRIVER.to_string()))
    }

    /// Builds one document covering every table, structure before data per table.
    pub fn build_document(&mut self) -> Result<DumpDocument> {
        self.check()?;
        let options = self.options;
        let tables = self.from.clone();
        let driver = self.driver()?;

        let mut document = DumpDocument::new(driver.database());
        for table in &tables {
            export_table(driver, options, table, &mut document)?;
        }
        Ok(document)
    }

    /// Renders the dump in the configured format.
    pub fn render(&mut self) -> Result<String> {
        match self.format {
            DumpFormat::Xml => self.build_document()?.to_xml(),
        }
    }

    /// Writes one `<table>.xml` file per table into `folder`.
    ///
    /// In [`BatchMode::Single`] the first failing table aborts the run.
    pub fn export_to_folder(&mut self, folder: &Path, mode: BatchMode) -> Result<BatchReport> {
        self.check()?;
        fs::create_dir_all(folder)?;
        let options = self.options;
        let tables = self.from.clone();
        let driver = self.driver()?;

        let mut report = BatchReport::new();
        for table in &tables {
            let path = folder.join(format!("{table}.xml"));
            let mut document = DumpDocument::new(driver.database());
            let outcome =
                export_table(driver, options, table, &mut document).and_then(|_| document.write_file(&path));
            match outcome {
                Ok(()) => {
                    info!("Exported {} to {}", table, path.display());
                    report.record_success(table);
                }
                Err(e) if mode == BatchMode::Single => return Err(e),
                Err(e) => report.record_failure(table, e),
            }
        }
        Ok(report)
    }
}

fn export_table(
    driver: &mut dyn DatabaseDriver,
    options: ExporterOptions,
    table: &str,
    document: &mut DumpDocument,
) -> Result<()> {
    info!("Exporting table {}", table);
    if options.with_structure {
        document.push_structure(table_structure(driver, table)?);
    }
    if options.with_data {
        document.push_data(table_data(driver, table)?);
    }
    Ok(())
}

fn table_structure(driver: &mut dyn DatabaseDriver, table: &str) -> Result<TableStructure> {
    let dialect = driver.dialect();
    let shape = dialect.structure_shape();
    let prefix = driver.prefix().to_string();

    let fields = driver
        .table_columns(table)?
        .values()
        .map(|column| project(column, shape.field_attributes))
        .collect();

    let keys = driver
        .table_keys(table)?
        .iter()
        .map(|key| {
            let mut projected = project(key, shape.key_attributes);
            if let Some(Value::Text(owner)) = shape.key_table.and_then(|name| projected.get_mut(name)) {
                *owner = generic_table_name(&prefix, owner);
            }
            projected
        })
        .collect();

    Ok(TableStructure {
        name: generic_table_name(&prefix, table),
        fields,
        keys,
    })
}

fn table_data(driver: &mut dyn DatabaseDriver, table: &str) -> Result<TableData> {
    let mut query = driver.create_query();
    query.select(["*"])?.from([driver.quote_name(table)])?;
    let rows = driver.load_query(&query)?;
    debug!("{}: {} row(s)", table, rows.len());

    let rows = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(column, value)| {
                    let value = match value {
                        Value::Blob(bytes) => Value::Blob(bytes),
                        other => other.as_text().map(|t| Value::Text(t.into_owned())).unwrap_or(Value::Null),
                    };
                    (column, value)
                })
                .collect()
        })
        .collect();

    Ok(TableData {
        name: generic_table_name(driver.prefix(), table),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockDriver;

    const HEADER: &str = "<?xml version=\"1.0\"?>\n<mysqldump xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n <database name=\"\">\n";
    const FOOTER: &str = " </database>\n</mysqldump>";
    const STRUCTURE: &str = "  <table_structure name=\"#__test\">
   <field Field=\"id\" Type=\"int(11) unsigned\" Null=\"NO\" Key=\"PRI\" Default=\"\" Extra=\"auto_increment\"/>
   <field Field=\"title\" Type=\"varchar(255)\" Null=\"NO\" Key=\"\" Default=\"\" Extra=\"\"/>
   <key Table=\"#__test\" Non_unique=\"0\" Key_name=\"PRIMARY\" Seq_in_index=\"1\" Column_name=\"id\" Collation=\"A\" Null=\"\" Index_type=\"BTREE\" Sub_part=\"\" Comment=\"\"/>
  </table_structure>
";
    const DATA: &str = "  <table_data name=\"#__test\">
   <row>
    <field name=\"id\">1</field>
    <field name=\"title\">Row 1</field>
   </row>
   <row>
    <field name=\"id\">2</field>
    <field name=\"title\">Row 2</field>
   </row>
  </table_data>
";

    fn render(with_structure: bool, with_data: bool) -> (String, Vec<String>) {
        let mut driver = MockDriver::mysql_jos_test();
        let xml = {
            let mut exporter = DatabaseExporter::new(ServerType::Mysql);
            exporter
                .set_dbo(&mut driver)
                .from(["jos_test"])
                .unwrap()
                .with_structure(with_structure)
                .with_data(with_data);
            exporter.render().unwrap()
        };
        let executed = driver.executed_sql().into_iter().map(str::to_string).collect();
        (xml, executed)
    }

    #[test]
    fn test_defaults() {
        let exporter = DatabaseExporter::new(ServerType::Mysql);
        assert_eq!(
            exporter.options(),
            ExporterOptions {
                with_structure: true,
                with_data: false
            }
        );
        assert_eq!(exporter.format(), DumpFormat::Xml);
        assert!(exporter.tables().is_empty());
    }

    #[test]
    fn test_render_without_structure_or_data() {
        let (xml, executed) = render(false, false);
        assert_eq!(xml, format!("{HEADER}{FOOTER}"));
        assert!(executed.is_empty());
    }

    #[test]
    fn test_render_structure_only() {
        let (xml, _) = render(true, false);
        assert_eq!(xml, format!("{HEADER}{STRUCTURE}{FOOTER}"));
    }

    #[test]
    fn test_render_data_only() {
        let (xml, executed) = render(false, true);
        assert_eq!(xml, format!("{HEADER}{DATA}{FOOTER}"));
        assert_eq!(executed, vec!["SELECT *\nFROM `jos_test`"]);
    }

    #[test]
    fn test_render_structure_and_data() {
        let (xml, _) = render(true, true);
        assert_eq!(xml, format!("{HEADER}{STRUCTURE}{DATA}{FOOTER}"));
    }

    #[test]
    fn test_from_accepts_string_or_list() {
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter.from_value(&serde_json::json!("#__dbtest")).unwrap();
        assert_eq!(exporter.tables(), ["#__dbtest"]);

        exporter.from_value(&serde_json::json!(["#__content", "#__dbtest"])).unwrap();
        assert_eq!(exporter.tables(), ["#__content", "#__dbtest"]);
    }

    #[test]
    fn test_from_rejects_other_types_immediately() {
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        for value in [serde_json::json!({}), serde_json::json!(["#__a", 3]), serde_json::json!(null)] {
            match exporter.from_value(&value) {
                Err(DatabaseError::InvalidArgument(msg)) => assert_eq!(
                    msg,
                    "The exporter requires either a single table name or array of table names"
                ),
                other => panic!("Expected invalid argument, got {:?}", other.map(|e| e.tables().to_vec())),
            }
        }
        assert!(exporter.from([""]).is_err());
    }

    #[test]
    fn test_check_passes() {
        let mut driver = MockDriver::new(ServerType::Mysql);
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter.set_dbo(&mut driver).from(["#__dbtest"]).unwrap();
        assert!(exporter.check().is_ok());
    }

    #[test]
    fn test_check_rejects_wrong_driver_type() {
        let mut driver = MockDriver::new(ServerType::Sqlite);
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter.set_dbo(&mut driver).from(["#__dbtest"]).unwrap();
        let err = exporter.check().err().unwrap();
        assert_eq!(err.to_string(), "Database connection wrong type.");
    }

    #[test]
    fn test_check_rejects_missing_driver() {
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter.from(["#__dbtest"]).unwrap();
        let err = exporter.check().err().unwrap();
        assert_eq!(err.to_string(), "Database connection wrong type.");
        assert!(matches!(exporter.render(), Err(DatabaseError::Precondition(_))));
    }

    #[test]
    fn test_check_rejects_empty_table_list() {
        let mut driver = MockDriver::new(ServerType::Mysql);
        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter.set_dbo(&mut driver);
        let err = exporter.check().err().unwrap();
        assert_eq!(err.to_string(), "ERROR: No Tables Specified");
    }

    #[test]
    fn test_generic_table_name() {
        assert_eq!(generic_table_name("jos_", "jos_users"), "#__users");
        assert_eq!(generic_table_name("jos_", "other_users"), "other_users");
        assert_eq!(generic_table_name("", "users"), "users");
    }

    #[test]
    fn test_export_to_folder_reports_each_table() {
        let mut driver = MockDriver::mysql_jos_test();
        driver.fail_on = Some("jos_broken".to_string());
        let dir = tempfile::tempdir().unwrap();

        let report = {
            let mut exporter = DatabaseExporter::new(ServerType::Mysql);
            exporter
                .set_dbo(&mut driver)
                .from(["jos_broken", "jos_test"])
                .unwrap()
                .with_data(true);
            exporter.export_to_folder(dir.path(), BatchMode::All).unwrap()
        };

        assert_eq!(report.succeeded(), vec!["jos_test"]);
        assert_eq!(report.failed()[0].0, "jos_broken");
        assert!(!dir.path().join("jos_broken.xml").exists());

        let document = DumpDocument::read_file(&dir.path().join("jos_test.xml")).unwrap();
        assert_eq!(document.structure("#__test").unwrap().fields.len(), 2);
        assert_eq!(document.data().next().unwrap().rows.len(), 2);
    }

    #[test]
    fn test_export_to_folder_single_mode_stops() {
        let mut driver = MockDriver::mysql_jos_test();
        driver.fail_on = Some("jos_broken".to_string());
        let dir = tempfile::tempdir().unwrap();

        let mut exporter = DatabaseExporter::new(ServerType::Mysql);
        exporter
            .set_dbo(&mut driver)
            .from(["jos_broken", "jos_test"])
            .unwrap()
            .with_data(true);
        assert!(exporter.export_to_folder(dir.path(), BatchMode::Single).is_err());
        assert!(!dir.path().join("jos_test.xml").exists());
    }
}

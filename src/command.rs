/// Command Runners
///
/// The export and import commands behind the `sqlport` binary. Each runner
/// resolves the table selection, drives the exporter or importer over one
/// driver and reports to `out`, returning the process exit code.
use crate::batch::{BatchMode, BatchReport};
use crate::core::db::driver::DatabaseDriver;
use crate::core::{DatabaseError, Result};
use crate::factory::DatabaseFactory;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Which tables a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSelection {
    All,
    Single(String),
}

impl TableSelection {
    /// Resolves `--all` / `--table`; exactly one must be given.
    pub fn from_flags(all: bool, table: Option<&str>) -> Result<Self> {
        match (all, table) {
            (true, None) => Ok(TableSelection::All),
            (false, Some(table)) if !table.is_empty() => Ok(TableSelection::Single(table.to_string())),
            (true, Some(_)) => Err(DatabaseError::Precondition(
                "The --table and --all options cannot be combined".to_string(),
            )),
            _ => Err(DatabaseError::Precondition(
                "Either the --table or --all option must be specified".to_string(),
            )),
        }
    }

    pub fn batch_mode(&self) -> BatchMode {
        match self {
            TableSelection::All => BatchMode::All,
            TableSelection::Single(_) => BatchMode::Single,
        }
    }
}

/// Options shared by both commands.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub all: bool,
    pub table: Option<String>,
    pub folder: PathBuf,
    pub with_structure: bool,
    /// Export only; imports always load the rows present in the files
    pub with_data: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        CommandOptions {
            all: false,
            table: None,
            folder: PathBuf::from("."),
            with_structure: true,
            with_data: true,
        }
    }
}

/// Stems of the `*.xml` files in `folder`, sorted.
fn dump_files(folder: &Path) -> Result<BTreeSet<String>> {
    let mut stems = BTreeSet::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("xml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.insert(stem.to_string());
            }
        }
    }
    Ok(stems)
}

fn elapsed_seconds(started: Instant) -> String {
    format!("{:.3}", started.elapsed().as_secs_f64())
}

fn report_failures(out: &mut dyn Write, report: &BatchReport) -> Result<()> {
    for (table, err) in report.failed() {
        writeln!(out, "{table}: {err}")?;
    }
    Ok(())
}

/// Exports the selected tables to `<folder>/<table>.xml`.
pub fn run_export(
    factory: &DatabaseFactory,
    driver: &mut dyn DatabaseDriver,
    options: &CommandOptions,
    out: &mut dyn Write,
) -> Result<i32> {
    let name = driver.name().to_string();
    let mut exporter = match factory.get_exporter(&name, None) {
        Ok(exporter) => exporter,
        Err(DatabaseError::UnsupportedAdapter(_)) => {
            writeln!(out, "The \"{name}\" database driver does not support exporting data.")?;
            return Ok(1);
        }
        Err(e) => return Err(e),
    };

    let selection = match TableSelection::from_flags(options.all, options.table.as_deref()) {
        Ok(selection) => selection,
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(1);
        }
    };

    let started = Instant::now();
    let tables = match &selection {
        TableSelection::All => driver.table_list()?,
        TableSelection::Single(table) => vec![table.clone()],
    };
    if tables.is_empty() {
        writeln!(out, "No tables to export.")?;
        return Ok(0);
    }

    info!("Exporting {} table(s) to {}", tables.len(), options.folder.display());
    exporter
        .set_dbo(driver)
        .as_xml()
        .with_structure(options.with_structure)
        .with_data(options.with_data)
        .from(tables)?;

    match exporter.export_to_folder(&options.folder, selection.batch_mode()) {
        Ok(report) => {
            report_failures(out, &report)?;
            writeln!(out, "Export completed in {} seconds.", elapsed_seconds(started))?;
            Ok(if report.is_success() { 0 } else { 1 })
        }
        Err(e) => {
            error!("Export failed: {}", e);
            writeln!(out, "{e}")?;
            Ok(1)
        }
    }
}

/// Imports the selected tables from `<folder>/<table>.xml`.
///
/// With `--all`, every table the driver lists plus every dump file in the
/// folder is imported.
pub fn run_import(
    factory: &DatabaseFactory,
    driver: &mut dyn DatabaseDriver,
    options: &CommandOptions,
    out: &mut dyn Write,
) -> Result<i32> {
    let name = driver.name().to_string();
    let mut importer = match factory.get_importer(&name, None) {
        Ok(importer) => importer,
        Err(DatabaseError::UnsupportedAdapter(_)) => {
            writeln!(out, "The \"{name}\" database driver does not support importing data.")?;
            return Ok(1);
        }
        Err(e) => return Err(e),
    };

    let selection = match TableSelection::from_flags(options.all, options.table.as_deref()) {
        Ok(selection) => selection,
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(1);
        }
    };

    let started = Instant::now();
    let tables = match &selection {
        TableSelection::All => {
            let mut tables = driver.table_list()?;
            for stem in dump_files(&options.folder)? {
                if !tables.contains(&stem) {
                    tables.push(stem);
                }
            }
            tables
        }
        TableSelection::Single(table) => vec![table.clone()],
    };
    if tables.is_empty() {
        writeln!(out, "No tables to import.")?;
        return Ok(0);
    }

    info!("Importing {} table(s) from {}", tables.len(), options.folder.display());
    importer
        .set_dbo(driver)
        .as_xml()
        .with_structure(options.with_structure)
        .folder(&options.folder)
        .from(tables)?;

    match importer.run(selection.batch_mode()) {
        Ok(report) => {
            report_failures(out, &report)?;
            writeln!(out, "Import completed in {} seconds.", elapsed_seconds(started))?;
            Ok(if report.is_success() { 0 } else { 1 })
        }
        Err(e) => {
            error!("Import failed: {}", e);
            writeln!(out, "{e}")?;
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::driver::{ServerType, StatementInterface};
    use crate::core::Record;
    use crate::query::SqlDialect;
    use crate::test_utils::MockDriver;
    use indexmap::IndexMap;
    use std::sync::Arc;

    struct UnknownDriver(MockDriver);

    // Delegates everything but the adapter name.
    impl DatabaseDriver for UnknownDriver {
        fn name(&self) -> &str {
            "test"
        }
        fn server_type(&self) -> ServerType {
            self.0.server_type()
        }
        fn dialect(&self) -> Arc<dyn SqlDialect> {
            self.0.dialect()
        }
        fn prefix(&self) -> &str {
            self.0.prefix()
        }
        fn database(&self) -> &str {
            self.0.database()
        }
        fn connect(&mut self) -> Result<()> {
            self.0.connect()
        }
        fn connected(&self) -> bool {
            self.0.connected()
        }
        fn disconnect(&mut self) {
            self.0.disconnect()
        }
        fn prepare_statement(&mut self, sql: &str) -> Result<Box<dyn StatementInterface + '_>> {
            self.0.prepare_statement(sql)
        }
        fn table_columns(&mut self, table: &str) -> Result<IndexMap<String, Record>> {
            self.0.table_columns(table)
        }
        fn table_keys(&mut self, table: &str) -> Result<Vec<Record>> {
            self.0.table_keys(table)
        }
        fn table_list(&mut self) -> Result<Vec<String>> {
            self.0.table_list()
        }
    }

    fn run(
        runner: fn(&DatabaseFactory, &mut dyn DatabaseDriver, &CommandOptions, &mut dyn Write) -> Result<i32>,
        driver: &mut dyn DatabaseDriver,
        options: &CommandOptions,
    ) -> (i32, String) {
        let mut out = Vec::new();
        let code = runner(&DatabaseFactory::new(), driver, options, &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_selection_flags() {
        assert_eq!(TableSelection::from_flags(true, None).unwrap(), TableSelection::All);
        assert_eq!(
            TableSelection::from_flags(false, Some("dbtest")).unwrap(),
            TableSelection::Single("dbtest".to_string())
        );
        assert!(TableSelection::from_flags(true, Some("dbtest")).is_err());
        let err = TableSelection::from_flags(false, None).unwrap_err();
        assert_eq!(err.to_string(), "Either the --table or --all option must be specified");
    }

    #[test]
    fn test_import_fails_for_unsupported_driver() {
        let mut driver = UnknownDriver(MockDriver::new(ServerType::Mysql));
        let (code, output) = run(run_import, &mut driver, &CommandOptions::default());
        assert_eq!(code, 1);
        assert!(output.contains("The \"test\" database driver does not support importing data."));
    }

    #[test]
    fn test_import_requires_a_selection() {
        let mut driver = MockDriver::new(ServerType::Mysql);
        let (code, output) = run(run_import, &mut driver, &CommandOptions::default());
        assert_eq!(code, 1);
        assert!(output.contains("Either the --table or --all option"));
        assert!(driver.executed.is_empty());
    }

    #[test]
    fn test_import_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = MockDriver::new(ServerType::Mysql);
        let options = CommandOptions {
            table: Some("dbtest".to_string()),
            folder: dir.path().to_path_buf(),
            ..CommandOptions::default()
        };
        let (code, output) = run(run_import, &mut driver, &options);
        assert_eq!(code, 1);
        assert!(output.contains("The dbtest.xml file does not exist."));
    }

    #[test]
    fn test_export_then_import_all() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockDriver::mysql_jos_test();
        let options = CommandOptions {
            all: true,
            folder: dir.path().to_path_buf(),
            ..CommandOptions::default()
        };

        let (code, output) = run(run_export, &mut source, &options);
        assert_eq!(code, 0, "{output}");
        assert!(output.contains("Export completed in"));
        assert!(dir.path().join("jos_test.xml").is_file());

        let mut target = MockDriver::new(ServerType::Mysql);
        let (code, output) = run(run_import, &mut target, &options);
        assert_eq!(code, 0, "{output}");
        assert!(output.contains("Import completed in"));

        let executed = target.executed_sql();
        assert!(executed[0].starts_with("CREATE TABLE IF NOT EXISTS `jos_test`"));
        assert_eq!(executed.len(), 3);
    }
}

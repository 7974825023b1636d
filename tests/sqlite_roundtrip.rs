//! End-to-end export and import against SQLite database files.

use rusqlite::Connection;
use sqlport::command::{run_export, run_import, CommandOptions};
use sqlport::config::DriverOptions;
use sqlport::core::db::driver::DatabaseDriver;
use sqlport::factory::DatabaseFactory;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn options(path: &Path, prefix: &str) -> DriverOptions {
    DriverOptions {
        driver: "sqlite".to_string(),
        path: Some(path.to_path_buf()),
        prefix: prefix.to_string(),
        ..DriverOptions::default()
    }
}

fn source_database(dir: &TempDir) -> DriverOptions {
    let path = dir.path().join("source.db");
    let connection = Connection::open(&path).unwrap();
    connection
        .execute_batch(
            "
            CREATE TABLE jos_items (id INTEGER PRIMARY KEY, title TEXT NOT NULL, note TEXT);
            INSERT INTO jos_items (id, title, note) VALUES (1, 'First', NULL);
            INSERT INTO jos_items (id, title, note) VALUES (2, 'Second', '');
            ",
        )
        .unwrap();
    options(&path, "jos_")
}

fn export_all(source: &DriverOptions, folder: &Path) {
    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver("sqlite", source).unwrap();
    let command = CommandOptions {
        all: true,
        folder: folder.to_path_buf(),
        ..CommandOptions::default()
    };
    let mut out = Vec::new();
    let code = run_export(&factory, driver.as_mut(), &command, &mut out).unwrap();
    assert_eq!(code, 0, "{}", String::from_utf8_lossy(&out));
}

fn notes(path: &Path, table: &str) -> Vec<(i64, Option<String>)> {
    let connection = Connection::open(path).unwrap();
    let mut statement = connection
        .prepare(&format!("SELECT id, note FROM {table} ORDER BY id"))
        .unwrap();
    let rows = statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.collect::<rusqlite::Result<Vec<_>>>().unwrap()
}

#[test]
fn test_export_writes_generic_dump() {
    let dir = TempDir::new().unwrap();
    let source = source_database(&dir);
    let folder = dir.path().join("dump");
    export_all(&source, &folder);

    let xml = fs::read_to_string(folder.join("jos_items.xml")).unwrap();
    insta::assert_snapshot!(xml, @r###"
    <?xml version="1.0"?>
    <mysqldump xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
     <database name="">
      <table_structure name="#__items">
       <field name="id" type="INTEGER" notnull="0" pk="1"/>
       <field name="title" type="TEXT" notnull="1" pk="0"/>
       <field name="note" type="TEXT" notnull="0" pk="0"/>
      </table_structure>
      <table_data name="#__items">
       <row>
        <field name="id">1</field>
        <field name="title">First</field>
        <field name="note" xsi:nil="true"/>
       </row>
       <row>
        <field name="id">2</field>
        <field name="title">Second</field>
        <field name="note"></field>
       </row>
      </table_data>
     </database>
    </mysqldump>
    "###);
}

#[test]
fn test_import_recreates_table_under_new_prefix() {
    let dir = TempDir::new().unwrap();
    let source = source_database(&dir);
    let folder = dir.path().join("dump");
    export_all(&source, &folder);

    let target_path = dir.path().join("target.db");
    let target = options(&target_path, "site_");
    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver("sqlite", &target).unwrap();
    let command = CommandOptions {
        all: true,
        folder: folder.clone(),
        ..CommandOptions::default()
    };
    let mut out = Vec::new();
    let code = run_import(&factory, driver.as_mut(), &command, &mut out).unwrap();
    assert_eq!(code, 0, "{}", String::from_utf8_lossy(&out));

    assert_eq!(driver.table_list().unwrap(), vec!["site_items".to_string()]);
    driver.disconnect();

    // NULL and the empty string survive the trip as distinct values
    assert_eq!(
        notes(&target_path, "site_items"),
        vec![(1, None), (2, Some(String::new()))]
    );
}

#[test]
fn test_import_adds_missing_column_to_existing_table() {
    let dir = TempDir::new().unwrap();
    let source = source_database(&dir);
    let folder = dir.path().join("dump");
    export_all(&source, &folder);

    let target_path = dir.path().join("target.db");
    Connection::open(&target_path)
        .unwrap()
        .execute_batch("CREATE TABLE site_items (id INTEGER PRIMARY KEY, title TEXT NOT NULL);")
        .unwrap();

    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver("sqlite", &options(&target_path, "site_")).unwrap();
    let command = CommandOptions {
        table: Some("jos_items".to_string()),
        folder,
        ..CommandOptions::default()
    };
    let mut out = Vec::new();
    let code = run_import(&factory, driver.as_mut(), &command, &mut out).unwrap();
    assert_eq!(code, 0, "{}", String::from_utf8_lossy(&out));

    let columns = driver.table_columns("site_items").unwrap();
    assert_eq!(columns.keys().collect::<Vec<_>>(), vec!["id", "title", "note"]);
    driver.disconnect();
    assert_eq!(notes(&target_path, "site_items").len(), 2);
}

#[test]
fn test_import_all_reports_missing_dump_file() {
    let dir = TempDir::new().unwrap();
    let folder = dir.path().join("empty");
    fs::create_dir_all(&folder).unwrap();

    let target_path = dir.path().join("target.db");
    Connection::open(&target_path)
        .unwrap()
        .execute_batch("CREATE TABLE site_orphan (id INTEGER);")
        .unwrap();

    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver("sqlite", &options(&target_path, "site_")).unwrap();
    let command = CommandOptions {
        all: true,
        folder,
        ..CommandOptions::default()
    };
    let mut out = Vec::new();
    let code = run_import(&factory, driver.as_mut(), &command, &mut out).unwrap();
    let output = String::from_utf8(out).unwrap();
    assert_eq!(code, 1);
    assert!(output.contains("site_orphan: The site_orphan.xml file does not exist."), "{output}");
}

fn database(path: &Path, sql: &str) {
    Connection::open(path).unwrap().execute_batch(sql).unwrap();
}

fn import_one(target: &Path, table: &str, folder: &Path) -> (i32, String) {
    let factory = DatabaseFactory::new();
    let mut driver = factory.get_driver("sqlite", &options(target, "site_")).unwrap();
    let command = CommandOptions {
        table: Some(table.to_string()),
        folder: folder.to_path_buf(),
        ..CommandOptions::default()
    };
    let mut out = Vec::new();
    let code = run_import(&factory, driver.as_mut(), &command, &mut out).unwrap();
    driver.disconnect();
    (code, String::from_utf8(out).unwrap())
}

fn index_names(path: &Path, table: &str) -> Vec<(String, String)> {
    let connection = Connection::open(path).unwrap();
    let mut statement = connection
        .prepare(&format!("SELECT name, origin FROM pragma_index_list('{table}') ORDER BY name"))
        .unwrap();
    let rows = statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap();
    rows.collect::<rusqlite::Result<Vec<_>>>().unwrap()
}

#[test]
fn test_unique_constraint_matches_existing_table_under_new_prefix() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.db");
    database(
        &source_path,
        "CREATE TABLE jos_u (id INTEGER PRIMARY KEY, email TEXT UNIQUE);
         INSERT INTO jos_u (id, email) VALUES (1, 'a@example.com');",
    );
    let folder = dir.path().join("dump");
    export_all(&options(&source_path, "jos_"), &folder);

    let target_path = dir.path().join("target.db");
    database(&target_path, "CREATE TABLE site_u (id INTEGER PRIMARY KEY, email TEXT UNIQUE);");

    let (code, output) = import_one(&target_path, "jos_u", &folder);
    assert_eq!(code, 0, "{output}");
    assert_eq!(
        index_names(&target_path, "site_u"),
        vec![("sqlite_autoindex_site_u_1".to_string(), "u".to_string())]
    );
}

#[test]
fn test_text_primary_key_table_imports_twice() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.db");
    database(&source_path, "CREATE TABLE jos_v (email TEXT UNIQUE, code TEXT PRIMARY KEY);");
    let folder = dir.path().join("dump");
    export_all(&options(&source_path, "jos_"), &folder);

    let target_path = dir.path().join("target.db");
    let (code, output) = import_one(&target_path, "jos_v", &folder);
    assert_eq!(code, 0, "{output}");
    // Recreated constraints keep their autoindex numbering
    assert_eq!(
        index_names(&target_path, "site_v"),
        vec![
            ("sqlite_autoindex_site_v_1".to_string(), "u".to_string()),
            ("sqlite_autoindex_site_v_2".to_string(), "pk".to_string()),
        ]
    );

    let (code, output) = import_one(&target_path, "jos_v", &folder);
    assert_eq!(code, 0, "{output}");
}

#[test]
fn test_binary_and_control_characters_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.db");
    database(
        &source_path,
        "CREATE TABLE jos_files (id INTEGER PRIMARY KEY, data BLOB, note TEXT);
         INSERT INTO jos_files (id, data, note) VALUES (1, X'FF0080', 'a' || char(1) || 'b');",
    );
    let folder = dir.path().join("dump");
    export_all(&options(&source_path, "jos_"), &folder);

    let xml = fs::read_to_string(folder.join("jos_files.xml")).unwrap();
    assert!(xml.contains(r#"<field name="data" encoding="base64">/wCA</field>"#), "{xml}");
    assert!(!xml.contains('\u{1}'));

    let target_path = dir.path().join("target.db");
    let (code, output) = import_one(&target_path, "jos_files", &folder);
    assert_eq!(code, 0, "{output}");

    let connection = Connection::open(&target_path).unwrap();
    let (data, note): (Vec<u8>, String) = connection
        .query_row("SELECT data, note FROM site_files WHERE id = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(data, vec![0xff, 0x00, 0x80]);
    assert_eq!(note, "a\u{1}b");
}

/// Adapter Factory
///
/// The closed registry of supported adapters. Every constructor resolves the
/// adapter name here first, so an unknown name always surfaces as
/// [`DatabaseError::UnsupportedAdapter`].
use crate::adapters::mysql::{MysqlDialect, MysqlDriver, MysqlFlavor, MysqlReconciler};
use crate::adapters::sqlite::{SqliteDialect, SqliteDriver, SqliteReconciler};
use crate::config::DriverOptions;
use crate::core::db::driver::{DatabaseDriver, ResultCursor, ServerType};
use crate::core::db::iterator::DatabaseIterator;
use crate::core::{DatabaseError, Result};
use crate::diff::StructureReconciler;
use crate::exporter::DatabaseExporter;
use crate::importer::DatabaseImporter;
use crate::query::{DatabaseQuery, SqlDialect};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::debug;

/// Constructors for one adapter.
pub struct Connector {
    pub name: &'static str,
    pub server_type: ServerType,
    driver: fn(&DriverOptions) -> Box<dyn DatabaseDriver>,
    dialect: fn() -> Arc<dyn SqlDialect>,
    reconciler: fn() -> Box<dyn StructureReconciler>,
}

fn mysqli_driver(options: &DriverOptions) -> Box<dyn DatabaseDriver> {
    Box::new(MysqlDriver::new(MysqlFlavor::Mysqli, options))
}

fn pdo_mysql_driver(options: &DriverOptions) -> Box<dyn DatabaseDriver> {
    Box::new(MysqlDriver::new(MysqlFlavor::Pdo, options))
}

fn mysql_dialect() -> Arc<dyn SqlDialect> {
    Arc::new(MysqlDialect)
}

fn mysql_reconciler() -> Box<dyn StructureReconciler> {
    Box::new(MysqlReconciler)
}

fn sqlite_driver(options: &DriverOptions) -> Box<dyn DatabaseDriver> {
    Box::new(SqliteDriver::new(options))
}

fn sqlite_dialect() -> Arc<dyn SqlDialect> {
    Arc::new(SqliteDialect)
}

fn sqlite_reconciler() -> Box<dyn StructureReconciler> {
    Box::new(SqliteReconciler)
}

static CONNECTORS: Lazy<IndexMap<&'static str, Connector>> = Lazy::new(|| {
    let connectors = [
        Connector {
            name: "mysqli",
            server_type: ServerType::Mysql,
            driver: mysqli_driver,
            dialect: mysql_dialect,
            reconciler: mysql_reconciler,
        },
        Connector {
            name: "mysql",
            server_type: ServerType::Mysql,
            driver: pdo_mysql_driver,
            dialect: mysql_dialect,
            reconciler: mysql_reconciler,
        },
        Connector {
            name: "sqlite",
            server_type: ServerType::Sqlite,
            driver: sqlite_driver,
            dialect: sqlite_dialect,
            reconciler: sqlite_reconciler,
        },
    ];
    connectors.into_iter().map(|c| (c.name, c)).collect()
});

/// Builds drivers, queries, exporters, importers and iterators by adapter name.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseFactory;

impl DatabaseFactory {
    pub fn new() -> Self {
        DatabaseFactory
    }

    fn connector(&self, name: &str) -> Result<&'static Connector> {
        CONNECTORS
            .get(name)
            .ok_or_else(|| DatabaseError::UnsupportedAdapter(name.to_string()))
    }

    /// Names of every registered adapter.
    pub fn connectors(&self) -> Vec<&'static str> {
        CONNECTORS.keys().copied().collect()
    }

    pub fn is_supported(&self, name: &str) -> bool {
        CONNECTORS.contains_key(name)
    }

    /// Builds an unconnected driver; the connection opens on first use.
    pub fn get_driver(&self, name: &str, options: &DriverOptions) -> Result<Box<dyn DatabaseDriver>> {
        let connector = self.connector(name)?;
        debug!("Building {} driver", connector.name);
        Ok((connector.driver)(options))
    }

    /// Builds an empty query, from `driver` when one is given.
    pub fn get_query(&self, name: &str, driver: Option<&dyn DatabaseDriver>) -> Result<DatabaseQuery> {
        let connector = self.connector(name)?;
        Ok(match driver {
            Some(driver) => driver.create_query(),
            None => DatabaseQuery::new((connector.dialect)()),
        })
    }

    pub fn get_exporter<'a>(
        &self,
        name: &str,
        driver: Option<&'a mut dyn DatabaseDriver>,
    ) -> Result<DatabaseExporter<'a>> {
        let connector = self.connector(name)?;
        let mut exporter = DatabaseExporter::new(connector.server_type);
        if let Some(driver) = driver {
            exporter.set_dbo(driver);
        }
        Ok(exporter)
    }

    pub fn get_importer<'a>(
        &self,
        name: &str,
        driver: Option<&'a mut dyn DatabaseDriver>,
    ) -> Result<DatabaseImporter<'a>> {
        let connector = self.connector(name)?;
        let mut importer = DatabaseImporter::new(connector.server_type, (connector.reconciler)());
        if let Some(driver) = driver {
            importer.set_dbo(driver);
        }
        Ok(importer)
    }

    pub fn get_iterator<'s>(
        &self,
        name: &str,
        cursor: Box<dyn ResultCursor + 's>,
        key_column: Option<&str>,
    ) -> Result<DatabaseIterator<'s>> {
        self.connector(name)?;
        DatabaseIterator::new(cursor, key_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::query::StatementType;
    use crate::test_utils::{record, MockDriver, VecCursor};

    fn unsupported<T>(result: Result<T>) -> bool {
        matches!(result, Err(DatabaseError::UnsupportedAdapter(name)) if name == "mariadb")
    }

    #[test]
    fn test_registry() {
        let factory = DatabaseFactory::new();
        assert_eq!(factory.connectors(), vec!["mysqli", "mysql", "sqlite"]);
        assert!(factory.is_supported("sqlite"));
        assert!(!factory.is_supported("mariadb"));
    }

    #[test]
    fn test_get_driver() {
        let factory = DatabaseFactory::new();
        let driver = factory.get_driver("mysqli", &DriverOptions::default()).unwrap();
        assert_eq!(driver.name(), "mysqli");
        assert!(!driver.connected());

        let driver = factory.get_driver("mysql", &DriverOptions::default()).unwrap();
        assert_eq!(driver.name(), "mysql");
        assert_eq!(driver.server_type(), ServerType::Mysql);

        assert!(unsupported(factory.get_driver("mariadb", &DriverOptions::default())));
    }

    #[test]
    fn test_get_query() {
        let factory = DatabaseFactory::new();
        let mut query = factory.get_query("sqlite", None).unwrap();
        query.select(["*"]).unwrap().from(["t"]).unwrap().limit(0, 5).unwrap();
        assert_eq!(query.render().unwrap(), "SELECT *\nFROM t LIMIT -1 OFFSET 5");

        let driver = MockDriver::new(ServerType::Mysql);
        let query = factory.get_query("mysqli", Some(&driver as &dyn DatabaseDriver)).unwrap();
        assert_eq!(query.statement_type(), StatementType::Unknown);
        assert_eq!(query.quote_name("a", None), "`a`");

        assert!(unsupported(factory.get_query("mariadb", None)));
    }

    #[test]
    fn test_get_exporter_injects_driver() {
        let factory = DatabaseFactory::new();
        let exporter = factory.get_exporter("mysqli", None).unwrap();
        assert!(!exporter.has_dbo());

        let mut driver = MockDriver::new(ServerType::Mysql);
        let mut exporter = factory.get_exporter("mysqli", Some(&mut driver as &mut dyn DatabaseDriver)).unwrap();
        assert!(exporter.has_dbo());
        exporter.from(["#__dbtest"]).unwrap();
        assert!(exporter.check().is_ok());

        assert!(unsupported(factory.get_exporter("mariadb", None)));
    }

    #[test]
    fn test_get_importer_injects_driver() {
        let factory = DatabaseFactory::new();
        let importer = factory.get_importer("sqlite", None).unwrap();
        assert!(!importer.has_dbo());
        assert_eq!(importer.server_type(), ServerType::Sqlite);

        let mut driver = MockDriver::new(ServerType::Mysql);
        let importer = factory.get_importer("mysqli", Some(&mut driver as &mut dyn DatabaseDriver)).unwrap();
        assert!(importer.has_dbo());

        assert!(unsupported(factory.get_importer("mariadb", None)));
    }

    #[test]
    fn test_get_iterator() {
        let factory = DatabaseFactory::new();
        let cursor = Box::new(VecCursor::new(&["id"], vec![record(&[("id", Value::Integer(7))])]));
        let rows: Vec<_> = factory
            .get_iterator("mysqli", cursor, Some("id"))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows[0].0, Value::Integer(7));

        let cursor = Box::new(VecCursor::new(&[], Vec::new()));
        assert!(unsupported(factory.get_iterator("mariadb", cursor, None)));
    }
}

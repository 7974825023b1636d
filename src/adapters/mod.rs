/// Database Adapters
///
/// Each adapter bundles a driver, the SQL dialect it renders with and the
/// reconciler the importer uses to produce DDL for it.
pub mod mysql;
pub mod sqlite;

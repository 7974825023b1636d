/// SQLite Adapter
mod dialect;
mod driver;
mod reconciler;

pub use dialect::SqliteDialect;
pub use driver::SqliteDriver;
pub use reconciler::SqliteReconciler;

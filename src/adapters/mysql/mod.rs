/// MySQL Adapter
///
/// One driver serves both MySQL adapter names; the flavor only changes the
/// name reported in errors and by the factory.
mod dialect;
mod driver;
mod reconciler;

pub use dialect::MysqlDialect;
pub use driver::{MysqlDriver, MysqlFlavor};
pub use reconciler::MysqlReconciler;

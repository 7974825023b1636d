/// Database Module
///
/// The driver-facing layer of sqlport, split into two concerns:
/// - **Driver Contract** (`driver.rs`): the capability traits every adapter
///   implements, statement handles, cursors and prefix substitution
/// - **Result Iteration** (`iterator.rs`): lazy, single-pass iteration over a
///   cursor with optional key-column indexing
///
/// ## Error Handling
///
/// All operations use the standardized `DatabaseError` type for consistent error propagation.
pub mod driver;
pub mod iterator;

pub use driver::*;
pub use iterator::*;

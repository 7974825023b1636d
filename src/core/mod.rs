/// Core Module for sqlport
///
/// This module contains the fundamental components shared by every adapter:
/// the driver contract, result iteration, cell values and error handling.

pub mod db;
pub mod error;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{DatabaseError, Result};
pub use value::{BoundParams, Record, Value};

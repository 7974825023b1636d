/// sqlport Error Module
///
/// This module defines the error taxonomy shared by drivers, the query
/// builder, the dump codec, the importer and the exporter. Every fallible
/// operation in the crate returns [`Result`].
use thiserror::Error;

/// Comprehensive error type for sqlport.
///
/// The first five variants form the reporting taxonomy used by import and
/// export runs:
/// - unsupported adapters requested from the factory
/// - precondition failures raised by the check phase, before any I/O
/// - missing per-table import files
/// - structural reconciliation failures (DDL that could not be produced or applied)
/// - execution failures surfaced by a backend, with adapter context
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The adapter name is not present in the factory registry
    #[error("The {0} adapter is not supported.")]
    UnsupportedAdapter(String),

    /// Check phase failure; the message is reported verbatim
    #[error("{0}")]
    Precondition(String),

    /// A file required by an import run does not exist
    #[error("The {file} file does not exist.")]
    MissingResource { file: String },

    /// A table could not be brought into conformance with its declared structure
    #[error("Cannot reconcile structure of table {table}{}: {message}", .column.as_ref().map(|c| format!(" (column {c})")).unwrap_or_default())]
    Reconciliation {
        table: String,
        column: Option<String>,
        message: String,
    },

    /// A statement failed inside the backend
    #[error("[{adapter}] {message}{}", .sql.as_ref().map(|s| format!(" (SQL: {s})")).unwrap_or_default())]
    Execution {
        adapter: String,
        sql: Option<String>,
        message: String,
    },

    /// Query builder misuse (incompatible clause, inconsistent INSERT, mixed bindings)
    #[error("Query error: {0}")]
    QueryState(String),

    /// A setter rejected its argument at assignment time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Result iteration errors (missing key column, rewinding a consumed iterator)
    #[error("Iterator error: {0}")]
    Iterator(String),

    /// Malformed or out-of-order dump documents
    #[error("XML error: {0}")]
    Xml(String),

    /// Connection could not be opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatabaseError {
    /// Builds an execution failure for `adapter`, optionally naming the failing statement.
    pub fn execution(adapter: &str, sql: Option<&str>, err: impl std::fmt::Display) -> Self {
        DatabaseError::Execution {
            adapter: adapter.to_string(),
            sql: sql.map(str::to_string),
            message: err.to_string(),
        }
    }

    /// Builds a reconciliation failure for `table`.
    pub fn reconciliation(table: &str, column: Option<&str>, message: impl Into<String>) -> Self {
        DatabaseError::Reconciliation {
            table: table.to_string(),
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}

impl From<quick_xml::Error> for DatabaseError {
    fn from(err: quick_xml::Error) -> Self {
        DatabaseError::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for DatabaseError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        DatabaseError::Xml(err.to_string())
    }
}

/// Type alias for Result to use DatabaseError as the error type.
pub type Result<T> = std::result::Result<T, DatabaseError>;

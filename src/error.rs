//! Error types for the database manager.
//!
//! This module defines all error types using `thiserror`. Most public entry points
//! on [`DbManager`](crate::DbManager) convert these errors into a logged `false`
//! (or `None`); the typed variants surface directly only where the caller opted
//! into it (the THROW binding mode, or `dev_mode` when beginning a transaction).

use thiserror::Error;

/// The kind of registry entry a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A defined connection configuration
    Database,
    /// A live (connected) connection
    Connection,
    /// A registered query template
    Query,
    /// A prepared operation
    Operation,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Operation => write!(f, "operation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Manager not started: {reason}")]
    NotStarted { reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Prepare failed for operation {operation_id}: {message}")]
    PrepareFailed { operation_id: i64, message: String },

    #[error("Binding {placeholder} failed on operation {operation_id}: {message}")]
    BindFailed {
        operation_id: i64,
        placeholder: String,
        message: String,
    },

    #[error("Execution of operation {operation_id} failed: {message}")]
    ExecuteFailed { operation_id: i64, message: String },

    #[error("Transaction error: {message} (connection: {connection_id})")]
    TransactionState {
        message: String,
        connection_id: String,
    },

    #[error("Invalid isolation level: {level}")]
    InvalidIsolationLevel { level: String },

    #[error("Operation {operation_id} already exists")]
    OperationExists { operation_id: i64 },

    #[error("Invalid operator: {operator}")]
    InvalidOperator { operator: String },

    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    #[error("Query builder not ready: {message}")]
    NotReady { message: String },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self::NotStarted {
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: ResourceKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn prepare_failed(operation_id: i64, message: impl Into<String>) -> Self {
        Self::PrepareFailed {
            operation_id,
            message: message.into(),
        }
    }

    pub fn bind_failed(
        operation_id: i64,
        placeholder: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BindFailed {
            operation_id,
            placeholder: placeholder.into(),
            message: message.into(),
        }
    }

    pub fn execute_failed(operation_id: i64, message: impl Into<String>) -> Self {
        Self::ExecuteFailed {
            operation_id,
            message: message.into(),
        }
    }

    /// Create a transaction state error (double begin, commit without begin, ...).
    pub fn transaction(message: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self::TransactionState {
            message: message.into(),
            connection_id: connection_id.into(),
        }
    }

    pub fn invalid_operator(operator: impl Into<String>) -> Self {
        Self::InvalidOperator {
            operator: operator.into(),
        }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

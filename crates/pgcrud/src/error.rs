//! Error types for pgcrud

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pgcrud operations
pub type CrudResult<T> = Result<T, CrudError>;

/// Outcome code reported on every [`CrudResponse`](crate::response::CrudResponse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultCode {
    Success,
    ParamsError,
    UnsupportedType,
    ConnectionError,
    ExecutionError,
    NotFound,
    UnknownError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ParamsError => "paramsError",
            Self::UnsupportedType => "unsupportedType",
            Self::ConnectionError => "connectionError",
            Self::ExecutionError => "executionError",
            Self::NotFound => "notFound",
            Self::UnknownError => "unknownError",
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for CRUD operations
#[derive(Debug, Error)]
pub enum CrudError {
    /// Caller preconditions violated (missing table, empty fields, conflicting filters)
    #[error("Params error: {0}")]
    Params(String),

    /// A record lacks a value for one of the target columns
    #[error("Record #{record}: required field '{column}' is missing")]
    RequiredField { record: usize, column: String },

    /// The value coercer could not handle a field value
    #[error("Unsupported field type for '{column}': {message}")]
    UnsupportedType { column: String, message: String },

    /// Pool acquisition or connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution error
    #[error("Execution error: {0}")]
    Execution(#[from] tokio_postgres::Error),

    /// Constraint violation reported by the database
    #[error("Constraint violation ({constraint}): {message}")]
    Constraint { constraint: String, message: String },

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The audit sink failed to persist a record
    #[error("Audit error: {0}")]
    Audit(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl CrudError {
    /// Create a params error
    pub fn params(message: impl Into<String>) -> Self {
        Self::Params(message.into())
    }

    /// Create an unsupported-type error for a specific column
    pub fn unsupported(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedType {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Check if this is a params error
    pub fn is_params(&self) -> bool {
        matches!(self, Self::Params(_) | Self::RequiredField { .. })
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Map the error onto the response taxonomy.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Params(_) | Self::RequiredField { .. } => ResultCode::ParamsError,
            Self::UnsupportedType { .. } => ResultCode::UnsupportedType,
            Self::Connection(_) => ResultCode::ConnectionError,
            Self::Execution(_) | Self::Constraint { .. } | Self::Decode { .. } => {
                ResultCode::ExecutionError
            }
            Self::NotFound(_) => ResultCode::NotFound,
            Self::Audit(_) | Self::Serialization(_) | Self::Other(_) => ResultCode::UnknownError,
        }
    }

    /// Parse a tokio_postgres error into a more specific CrudError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            // unique, foreign key, check
            if matches!(db_err.code().code(), "23505" | "23503" | "23514") {
                return Self::Constraint {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    message: db_err.message().to_string(),
                };
            }
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Execution(err)
    }
}

impl From<deadpool_postgres::PoolError> for CrudError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for CrudError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

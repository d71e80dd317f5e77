//! Error types for dbkit.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Lookups of unknown datasources get their own variants so callers can tell a wiring
//! defect apart from an ordinary runtime failure.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Record not found")]
    RecordNotFound,

    #[error("Timeout: {operation} exceeded {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("No such datasource '{name}' configured")]
    DatasourceNotConfigured { name: String },

    #[error("No default datasource configured")]
    NoDefaultDatasource,

    #[error("Startup failed at {stage}: {source}")]
    Startup {
        stage: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
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

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn datasource_not_configured(name: impl Into<String>) -> Self {
        Self::DatasourceNotConfigured { name: name.into() }
    }

    /// Wrap an error with the startup stage it happened in.
    pub fn startup(stage: impl Into<String>, source: DbError) -> Self {
        Self::Startup {
            stage: stage.into(),
            source: Box::new(source),
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
            Self::DatasourceNotConfigured { .. } => {
                Some("Add the datasource to the configuration or fix the name in code")
            }
            Self::NoDefaultDatasource => Some("Configure a datasource named 'default'"),
            _ => None,
        }
    }

    /// True for lookups of datasources that were never configured.
    ///
    /// Datasource names are wired into application code, so these indicate a
    /// static defect rather than a transient condition.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::DatasourceNotConfigured { .. } | Self::NoDefaultDatasource
        )
    }

    pub fn is_record_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound)
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::RecordNotFound,
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", Duration::from_secs(30))
            }
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
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
            sqlx::Error::ColumnNotFound(col) => DbError::database(
                format!("Column not found: {}", col),
                None,
                "Check that the row type matches the selected columns",
            ),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_timeout_reports_sub_second_limits() {
        let err = DbError::timeout("fetch_count", Duration::from_millis(250));
        assert_eq!(err.to_string(), "Timeout: fetch_count exceeded 250ms");
        let err = DbError::timeout("execute", Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout: execute exceeded 30s");
    }

    #[test]
    fn test_programming_errors() {
        assert!(DbError::datasource_not_configured("reporting").is_programming_error());
        assert!(DbError::NoDefaultDatasource.is_programming_error());
        assert!(!DbError::RecordNotFound.is_programming_error());
        assert!(!DbError::invalid_input("orderBy").is_programming_error());
    }

    #[test]
    fn test_not_configured_names_datasource() {
        let err = DbError::datasource_not_configured("reporting");
        assert_eq!(err.to_string(), "No such datasource 'reporting' configured");
    }

    #[test]
    fn test_row_not_found_maps_to_record_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(err.is_record_not_found());
    }

    #[test]
    fn test_startup_wraps_stage() {
        let err = DbError::startup(
            "open datasource 'reporting'",
            DbError::connection("refused", "check server"),
        );
        let text = err.to_string();
        assert!(text.contains("open datasource 'reporting'"));
        assert!(text.contains("refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

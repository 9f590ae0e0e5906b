//! Error types for the audit store.
//!
//! All storage failures are expressed as [`DbError`]. Variants carry enough
//! structure for the command layer to report the failing step and for
//! supervisors to tell recoverable conditions apart from fatal ones.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection pool exhausted: no connection available after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g., "42P01" for undefined table, "57014" for statement timeout
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Health check failed for {target}")]
    HealthCheckFailed { target: String },

    #[error("Migration aborted at step '{step}': {source}")]
    MigrationAborted {
        step: &'static str,
        #[source]
        source: Box<DbError>,
    },

    #[error("Fatal pool error: {message}")]
    Fatal { message: String },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

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

    pub fn pool_exhausted(waited_ms: u64) -> Self {
        Self::PoolExhausted { waited_ms }
    }

    /// Create a statement error with optional SQL state.
    pub fn statement(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn health_check_failed(target: impl Into<String>) -> Self {
        Self::HealthCheckFailed {
            target: target.into(),
        }
    }

    /// Wrap a step failure so callers can report which step broke the run.
    pub fn migration_aborted(step: &'static str, source: DbError) -> Self {
        Self::MigrationAborted {
            step,
            source: Box::new(source),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
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
            Self::Statement { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Increase max connections or the connect timeout, or reduce concurrent load")
            }
            Self::MigrationAborted { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// SQLSTATE reported by the store, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Statement { sql_state, .. } => sql_state.as_deref(),
            Self::MigrationAborted { source, .. } => source.sql_state(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::PoolExhausted { .. })
    }

    /// Check if this error means the pool can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal { .. } => true,
            Self::MigrationAborted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Name of the migration step that failed, for `MigrationAborted` errors.
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Self::MigrationAborted { step, .. } => Some(step),
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
                let suggestion = statement_suggestion(code.as_deref());
                DbError::statement(db_err.message(), code, suggestion)
            }
            sqlx::Error::RowNotFound => DbError::statement(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // Waited time is filled in by the pool, which knows its timeout.
            sqlx::Error::PoolTimedOut => DbError::pool_exhausted(0),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Create a new pool")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::fatal(format!("Protocol error: {}", msg)),
            sqlx::Error::WorkerCrashed => DbError::fatal("Database worker crashed"),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

fn statement_suggestion(sql_state: Option<&str>) -> &'static str {
    match sql_state {
        Some("57014") => "The statement exceeded the statement timeout; raise it or narrow the query",
        Some("23505") | Some("2067") | Some("1555") => {
            "A unique constraint was violated; the row already exists"
        }
        Some("23503") | Some("787") => "A foreign key constraint was violated",
        Some("42P01") => "A referenced table does not exist; run the migration first",
        _ => "Check the SQL syntax and referenced objects",
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
        let err = DbError::statement(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.sql_state(), Some("42601"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::pool_exhausted(2000).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
        assert!(!DbError::fatal("worker crashed").is_retryable());
    }

    #[test]
    fn test_pool_timed_out_maps_to_pool_exhausted() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted { .. }));
    }

    #[test]
    fn test_worker_crash_is_fatal() {
        let err: DbError = sqlx::Error::WorkerCrashed.into();
        assert!(err.is_fatal());

        let err: DbError = sqlx::Error::Protocol("unexpected message".into()).into();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pool_closed_is_not_fatal() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_migration_aborted_reports_step_and_source() {
        let err = DbError::migration_aborted(
            "create_indexes",
            DbError::statement("relation missing", Some("42P01".to_string()), "run migrate"),
        );
        assert_eq!(err.failed_step(), Some("create_indexes"));
        assert_eq!(err.sql_state(), Some("42P01"));
        assert!(err.to_string().contains("create_indexes"));
        assert!(err.to_string().contains("relation missing"));
    }

    #[test]
    fn test_fatal_propagates_through_migration_aborted() {
        let err = DbError::migration_aborted("create_tables", DbError::fatal("crashed"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_statement_timeout_suggestion() {
        assert!(statement_suggestion(Some("57014")).contains("timeout"));
        assert!(statement_suggestion(None).contains("SQL syntax"));
    }
}

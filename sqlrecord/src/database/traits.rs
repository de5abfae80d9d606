//! Database driver trait
//!
//! This trait defines the interface that all database drivers must provide.
//! The core reaches the underlying database only through it: every statement
//! text and bound parameter list goes out through [`Driver::run`].

use crate::dialect::Dialect;
use crate::query::Statement;
use crate::value::SqlValue;
use async_trait::async_trait;
use thiserror::Error;

/// Driver trait for executing statements on one database session
///
/// Implementations own exactly one session. They are driven sequentially by
/// a single [`Connection`](crate::Connection); no method is called
/// concurrently with another.
#[async_trait]
pub trait Driver: Send + 'static {
    /// SQL dialect the driver speaks
    fn dialect(&self) -> Dialect;

    /// Execute a statement with its bound parameters
    ///
    /// # Arguments
    ///
    /// * `statement` - SQL text plus positional parameters
    ///
    /// # Returns
    ///
    /// The rows produced by the statement (empty for statements that do not
    /// return rows) and the number of rows affected
    async fn run(&mut self, statement: &Statement) -> Result<RowSet, DriverError>;

    /// List the column names of an existing table, in ordinal order
    ///
    /// # Returns
    ///
    /// An empty vector when the table does not exist
    async fn table_columns(&mut self, table: &str) -> Result<Vec<String>, DriverError>;

    /// Release the session
    ///
    /// Calling this on an already closed driver is a no-op.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Raw result of one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in the result
    pub columns: Vec<String>,

    /// Rows returned, one value per column
    pub rows: Vec<Vec<SqlValue>>,

    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    pub rows_affected: u64,
}

impl RowSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First value of the first row, if any
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Driver error type
#[derive(Debug, Error)]
pub enum DriverError {
    /// Error reported by the database server (syntax, constraint violation, ...)
    #[error("database error{}: {message}", code_suffix(.code))]
    Database {
        message: String,
        code: Option<String>,
    },

    /// Transport failure talking to the database
    #[error("I/O error: {0}")]
    Io(String),

    /// A returned value could not be read
    #[error("cannot read column `{column}`: {reason}")]
    Column { column: String, reason: String },

    /// The session has already been released
    #[error("session is closed")]
    Closed,

    /// Any other driver failure
    #[error("driver error: {0}")]
    Other(String),
}

impl From<sqlx::Error> for DriverError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(database_error) => DriverError::Database {
                message: database_error.message().to_string(),
                code: database_error.code().map(|code| code.into_owned()),
            },
            sqlx::Error::Io(io_error) => DriverError::Io(io_error.to_string()),
            sqlx::Error::ColumnDecode { index, source } => DriverError::Column {
                column: index,
                reason: source.to_string(),
            },
            other => DriverError::Other(other.to_string()),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref()
        .map(|code| format!(" [{}]", code))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display_includes_code() {
        let error = DriverError::Database {
            message: "duplicate key value".to_string(),
            code: Some("23505".to_string()),
        };
        assert_eq!(error.to_string(), "database error [23505]: duplicate key value");

        let error = DriverError::Database {
            message: "near \"SELCT\": syntax error".to_string(),
            code: None,
        };
        assert_eq!(error.to_string(), "database error: near \"SELCT\": syntax error");
    }

    #[test]
    fn test_scalar() {
        let rows = RowSet {
            columns: vec!["count".to_string()],
            rows: vec![vec![SqlValue::Integer(3)]],
            rows_affected: 0,
        };
        assert_eq!(rows.scalar(), Some(&SqlValue::Integer(3)));
        assert_eq!(RowSet::default().scalar(), None);
    }
}

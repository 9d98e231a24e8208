//! Port to a relational database.
//!
//! The query builder only produces [`SqlStatement`]s; an executor runs them.
//! The MySQL pool in [`crate::db`] is the production executor.

use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

use crate::error::GridError;
use crate::query::sql::SqlStatement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlErrorKind {
    /// Could not obtain a connection (bad URL, server down, pool exhausted)
    Connection,
    /// `ALTER TABLE ... ADD COLUMN` for a column that already exists
    DuplicateColumn,
    Query,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlError {
    pub kind: SqlErrorKind,
    pub message: String,
}

impl SqlError {
    pub fn connection(message: impl Into<String>) -> Self {
        SqlError {
            kind: SqlErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = if message.contains("Duplicate column") {
            SqlErrorKind::DuplicateColumn
        } else {
            SqlErrorKind::Query
        };
        SqlError { kind, message }
    }

    pub fn into_grid_error(self, operation: &str) -> GridError {
        GridError::database(operation, self.message)
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SqlError {}

/// Blocking executor for parameterized statements.
pub trait SqlExecutor: Send + Sync {
    /// Run a `SELECT COUNT(*) AS total ...` and return the count.
    fn fetch_count(&self, statement: &SqlStatement) -> Result<u64, SqlError>;

    /// Run a query projecting `row_json` and return each row's fields.
    fn fetch_rows(&self, statement: &SqlStatement) -> Result<Vec<Map<String, JsonValue>>, SqlError>;

    /// Run a write and return the number of affected rows.
    fn execute(&self, statement: &SqlStatement) -> Result<usize, SqlError>;
}

pub type SharedExecutor = Arc<dyn SqlExecutor>;

/// Run blocking executor work off the async runtime.
pub async fn run_blocking<T, F>(executor: &SharedExecutor, work: F) -> Result<T, SqlError>
where
    T: Send + 'static,
    F: FnOnce(&dyn SqlExecutor) -> Result<T, SqlError> + Send + 'static,
{
    let executor = Arc::clone(executor);
    tokio::task::spawn_blocking(move || work(executor.as_ref()))
        .await
        .map_err(|e| SqlError::query(format!("Database task failed: {}", e)))?
}

/// Parse a `row_json` column produced by [`crate::query::sql::json_projection`].
pub fn parse_row_json(raw: &str) -> Result<Map<String, JsonValue>, SqlError> {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(other) => Err(SqlError::query(format!("Expected JSON object row, got {}", other))),
        Err(e) => Err(SqlError::query(format!("Malformed row JSON: {}", e))),
    }
}

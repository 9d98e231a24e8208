//! Error type shared by the registry, query builder and grid service.

use std::fmt;

/// Errors raised while resolving, reading or mutating a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// No grid with this id is registered
    ConfigNotFound(String),
    /// Invalid configuration or environment (bad YAML, malformed DATABASE_URL, ...)
    Config(String),
    /// The request itself is malformed
    Validation(String),
    /// Attempted to write a column that is unknown or not editable
    NotEditable(String),
    /// A bulk action switched off in the grid config
    Disabled(String),
    /// The operation has no implementation for this data source type
    Unsupported(String),
    /// A row addressed by id does not exist
    NotFound(String),
    Database {
        operation: String,
        message: String,
    },
    Upstream {
        operation: String,
        status: Option<u16>,
        message: String,
    },
    /// Every row of a bulk operation failed
    BulkFailed {
        operation: String,
        errors: Vec<String>,
    },
}

impl GridError {
    pub fn database(operation: impl Into<String>, err: impl fmt::Display) -> Self {
        GridError::Database {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn upstream(operation: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        GridError::Upstream {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::ConfigNotFound(id) => {
                write!(f, "Grid configuration not found for ID: {}", id)
            }
            GridError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GridError::Validation(msg) => write!(f, "Validation error: {}", msg),
            GridError::NotEditable(field) => write!(f, "Field '{}' is not editable", field),
            GridError::Disabled(msg) => write!(f, "{}", msg),
            GridError::Unsupported(msg) => write!(f, "{}", msg),
            GridError::NotFound(msg) => write!(f, "{}", msg),
            GridError::Database { operation, message } => {
                write!(f, "Database error during {}: {}", operation, message)
            }
            GridError::Upstream { operation, status: Some(status), message } => {
                write!(f, "API request failed during {} ({}): {}", operation, status, message)
            }
            GridError::Upstream { operation, status: None, message } => {
                write!(f, "API request failed during {}: {}", operation, message)
            }
            GridError::BulkFailed { operation, errors } => {
                write!(f, "{} failed for all {} records", operation, errors.len())?;
                if let Some(first) = errors.first() {
                    write!(f, " (first error: {})", first)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for GridError {}

impl From<serde_json::Error> for GridError {
    fn from(e: serde_json::Error) -> Self {
        GridError::Validation(format!("Invalid JSON: {}", e))
    }
}

pub type GridResult<T> = Result<T, GridError>;

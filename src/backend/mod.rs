//! Data backends behind grids: a relational executor, REST upstreams, and
//! in-memory tables for static grids.

pub mod memory;
pub mod rest;
pub mod sql;

pub use memory::{MemoryStore, MemoryTable};
pub use rest::{ListPage, UpstreamApi};
pub use sql::{SharedExecutor, SqlError, SqlErrorKind, SqlExecutor};

use std::sync::Arc;

use crate::error::{GridError, GridResult};

/// Handles to every backend, shared by all grids
#[derive(Clone)]
pub struct Backends {
    /// Absent when no database is configured
    pub sql: Option<SharedExecutor>,
    pub upstream: UpstreamApi,
    pub memory: Arc<MemoryStore>,
}

impl Backends {
    pub fn new(sql: Option<SharedExecutor>, upstream: UpstreamApi, memory: MemoryStore) -> Self {
        Self {
            sql,
            upstream,
            memory: Arc::new(memory),
        }
    }

    pub fn sql(&self) -> GridResult<&SharedExecutor> {
        self.sql.as_ref().ok_or_else(|| {
            GridError::Config("No database connection configured (set DATABASE_URL)".to_string())
        })
    }

    pub fn memory_table(&self, grid_id: &str) -> GridResult<Arc<MemoryTable>> {
        self.memory
            .table(grid_id)
            .ok_or_else(|| GridError::ConfigNotFound(grid_id.to_string()))
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("sql", &self.sql.is_some())
            .field("upstream", &self.upstream)
            .field("memory", &self.memory)
            .finish()
    }
}

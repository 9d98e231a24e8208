//! # datagrid: Config-Driven Data Grid Server
//!
//! A grid is declared once in YAML and served over HTTP: paginated, searchable
//! and sortable reads, single-cell edits, and bulk edit, delete, archive and
//! CSV export. Rows come from one of three sources:
//!
//! - **MySQL** tables, through a lazily created Diesel pool (feature: `mysql`)
//! - **REST APIs**, with paging parameters forwarded upstream
//! - **Static** rows embedded in the config and kept mutable in memory
//!
//! ## Example: grid registry
//!
//! ```yaml
//! grids:
//!   employees:
//!     id: employees
//!     name: Employees
//!     dataSource:
//!       type: mysql
//!       connection: { table: employees, primaryKey: employee_id }
//!     columns:
//!       - { id: employee_id, label: Employee ID, type: number }
//!       - { id: first_name, label: First Name, type: string, editable: true }
//!     search:
//!       enabled: true
//!       searchableColumns: [first_name]
//!     expandable:
//!       enabled: true
//!       canExpand: { rule: fieldPresent, field: first_name }
//! ```
//!
//! ## Example: serving a registry
//!
//! ```ignore
//! let registry = GridRegistry::load_from_file("config/grids.yaml")?;
//! let state = AppState::new(registry, None);
//! datagrid::server::serve("0.0.0.0:5000".parse()?, state).await?;
//! ```

pub mod error;

// Grid definitions and the registry they load into
pub mod config;

// Query parameters, SQL generation, in-process filtering, CSV
pub mod query;

// Data backends and the relational pool
pub mod backend;
pub mod db;

pub mod service;
pub mod server;

// HTTP client with optimistic page cache
pub mod client;

pub use client::{ClientError, GridCache, GridClient, MutationTracker};
pub use config::{DataSource, ExpandRule, GridConfig, GridRegistry};
pub use error::{GridError, GridResult};
pub use query::{QueryParams, QueryResult, Row, RowId, RowKey, SortSpec};
pub use server::AppState;
pub use service::{DataResult, GridService};

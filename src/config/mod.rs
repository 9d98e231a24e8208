//! Grid configuration schema.
//!
//! A [`GridConfig`] describes one independently addressable grid: where its
//! rows come from, which columns it shows, and which features (search,
//! expansion, bulk actions) are switched on. Configs are loaded once into a
//! [`GridRegistry`] and never mutated afterwards.

pub mod expand;
pub mod registry;

pub use expand::ExpandRule;
pub use registry::GridRegistry;

use indexmap::IndexMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;

use crate::error::{GridError, GridResult};

/// Declarative configuration for one grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data_source: DataSource,
    pub columns: Vec<ColumnConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expandable: Option<ExpandableConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_actions: Option<BulkActionsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterConfig>,
}

/// Where a grid's rows live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSource {
    Mysql { connection: MysqlSource },
    Api { api: ApiSource },
    Static {
        #[serde(rename = "static")]
        source: StaticSource,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceKind {
    Mysql,
    Api,
    Static,
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceKind::Mysql => write!(f, "mysql"),
            DataSourceKind::Api => write!(f, "api"),
            DataSourceKind::Static => write!(f, "static"),
        }
    }
}

impl DataSource {
    pub fn kind(&self) -> DataSourceKind {
        match self {
            DataSource::Mysql { .. } => DataSourceKind::Mysql,
            DataSource::Api { .. } => DataSourceKind::Api,
            DataSource::Static { .. } => DataSourceKind::Static,
        }
    }

    /// Name of the field that identifies a row for this source
    pub fn primary_key(&self) -> &str {
        match self {
            DataSource::Mysql { connection } => &connection.primary_key,
            DataSource::Api { .. } => "id",
            DataSource::Static { source } => &source.primary_key,
        }
    }
}

/// Relational table backing a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MysqlSource {
    pub table: String,
    pub primary_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Third-party REST API backing a grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    pub base_url: String,
    pub endpoints: ApiEndpoints,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    /// Field holding the row array in enveloped list responses
    #[serde(default = "default_items_field")]
    pub items_field: String,
    #[serde(default = "default_total_field")]
    pub total_field: String,
    #[serde(default = "default_limit_param")]
    pub limit_param: String,
    #[serde(default = "default_skip_param")]
    pub skip_param: String,
    #[serde(default)]
    pub update_method: UpdateMethod,
    #[serde(default = "default_api_max_page_size")]
    pub max_page_size: usize,
}

/// Endpoint paths relative to `baseUrl`. `{id}` is replaced by the row's primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    pub list: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateMethod {
    #[default]
    Put,
    Patch,
}

impl ApiSource {
    pub fn list_url(&self) -> String {
        format!("{}{}", self.base_url, self.endpoints.list)
    }

    /// Expand an endpoint template for one row. The id fills exactly one
    /// path segment, so `/`, `?` and `#` in it are percent-encoded.
    pub fn row_url(&self, template: &str, id: &str) -> GridResult<String> {
        let raw = format!("{}{}", self.base_url, template.replace("{id}", ROW_ID_SLOT));
        let invalid = |reason: String| GridError::Config(format!("Invalid endpoint URL '{}': {}", raw, reason));
        let mut url = Url::parse(&raw).map_err(|e| invalid(e.to_string()))?;

        let segments: Vec<String> = url
            .path_segments()
            .ok_or_else(|| invalid("URL has no path".to_string()))?
            .map(str::to_string)
            .collect();
        let Some(slot) = segments.iter().position(|s| s == ROW_ID_SLOT) else {
            if raw.contains(ROW_ID_SLOT) {
                return Err(invalid("{id} must be a whole path segment".to_string()));
            }
            return Ok(url.to_string());
        };

        // Re-pushing the tail would encode its existing escapes twice
        let tail = segments[slot + 1..].join("/");
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| invalid("URL has no path".to_string()))?;
            for _ in slot..segments.len() {
                path.pop();
            }
            path.push(id);
        }
        if !tail.is_empty() {
            let path = format!("{}/{}", url.path(), tail);
            url.set_path(&path);
        }
        Ok(url.to_string())
    }
}

const ROW_ID_SLOT: &str = "__datagrid_row_id__";

/// Rows baked into the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticSource {
    pub data: Vec<Map<String, JsonValue>>,
    #[serde(default = "default_static_primary_key")]
    pub primary_key: String,
}

fn default_items_field() -> String {
    "items".to_string()
}

fn default_total_field() -> String {
    "total".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_skip_param() -> String {
    "skip".to_string()
}

fn default_api_max_page_size() -> usize {
    50_000
}

fn default_static_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pinned {
    Left,
    Right,
}

/// One grid column. `id` names the underlying field or table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConfig {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<Pinned>,
    #[serde(default)]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandableConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub can_expand: ExpandRule,
    #[serde(default)]
    pub single_expand: bool,
    #[serde(default)]
    pub default_expanded: bool,
    #[serde(default)]
    pub lazy_load: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkActionsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub actions: BulkActionFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkActionFlags {
    #[serde(default)]
    pub edit: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub archive: bool,
    #[serde(default)]
    pub export: bool,
    /// Client-rendered custom actions; the server only carries them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom: Vec<CustomBulkAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomBulkAction {
    pub id: String,
    pub label: String,
    pub icon: String,
    pub endpoint: String,
    pub method: String,
    #[serde(default)]
    pub confirmation_required: bool,
}

/// Built-in bulk operations gated by [`BulkActionFlags`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Edit,
    Delete,
    Archive,
    Export,
}

impl BulkAction {
    pub fn label(&self) -> &'static str {
        match self {
            BulkAction::Edit => "Bulk edit",
            BulkAction::Delete => "Bulk delete",
            BulkAction::Archive => "Bulk archive",
            BulkAction::Export => "Export",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    pub enabled: bool,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default)]
    pub page_size_options: Vec<usize>,
}

pub fn default_page_size() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    pub enabled: bool,
    #[serde(default)]
    pub searchable_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub enabled: bool,
    #[serde(default)]
    pub filterable_columns: Vec<String>,
}

/// Public subset of a grid config served by `GET /api/grids`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl GridConfig {
    pub fn column(&self, id: &str) -> Option<&ColumnConfig> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Resolve a column that may be written, or fail with `NotEditable`.
    pub fn editable_column(&self, field: &str) -> GridResult<&ColumnConfig> {
        match self.column(field) {
            Some(column) if column.editable => Ok(column),
            _ => Err(GridError::NotEditable(field.to_string())),
        }
    }

    pub fn primary_key(&self) -> &str {
        self.data_source.primary_key()
    }

    /// Columns a search term is matched against; empty when search is off.
    pub fn searchable_columns(&self) -> &[String] {
        match &self.search {
            Some(search) if search.enabled => &search.searchable_columns,
            _ => &[],
        }
    }

    pub fn search_enabled(&self) -> bool {
        self.search.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    pub fn bulk_action_enabled(&self, action: BulkAction) -> bool {
        let Some(bulk) = &self.bulk_actions else {
            return false;
        };
        if !bulk.enabled {
            return false;
        }
        match action {
            BulkAction::Edit => bulk.actions.edit,
            BulkAction::Delete => bulk.actions.delete,
            BulkAction::Archive => bulk.actions.archive,
            BulkAction::Export => bulk.actions.export,
        }
    }

    pub fn expandable_enabled(&self) -> Option<&ExpandableConfig> {
        self.expandable.as_ref().filter(|e| e.enabled)
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnSummary {
                    id: c.id.clone(),
                    label: c.label.clone(),
                    column_type: c.column_type,
                })
                .collect(),
        }
    }

    /// Check structural invariants that serde cannot express.
    pub fn validate(&self) -> GridResult<()> {
        if self.id.trim().is_empty() {
            return Err(GridError::Config("Grid id must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.id.as_str()) {
                return Err(GridError::Config(format!(
                    "Grid '{}' declares column '{}' more than once",
                    self.id, column.id
                )));
            }
        }

        let search_cols = self.search.iter().flat_map(|s| s.searchable_columns.iter());
        let filter_cols = self.filters.iter().flat_map(|f| f.filterable_columns.iter());
        for col in search_cols.chain(filter_cols) {
            if !seen.contains(col.as_str()) {
                return Err(GridError::Config(format!(
                    "Grid '{}' references unknown column '{}' in search/filter settings",
                    self.id, col
                )));
            }
        }

        if let DataSource::Mysql { connection } = &self.data_source {
            if connection.primary_key.is_empty() {
                return Err(GridError::Config(format!(
                    "Grid '{}' has an empty primaryKey",
                    self.id
                )));
            }
            let identifiers = std::iter::once(connection.table.as_str())
                .chain(std::iter::once(connection.primary_key.as_str()))
                .chain(self.columns.iter().map(|c| c.id.as_str()));
            for ident in identifiers {
                if !is_safe_identifier(ident) {
                    return Err(GridError::Config(format!(
                        "Grid '{}' uses '{}', which is not a valid SQL identifier",
                        self.id, ident
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Letters, digits and underscores, not starting with a digit.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

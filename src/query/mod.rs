//! Grid queries: request parameters, row identity, and operation results.
//!
//! The read path takes a [`QueryParams`] and yields a [`QueryResult`]; the write
//! path addresses rows by [`RowId`] and reports a [`FieldUpdateResult`] or
//! [`BulkResult`]. [`builder::QueryBuilder`] dispatches both to a backend.

pub mod builder;
pub mod csv;
pub mod filter;
pub mod sql;

pub use builder::QueryBuilder;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

use crate::config::{default_page_size, ColumnType, GridConfig};
use crate::error::{GridError, GridResult};

/// Upper bound on rows per page for relational grids
pub const MYSQL_MAX_PAGE_SIZE: usize = 1000;
/// Upper bound on rows per page for static grids
pub const STATIC_MAX_PAGE_SIZE: usize = 50_000;

/// One sort key, as sent by the grid's column headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

/// Generic read request understood by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(default)]
    pub page_index: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub search_text: String,
    /// Restricts the search to one searchable column
    #[serde(default)]
    pub filter_by: String,
    #[serde(default)]
    pub sort_by: Vec<SortSpec>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: default_page_size(),
            search_text: String::new(),
            filter_by: String::new(),
            sort_by: Vec::new(),
        }
    }
}

impl QueryParams {
    /// Page size with zero mapped to the default and capped at `max`.
    pub fn clamped_page_size(&self, max: usize) -> usize {
        let size = if self.page_size == 0 {
            default_page_size()
        } else {
            self.page_size
        };
        size.min(max)
    }

    pub fn search_term(&self) -> Option<&str> {
        if self.search_text.is_empty() {
            None
        } else {
            Some(&self.search_text)
        }
    }
}

/// Position-independent identity of a returned row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowKey {
    pub primary_key: String,
    pub display_index: usize,
}

/// A row as sent to the client: its own fields plus identity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    /// Primary key rendered as a string
    pub id: String,
    pub row_key: RowKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_expand: Option<bool>,
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

const RESERVED_ROW_FIELDS: [&str; 3] = ["id", "rowKey", "canExpand"];

impl Row {
    pub fn new(mut fields: Map<String, JsonValue>, primary_key: String, display_index: usize) -> Self {
        for reserved in RESERVED_ROW_FIELDS {
            fields.remove(reserved);
        }
        Row {
            id: primary_key.clone(),
            row_key: RowKey {
                primary_key,
                display_index,
            },
            can_expand: None,
            fields,
        }
    }
}

/// Render a primary-key value the way row ids carry it.
pub fn render_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Row identifier accepted by mutations.
///
/// Clients may send the row's `id` string, a bare number, or the full
/// `{primaryKey, displayIndex}` key; all resolve to the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowId(String);

impl RowId {
    pub fn new(primary_key: impl Into<String>) -> Self {
        RowId(primary_key.into())
    }

    pub fn primary_key(&self) -> &str {
        &self.0
    }

    /// Interpret a loosely-typed JSON id from a request body.
    pub fn from_json(value: &JsonValue) -> GridResult<Self> {
        match value {
            JsonValue::Object(obj) => obj
                .get("primaryKey")
                .and_then(render_key)
                .map(RowId)
                .ok_or_else(|| GridError::Validation("row key is missing primaryKey".to_string())),
            other => render_key(other)
                .filter(|s| !s.is_empty())
                .map(RowId)
                .ok_or_else(|| GridError::Validation(format!("invalid row id: {}", other))),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        RowId(s.to_string())
    }
}

impl From<&RowKey> for RowId {
    fn from(key: &RowKey) -> Self {
        RowId(key.primary_key.clone())
    }
}

impl Serialize for RowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        RowId::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Output of the read path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total_rows: u64,
    pub page_index: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdateResult {
    pub success: bool,
    pub message: String,
    pub row_id: String,
    pub field: String,
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_response: Option<JsonValue>,
}

/// Count reported by a bulk operation, serialized under its operation's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkCount {
    #[serde(rename = "updatedCount")]
    Updated(usize),
    #[serde(rename = "deletedCount")]
    Deleted(usize),
    #[serde(rename = "archivedCount")]
    Archived(usize),
}

impl BulkCount {
    pub fn value(&self) -> usize {
        match self {
            BulkCount::Updated(n) | BulkCount::Deleted(n) | BulkCount::Archived(n) => *n,
        }
    }
}

/// Summary of a per-row bulk operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub count: BulkCount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl BulkResult {
    pub fn new(count: BulkCount, errors: Vec<String>) -> Self {
        let verb = match count {
            BulkCount::Updated(_) => "updated",
            BulkCount::Deleted(_) => "deleted",
            BulkCount::Archived(_) => "archived",
        };
        let mut message = format!("Successfully {} {} records", verb, count.value());
        if !errors.is_empty() {
            message.push_str(&format!(" ({} errors)", errors.len()));
        }
        BulkResult {
            success: errors.is_empty() || count.value() > 0,
            message,
            count,
            errors: if errors.is_empty() { None } else { Some(errors) },
        }
    }
}

/// Key in bulk-edit `updates` carrying a numeric adjustment
pub const ADJUST_KEY: &str = "_adjust";
const LEGACY_SALARY_ADJUST_KEY: &str = "_salaryAdjustment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// Scale by `value` percent, rounded to two decimals
    Percentage,
    /// Add `value`
    Amount,
}

/// Relative change to a number column applied during bulk edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericAdjustment {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentKind,
    pub value: f64,
}

impl NumericAdjustment {
    pub fn apply(&self, current: f64) -> f64 {
        match self.kind {
            AdjustmentKind::Percentage => {
                let scaled = current * (1.0 + self.value / 100.0);
                (scaled * 100.0).round() / 100.0
            }
            AdjustmentKind::Amount => current + self.value,
        }
    }
}

/// Writes a bulk edit will apply to every selected row
#[derive(Debug, Clone, PartialEq)]
pub struct BulkEditPlan {
    pub assignments: Vec<(String, JsonValue)>,
    pub adjustment: Option<NumericAdjustment>,
}

impl BulkEditPlan {
    /// Keep only the updates the grid allows; unknown or read-only fields are dropped.
    pub fn from_updates(config: &GridConfig, updates: &Map<String, JsonValue>) -> GridResult<Self> {
        let mut assignments = Vec::new();
        let mut adjustment = None;

        for (field, value) in updates {
            if field == ADJUST_KEY {
                let adj: NumericAdjustment = serde_json::from_value(value.clone())?;
                adjustment = Some(adj);
                continue;
            }
            if field == LEGACY_SALARY_ADJUST_KEY {
                let mut legacy = value.clone();
                if let Some(obj) = legacy.as_object_mut() {
                    obj.insert("field".to_string(), JsonValue::String("salary".to_string()));
                }
                adjustment = Some(serde_json::from_value(legacy)?);
                continue;
            }
            if config.editable_column(field).is_ok() {
                assignments.push((field.clone(), value.clone()));
            } else {
                tracing::debug!("Skipping non-editable field '{}' in bulk edit", field);
            }
        }

        if let Some(adj) = &adjustment {
            let column = config.editable_column(&adj.field)?;
            if column.column_type != ColumnType::Number {
                return Err(GridError::Validation(format!(
                    "Adjustment target '{}' is not a number column",
                    adj.field
                )));
            }
        }

        if assignments.is_empty() && adjustment.is_none() {
            return Err(GridError::Validation(
                "updates contain no editable fields".to_string(),
            ));
        }

        Ok(BulkEditPlan {
            assignments,
            adjustment,
        })
    }
}

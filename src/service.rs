//! Grid service: resolves a grid id and shapes results for clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use crate::backend::Backends;
use crate::config::{BulkAction, ColumnConfig, ExpandRule, GridConfig, GridRegistry};
use crate::error::{GridError, GridResult};
use crate::query::{BulkResult, FieldUpdateResult, QueryBuilder, QueryParams, Row, RowId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_index: usize,
    pub page_size: usize,
    pub total_rows: u64,
}

/// How the client should render expandable rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandableDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub single_expand: bool,
    #[serde(default)]
    pub default_expanded: bool,
    #[serde(default)]
    pub lazy_load: bool,
    #[serde(default)]
    pub can_expand: ExpandRule,
}

/// Response envelope for `GET /api/grid/:gridId/data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResult {
    pub grid_id: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    pub rows: Vec<Row>,
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expandable: Option<ExpandableDescriptor>,
}

/// Entry point for every operation on one grid
#[derive(Debug, Clone)]
pub struct GridService {
    config: Arc<GridConfig>,
    builder: QueryBuilder,
}

impl GridService {
    /// Resolve `grid_id`, failing with `ConfigNotFound` if it is not registered.
    pub fn new(registry: &GridRegistry, backends: &Backends, grid_id: &str) -> GridResult<Self> {
        let config = registry
            .get(grid_id)
            .ok_or_else(|| GridError::ConfigNotFound(grid_id.to_string()))?;
        let builder = QueryBuilder::new(Arc::clone(&config), backends.clone());
        Ok(Self { config, builder })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub async fn get_data(&self, params: &QueryParams) -> GridResult<DataResult> {
        let result = self.builder.execute_query(params).await?;

        let expandable = self.config.expandable_enabled();
        let mut rows = result.rows;
        if let Some(exp) = expandable {
            for row in &mut rows {
                row.can_expand = Some(exp.can_expand.evaluate(&row_fields(row)));
            }
        }

        Ok(DataResult {
            grid_id: self.config.id.clone(),
            primary_key: self.config.primary_key().to_string(),
            columns: self.config.columns.clone(),
            rows,
            pagination: Pagination {
                page_index: result.page_index,
                page_size: result.page_size,
                total_rows: result.total_rows,
            },
            expandable: expandable.map(|exp| ExpandableDescriptor {
                renderer: exp.component.clone(),
                required_permissions: exp.required_permissions.clone(),
                single_expand: exp.single_expand,
                default_expanded: exp.default_expanded,
                lazy_load: exp.lazy_load,
                can_expand: exp.can_expand.clone(),
            }),
        })
    }

    pub async fn update_field(&self, row_id: &RowId, field: &str, value: JsonValue) -> GridResult<FieldUpdateResult> {
        self.builder.update_field(row_id, field, value).await
    }

    pub async fn bulk_edit(&self, ids: &[RowId], updates: &Map<String, JsonValue>) -> GridResult<BulkResult> {
        self.ensure_enabled(BulkAction::Edit)?;
        self.builder.bulk_edit(ids, updates).await
    }

    pub async fn bulk_delete(&self, ids: &[RowId]) -> GridResult<BulkResult> {
        self.ensure_enabled(BulkAction::Delete)?;
        self.builder.bulk_delete(ids).await
    }

    pub async fn bulk_archive(&self, ids: &[RowId]) -> GridResult<BulkResult> {
        self.ensure_enabled(BulkAction::Archive)?;
        self.builder.bulk_archive(ids).await
    }

    pub async fn export_data(&self, ids: &[RowId]) -> GridResult<String> {
        self.ensure_enabled(BulkAction::Export)?;
        self.builder.export_data(ids).await
    }

    fn ensure_enabled(&self, action: BulkAction) -> GridResult<()> {
        if self.config.bulk_action_enabled(action) {
            Ok(())
        } else {
            Err(GridError::Disabled(format!(
                "{} is not enabled for this grid",
                action.label()
            )))
        }
    }
}

/// Fields as an expand rule sees them, including the row's `id`.
fn row_fields(row: &Row) -> Map<String, JsonValue> {
    let mut fields = row.fields.clone();
    fields
        .entry("id".to_string())
        .or_insert_with(|| JsonValue::String(row.id.clone()));
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, UpstreamApi};
    use serde_json::json;

    fn setup() -> (GridRegistry, Backends) {
        let registry = GridRegistry::builtin().unwrap();
        let backends = Backends::new(None, UpstreamApi::new(), MemoryStore::from_registry(&registry));
        (registry, backends)
    }

    #[test]
    fn test_unknown_grid_is_config_not_found() {
        let (registry, backends) = setup();
        let err = GridService::new(&registry, &backends, "payroll").unwrap_err();
        assert_eq!(err, GridError::ConfigNotFound("payroll".into()));
    }

    #[tokio::test]
    async fn test_get_data_annotates_can_expand() {
        let (registry, backends) = setup();
        let service = GridService::new(&registry, &backends, "departments").unwrap();

        let data = service.get_data(&QueryParams::default()).await.unwrap();
        assert_eq!(data.grid_id, "departments");
        assert_eq!(data.primary_key, "id");
        assert_eq!(data.pagination.total_rows, 5);

        let legal = data.rows.iter().find(|r| r.fields["name"] == json!("Legal")).unwrap();
        assert_eq!(legal.can_expand, Some(false));
        let support = data.rows.iter().find(|r| r.fields["name"] == json!("Support")).unwrap();
        assert_eq!(support.can_expand, Some(true));

        let descriptor = data.expandable.unwrap();
        assert_eq!(descriptor.renderer.as_deref(), Some("GenericDetailPanel"));
    }

    #[tokio::test]
    async fn test_disabled_bulk_action() {
        let (registry, backends) = setup();
        let service = GridService::new(&registry, &backends, "users").unwrap();

        let err = service.bulk_archive(&[RowId::from("1")]).await.unwrap_err();
        assert_eq!(err.to_string(), "Bulk archive is not enabled for this grid");

        let err = service.export_data(&[RowId::from("1")]).await.unwrap_err();
        assert_eq!(err.to_string(), "Export is not enabled for this grid");
    }

    #[tokio::test]
    async fn test_mutations_are_visible_to_later_reads() {
        let (registry, backends) = setup();
        let service = GridService::new(&registry, &backends, "departments").unwrap();

        service
            .update_field(&RowId::from("2"), "location", json!("Dublin"))
            .await
            .unwrap();
        let again = GridService::new(&registry, &backends, "departments").unwrap();
        let data = again.get_data(&QueryParams::default()).await.unwrap();

        let finance = data.rows.iter().find(|r| r.id == "2").unwrap();
        assert_eq!(finance.fields["location"], json!("Dublin"));
    }
}

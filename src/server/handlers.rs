//! Route handlers for the grid API.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::ApiError;
use super::AppState;
use crate::config::{GridConfig, GridSummary};
use crate::query::{BulkResult, FieldUpdateResult, QueryParams, RowId, SortSpec, MYSQL_MAX_PAGE_SIZE};
use crate::service::DataResult;

const DEFAULT_LIMIT: usize = 20;

/// List every grid with its public column metadata
pub async fn list_grids(State(state): State<Arc<AppState>>) -> Json<Vec<GridSummary>> {
    Json(state.registry.summaries())
}

pub async fn grid_config(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
) -> Result<Json<GridConfig>, ApiError> {
    state
        .registry
        .get(&grid_id)
        .map(|config| Json(config.as_ref().clone()))
        .ok_or_else(|| ApiError::NotFound(format!("Grid configuration not found: {}", grid_id)))
}

/// Page of grid rows. Query: `limit`, `offset`, `search`, `filterBy`, `sortBy` (JSON).
pub async fn grid_data(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<DataResult>, ApiError> {
    let params = data_params(&query);
    let service = state.service(&grid_id).map_err(ApiError::operation("fetch grid data"))?;
    let result = service
        .get_data(&params)
        .await
        .map_err(ApiError::operation("fetch grid data"))?;
    Ok(Json(result))
}

/// Translate `limit`/`offset` paging into a page index.
pub fn data_params(query: &HashMap<String, String>) -> QueryParams {
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_LIMIT)
        .min(MYSQL_MAX_PAGE_SIZE);
    let offset = query
        .get("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let sort_by = query
        .get("sortBy")
        .and_then(|raw| serde_json::from_str::<Vec<SortSpec>>(raw).ok())
        .unwrap_or_default();

    QueryParams {
        page_index: offset / limit,
        page_size: limit,
        search_text: query.get("search").cloned().unwrap_or_default(),
        filter_by: query.get("filterBy").cloned().unwrap_or_default(),
        sort_by,
    }
}

pub async fn update_field(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    body: Bytes,
) -> Result<Json<FieldUpdateResult>, ApiError> {
    let body = json_object(&body)?;
    let required = || ApiError::BadRequest("rowId, field, and value are required".to_string());

    let row_id = body
        .get("rowId")
        .ok_or_else(required)
        .and_then(|v| RowId::from_json(v).map_err(|_| required()))?;
    let field = body
        .get("field")
        .and_then(JsonValue::as_str)
        .filter(|f| !f.is_empty())
        .ok_or_else(required)?;
    let value = body.get("value").cloned().ok_or_else(required)?;

    let service = state.service(&grid_id).map_err(ApiError::operation("update field"))?;
    let result = service
        .update_field(&row_id, field, value)
        .await
        .map_err(ApiError::operation("update field"))?;
    Ok(Json(result))
}

pub async fn bulk_edit(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    body: Bytes,
) -> Result<Json<BulkResult>, ApiError> {
    let body = json_object(&body)?;
    let ids = selected_ids(&body)?;
    let updates = body
        .get("updates")
        .and_then(JsonValue::as_object)
        .ok_or_else(|| ApiError::BadRequest("updates object is required".to_string()))?;

    let service = state.service(&grid_id).map_err(ApiError::operation("bulk edit records"))?;
    let result = service
        .bulk_edit(&ids, updates)
        .await
        .map_err(ApiError::operation("bulk edit records"))?;
    Ok(Json(result))
}

pub async fn bulk_archive(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    body: Bytes,
) -> Result<Json<BulkResult>, ApiError> {
    let ids = selected_ids(&json_object(&body)?)?;
    let service = state.service(&grid_id).map_err(ApiError::operation("archive records"))?;
    let result = service
        .bulk_archive(&ids)
        .await
        .map_err(ApiError::operation("archive records"))?;
    Ok(Json(result))
}

pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    body: Bytes,
) -> Result<Json<BulkResult>, ApiError> {
    let ids = selected_ids(&json_object(&body)?)?;
    let service = state.service(&grid_id).map_err(ApiError::operation("delete records"))?;
    let result = service
        .bulk_delete(&ids)
        .await
        .map_err(ApiError::operation("delete records"))?;
    Ok(Json(result))
}

/// CSV download of the selected rows
pub async fn export(
    State(state): State<Arc<AppState>>,
    Path(grid_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let ids = selected_ids(&json_object(&body)?)?;
    let service = state.service(&grid_id).map_err(ApiError::operation("export data"))?;
    let csv = service
        .export_data(&ids)
        .await
        .map_err(ApiError::operation("export data"))?;

    let filename = format!(
        "{}_export_{}.csv",
        grid_id,
        chrono::Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    )
        .into_response())
}

/// Health check endpoint (liveness)
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "datagrid-server",
        "version": env!("CARGO_PKG_VERSION"),
        "grids": state.registry.len(),
    }))
}

fn json_object(body: &Bytes) -> Result<Map<String, JsonValue>, ApiError> {
    match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::BadRequest("Request body must be a JSON object".to_string())),
        Err(e) => Err(ApiError::BadRequest(format!("Invalid JSON: {}", e))),
    }
}

fn selected_ids(body: &Map<String, JsonValue>) -> Result<Vec<RowId>, ApiError> {
    let required = || ApiError::BadRequest("selectedIds array is required".to_string());
    let ids = body
        .get("selectedIds")
        .and_then(JsonValue::as_array)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(required)?;
    ids.iter()
        .map(|id| RowId::from_json(id).map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_data_params_defaults() {
        let params = data_params(&HashMap::new());
        assert_eq!(params.page_index, 0);
        assert_eq!(params.page_size, 20);
        assert!(params.sort_by.is_empty());
    }

    #[test]
    fn test_data_params_offset_to_page_index() {
        let params = data_params(&query(&[("limit", "25"), ("offset", "50"), ("search", "ann")]));
        assert_eq!(params.page_index, 2);
        assert_eq!(params.page_size, 25);
        assert_eq!(params.search_text, "ann");
    }

    #[test]
    fn test_data_params_limit_fallbacks() {
        assert_eq!(data_params(&query(&[("limit", "0")])).page_size, 20);
        assert_eq!(data_params(&query(&[("limit", "abc")])).page_size, 20);
        assert_eq!(data_params(&query(&[("limit", "5000")])).page_size, 1000);
    }

    #[test]
    fn test_data_params_sort_by() {
        let params = data_params(&query(&[("sortBy", r#"[{"id":"name","desc":true}]"#)]));
        assert_eq!(params.sort_by, vec![SortSpec { id: "name".into(), desc: true }]);

        let params = data_params(&query(&[("sortBy", "not json")]));
        assert!(params.sort_by.is_empty());
    }

    #[test]
    fn test_selected_ids_validation() {
        let body = serde_json::json!({"selectedIds": []});
        assert!(selected_ids(body.as_object().unwrap()).is_err());

        let body = serde_json::json!({"selectedIds": "1"});
        assert!(selected_ids(body.as_object().unwrap()).is_err());

        let body = serde_json::json!({"selectedIds": [1, "2", {"primaryKey": "3", "displayIndex": 0}]});
        let ids = selected_ids(body.as_object().unwrap()).unwrap();
        assert_eq!(ids, vec![RowId::from("1"), RowId::from("2"), RowId::from("3")]);
    }
}

//! Per-grid dispatch of reads and writes to the grid's backend.

use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

use super::filter::{apply_search, compare_values, paginate, sort_rows};
use super::{
    csv, render_key, sql, BulkCount, BulkEditPlan, BulkResult, FieldUpdateResult, QueryParams,
    QueryResult, Row, RowId, MYSQL_MAX_PAGE_SIZE, STATIC_MAX_PAGE_SIZE,
};
use crate::backend::sql::{run_blocking, SqlErrorKind, SqlExecutor};
use crate::backend::{Backends, MemoryTable};
use crate::config::{ApiSource, DataSource, GridConfig, MysqlSource};
use crate::error::{GridError, GridResult};

type Fields = Map<String, JsonValue>;

/// Builds and runs queries for one grid
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    config: Arc<GridConfig>,
    backends: Backends,
}

impl QueryBuilder {
    pub fn new(config: Arc<GridConfig>, backends: Backends) -> Self {
        Self { config, backends }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Fetch one page of rows with the total count of matching rows.
    pub async fn execute_query(&self, params: &QueryParams) -> GridResult<QueryResult> {
        match &self.config.data_source {
            DataSource::Mysql { connection } => self.query_mysql(connection, params).await,
            DataSource::Api { api } => self.query_api(api, params).await,
            DataSource::Static { .. } => self.query_static(params),
        }
    }

    async fn query_mysql(&self, source: &MysqlSource, params: &QueryParams) -> GridResult<QueryResult> {
        let executor = self.backends.sql()?;
        let page_size = params.clamped_page_size(MYSQL_MAX_PAGE_SIZE);
        let offset = params.page_index.saturating_mul(page_size);

        let count = sql::count_query(&self.config, source, params);
        let page = sql::page_query(&self.config, source, params, page_size, offset);
        tracing::debug!("Grid {} query: {}", self.config.id, page.sql);

        let (total, rows) = run_blocking(executor, move |db| {
            let total = db.fetch_count(&count)?;
            let rows = db.fetch_rows(&page)?;
            Ok((total, rows))
        })
        .await
        .map_err(|e| e.into_grid_error("fetch data"))?;

        let pk = source.primary_key.as_str();
        let rows = build_rows(rows, offset, |fields, index| {
            fields
                .get(pk)
                .and_then(render_key)
                .unwrap_or_else(|| format!("row-{}", index))
        });

        Ok(QueryResult {
            rows,
            total_rows: total,
            page_index: params.page_index,
            page_size,
        })
    }

    async fn query_api(&self, api: &ApiSource, params: &QueryParams) -> GridResult<QueryResult> {
        let page_size = params.clamped_page_size(api.max_page_size);
        let searching = params.search_term().is_some() && self.config.search_enabled();

        // The upstream cannot search, so fetch everything and filter here
        let query = if searching {
            vec![(api.limit_param.clone(), "0".to_string())]
        } else {
            vec![
                (api.limit_param.clone(), page_size.to_string()),
                (
                    api.skip_param.clone(),
                    params.page_index.saturating_mul(page_size).to_string(),
                ),
            ]
        };
        let page = self.backends.upstream.list(api, &query).await?;

        let offset = params.page_index.saturating_mul(page_size);
        let (items, total) = if searching || !page.enveloped {
            self.in_process_page(page.items, params, page_size)
        } else {
            (page.items, page.total)
        };

        let rows = build_rows(items, offset, |fields, _| {
            fields
                .get("id")
                .or_else(|| fields.get("pk_id"))
                .and_then(render_key)
                .unwrap_or_else(|| format!("row-{}", Uuid::new_v4()))
        });

        Ok(QueryResult {
            rows,
            total_rows: total,
            page_index: params.page_index,
            page_size,
        })
    }

    fn query_static(&self, params: &QueryParams) -> GridResult<QueryResult> {
        let table = self.backends.memory_table(&self.config.id)?;
        let page_size = params.clamped_page_size(STATIC_MAX_PAGE_SIZE);
        let offset = params.page_index.saturating_mul(page_size);

        let (items, total) = self.in_process_page(table.snapshot(), params, page_size);
        let pk = table.primary_key();
        let rows = build_rows(items, offset, |fields, index| {
            fields
                .get(pk)
                .and_then(render_key)
                .unwrap_or_else(|| format!("static-{}", index))
        });

        Ok(QueryResult {
            rows,
            total_rows: total,
            page_index: params.page_index,
            page_size,
        })
    }

    fn in_process_page(&self, items: Vec<Fields>, params: &QueryParams, page_size: usize) -> (Vec<Fields>, u64) {
        let mut matched = apply_search(items, &self.config, params);
        sort_rows(&mut matched, &self.config, &params.sort_by);
        let total = matched.len() as u64;
        (paginate(&matched, params.page_index, page_size), total)
    }

    /// Write one cell. The column must be editable.
    pub async fn update_field(&self, row_id: &RowId, field: &str, value: JsonValue) -> GridResult<FieldUpdateResult> {
        self.config.editable_column(field)?;
        let pk = row_id.primary_key().to_string();
        tracing::info!("Grid {}: updating {} on row {}", self.config.id, field, pk);

        let mut result = FieldUpdateResult {
            success: true,
            message: "Field updated successfully".to_string(),
            row_id: pk.clone(),
            field: field.to_string(),
            value: value.clone(),
            affected_rows: None,
            api_response: None,
        };

        match &self.config.data_source {
            DataSource::Mysql { connection } => {
                let executor = self.backends.sql()?;
                let stmt = sql::update_field(connection, field, &value, &pk);
                let affected = run_blocking(executor, move |db| db.execute(&stmt))
                    .await
                    .map_err(|e| e.into_grid_error("update field"))?;
                if affected == 0 {
                    return Err(not_found(&connection.primary_key, &pk));
                }
                result.affected_rows = Some(affected);
            }
            DataSource::Api { api } => {
                let mut body = Map::new();
                body.insert(field.to_string(), value);
                let response = self
                    .backends
                    .upstream
                    .update(api, &pk, &JsonValue::Object(body))
                    .await?;
                result.api_response = Some(response);
            }
            DataSource::Static { source } => {
                let table = self.backends.memory_table(&self.config.id)?;
                let found = table.update(&pk, |row| {
                    row.insert(field.to_string(), value);
                });
                if !found {
                    return Err(not_found(&source.primary_key, &pk));
                }
                result.affected_rows = Some(1);
            }
        }

        Ok(result)
    }

    /// Apply the same edit to every selected row.
    ///
    /// Rows are processed independently. The call fails only when no row
    /// could be updated; otherwise per-row errors are reported alongside the
    /// count.
    pub async fn bulk_edit(&self, ids: &[RowId], updates: &Fields) -> GridResult<BulkResult> {
        require_selection(ids)?;
        let plan = BulkEditPlan::from_updates(&self.config, updates)?;
        let keys = primary_keys(ids);
        tracing::info!("Grid {}: bulk edit of {} rows", self.config.id, keys.len());

        let (updated, errors) = match &self.config.data_source {
            DataSource::Mysql { connection } => {
                let executor = self.backends.sql()?;
                let source = connection.clone();
                run_blocking(executor, move |db| {
                    let mut updated = 0;
                    let mut errors = Vec::new();
                    for pk in &keys {
                        match edit_sql_row(db, &source, &plan, pk) {
                            Ok(0) => errors.push(format!("Row {}: not found", pk)),
                            Ok(_) => updated += 1,
                            Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                        }
                    }
                    Ok((updated, errors))
                })
                .await
                .map_err(|e| e.into_grid_error("bulk edit"))?
            }
            DataSource::Api { api } => {
                if plan.adjustment.is_some() {
                    return Err(GridError::Unsupported(
                        "Numeric adjustments are not supported for API data sources".to_string(),
                    ));
                }
                let body: Fields = plan.assignments.iter().cloned().collect();
                let body = JsonValue::Object(body);
                let mut updated = 0;
                let mut errors = Vec::new();
                for pk in &keys {
                    match self.backends.upstream.update(api, pk, &body).await {
                        Ok(_) => updated += 1,
                        Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                    }
                }
                (updated, errors)
            }
            DataSource::Static { .. } => {
                let table = self.backends.memory_table(&self.config.id)?;
                edit_static_rows(&table, &plan, &keys)
            }
        };

        if updated == 0 && !errors.is_empty() {
            return Err(GridError::BulkFailed {
                operation: "Bulk edit".to_string(),
                errors,
            });
        }
        Ok(BulkResult::new(BulkCount::Updated(updated), errors))
    }

    /// Delete the selected rows. Ids that match nothing are not counted.
    pub async fn bulk_delete(&self, ids: &[RowId]) -> GridResult<BulkResult> {
        require_selection(ids)?;
        let keys = primary_keys(ids);
        tracing::info!("Grid {}: bulk delete of {} rows", self.config.id, keys.len());

        let (deleted, errors) = match &self.config.data_source {
            DataSource::Mysql { connection } => {
                let executor = self.backends.sql()?;
                let source = connection.clone();
                run_blocking(executor, move |db| {
                    let mut deleted = 0;
                    let mut errors = Vec::new();
                    for pk in &keys {
                        match db.execute(&sql::delete_row(&source, pk)) {
                            Ok(affected) if affected > 0 => deleted += 1,
                            Ok(_) => {}
                            Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                        }
                    }
                    Ok((deleted, errors))
                })
                .await
                .map_err(|e| e.into_grid_error("bulk delete"))?
            }
            DataSource::Api { api } => {
                let mut deleted = 0;
                let mut errors = Vec::new();
                for pk in &keys {
                    match self.backends.upstream.delete(api, pk).await {
                        Ok(()) => deleted += 1,
                        Err(GridError::Upstream { status: Some(404), .. }) => {}
                        Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                    }
                }
                (deleted, errors)
            }
            DataSource::Static { .. } => {
                let table = self.backends.memory_table(&self.config.id)?;
                let deleted = keys.iter().filter(|pk| table.remove(pk)).count();
                (deleted, Vec::new())
            }
        };

        Ok(BulkResult::new(BulkCount::Deleted(deleted), errors))
    }

    /// Flag the selected rows as archived.
    pub async fn bulk_archive(&self, ids: &[RowId]) -> GridResult<BulkResult> {
        require_selection(ids)?;
        let keys = primary_keys(ids);
        tracing::info!("Grid {}: bulk archive of {} rows", self.config.id, keys.len());

        let (archived, errors) = match &self.config.data_source {
            DataSource::Mysql { connection } => {
                let executor = self.backends.sql()?;
                let source = connection.clone();
                run_blocking(executor, move |db| {
                    match db.execute(&sql::add_archived_column(&source)) {
                        Ok(_) => tracing::info!("Added archived column to {}", source.table),
                        Err(e) if e.kind == SqlErrorKind::DuplicateColumn => {}
                        Err(e) => return Err(e),
                    }
                    let mut archived = 0;
                    let mut errors = Vec::new();
                    for pk in &keys {
                        match db.execute(&sql::archive_row(&source, pk)) {
                            Ok(affected) if affected > 0 => archived += 1,
                            Ok(_) => {}
                            Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                        }
                    }
                    Ok((archived, errors))
                })
                .await
                .map_err(|e| e.into_grid_error("bulk archive"))?
            }
            DataSource::Api { api } => {
                let body = serde_json::json!({ "archived": true });
                let mut archived = 0;
                let mut errors = Vec::new();
                for pk in &keys {
                    match self.backends.upstream.update(api, pk, &body).await {
                        Ok(_) => archived += 1,
                        Err(GridError::Upstream { status: Some(404), .. }) => {}
                        Err(e) => errors.push(format!("Row {}: {}", pk, e)),
                    }
                }
                (archived, errors)
            }
            DataSource::Static { .. } => {
                let table = self.backends.memory_table(&self.config.id)?;
                let archived = keys
                    .iter()
                    .filter(|pk| {
                        table.update(pk, |row| {
                            row.insert("archived".to_string(), JsonValue::Bool(true));
                        })
                    })
                    .count();
                (archived, Vec::new())
            }
        };

        Ok(BulkResult::new(BulkCount::Archived(archived), errors))
    }

    /// Render the selected rows as CSV, ordered by primary key.
    pub async fn export_data(&self, ids: &[RowId]) -> GridResult<String> {
        require_selection(ids)?;
        let keys = primary_keys(ids);

        let rows = match &self.config.data_source {
            DataSource::Mysql { connection } => {
                let executor = self.backends.sql()?;
                let stmt = sql::export_rows(&self.config, connection, &keys);
                run_blocking(executor, move |db| db.fetch_rows(&stmt))
                    .await
                    .map_err(|e| e.into_grid_error("export data"))?
            }
            DataSource::Api { .. } => {
                return Err(GridError::Unsupported(
                    "Export is not supported for API data sources".to_string(),
                ));
            }
            DataSource::Static { source } => {
                let table = self.backends.memory_table(&self.config.id)?;
                let mut rows = table.find_all(&keys);
                let pk = source.primary_key.as_str();
                rows.sort_by(|a, b| compare_values(a.get(pk), b.get(pk)));
                rows
            }
        };

        tracing::info!("Grid {}: exporting {} rows", self.config.id, rows.len());
        csv::export_csv(&self.config.columns, &rows)
    }
}

fn build_rows<F>(items: Vec<Fields>, offset: usize, key_of: F) -> Vec<Row>
where
    F: Fn(&Fields, usize) -> String,
{
    items
        .into_iter()
        .enumerate()
        .map(|(i, fields)| {
            let index = offset + i;
            let key = key_of(&fields, index);
            Row::new(fields, key, index)
        })
        .collect()
}

fn require_selection(ids: &[RowId]) -> GridResult<()> {
    if ids.is_empty() {
        return Err(GridError::Validation(
            "selectedIds must be a non-empty array".to_string(),
        ));
    }
    Ok(())
}

fn primary_keys(ids: &[RowId]) -> Vec<String> {
    ids.iter().map(|id| id.primary_key().to_string()).collect()
}

fn not_found(pk_field: &str, pk: &str) -> GridError {
    GridError::NotFound(format!("No row found with {} = {}", pk_field, pk))
}

/// Returns the number of rows the edit touched.
fn edit_sql_row(
    db: &dyn SqlExecutor,
    source: &MysqlSource,
    plan: &BulkEditPlan,
    pk: &str,
) -> Result<usize, crate::backend::SqlError> {
    let mut touched = 0;
    for (field, value) in &plan.assignments {
        touched = touched.max(db.execute(&sql::update_field(source, field, value, pk))?);
    }
    if let Some(adjustment) = &plan.adjustment {
        touched = touched.max(db.execute(&sql::adjust_field(source, adjustment, pk))?);
    }
    Ok(touched)
}

fn edit_static_rows(table: &MemoryTable, plan: &BulkEditPlan, keys: &[String]) -> (usize, Vec<String>) {
    let mut updated = 0;
    let mut errors = Vec::new();
    for pk in keys {
        let found = table.update(pk, |row| {
            for (field, value) in &plan.assignments {
                row.insert(field.clone(), value.clone());
            }
            if let Some(adjustment) = &plan.adjustment {
                let current = row
                    .get(&adjustment.field)
                    .and_then(JsonValue::as_f64)
                    .unwrap_or(0.0);
                row.insert(adjustment.field.clone(), number(adjustment.apply(current)));
            }
        });
        if found {
            updated += 1;
        } else {
            errors.push(format!("Row {}: not found", pk));
        }
    }
    (updated, errors)
}

/// Whole results stay integers so static rows keep their original shape.
fn number(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        JsonValue::from(value as i64)
    } else {
        Number::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

//! Typed client for the grid HTTP API.
//!
//! [`GridClient`] wraps each route; [`GridCache`] holds fetched pages and the
//! optimistic edits layered over them.

pub mod cache;

pub use cache::{CellMutation, GridCache, MutationId, MutationTracker, PageKey};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;
use std::sync::Mutex;

use crate::config::{GridConfig, GridSummary};
use crate::query::{BulkResult, FieldUpdateResult, QueryParams, RowId};
use crate::service::DataResult;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Transport failure before a response arrived
    Http(String),
    /// Non-success response from the server
    Api { status: u16, message: String },
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Http(msg) => write!(f, "HTTP error: {}", msg),
            ClientError::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            ClientError::Decode(msg) => write!(f, "Failed to decode response: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Http(e.to_string())
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct GridClient {
    base_url: String,
    http: Client,
}

impl GridClient {
    /// `base_url` is the server root, e.g. `http://localhost:5000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        GridClient { base_url, http }
    }

    fn grid_url(&self, grid_id: &str, path: &str) -> String {
        format!("{}/api/grid/{}/{}", self.base_url, grid_id, path)
    }

    pub async fn list_grids(&self) -> ClientResult<Vec<GridSummary>> {
        send_json(self.http.get(format!("{}/api/grids", self.base_url))).await
    }

    pub async fn grid_config(&self, grid_id: &str) -> ClientResult<GridConfig> {
        send_json(self.http.get(self.grid_url(grid_id, "config"))).await
    }

    pub async fn fetch_data(&self, grid_id: &str, params: &QueryParams) -> ClientResult<DataResult> {
        let request = self
            .http
            .get(self.grid_url(grid_id, "data"))
            .query(&data_query(params)?);
        send_json(request).await
    }

    /// Serve from `cache` when possible, otherwise fetch and remember the page.
    pub async fn fetch_data_cached(
        &self,
        cache: &Mutex<GridCache>,
        grid_id: &str,
        params: &QueryParams,
    ) -> ClientResult<DataResult> {
        if let Some(page) = lock(cache).get(grid_id, params) {
            return Ok(page.clone());
        }
        let page = self.fetch_data(grid_id, params).await?;
        lock(cache).insert(params, page.clone());
        Ok(page)
    }

    pub async fn update_field(
        &self,
        grid_id: &str,
        row_id: &RowId,
        field: &str,
        value: JsonValue,
    ) -> ClientResult<FieldUpdateResult> {
        let body = json!({ "rowId": row_id, "field": field, "value": value });
        send_json(self.http.patch(self.grid_url(grid_id, "field")).json(&body)).await
    }

    /// Edit a cell optimistically: the cache shows the new value at once and
    /// is rolled back if the server rejects it.
    pub async fn update_cell(
        &self,
        cache: &Mutex<GridCache>,
        grid_id: &str,
        row_id: &RowId,
        field: &str,
        value: JsonValue,
    ) -> ClientResult<FieldUpdateResult> {
        let mutation = lock(cache).begin_update(grid_id, row_id.primary_key(), field, value.clone());

        match self.update_field(grid_id, row_id, field, value).await {
            Ok(result) => {
                lock(cache).commit(mutation);
                tracing::debug!("Saved {}.{} on row {}", grid_id, field, row_id);
                Ok(result)
            }
            Err(e) => {
                lock(cache).rollback(mutation);
                tracing::warn!("Update of {}.{} on row {} rolled back: {}", grid_id, field, row_id, e);
                Err(e)
            }
        }
    }

    pub async fn bulk_edit(
        &self,
        grid_id: &str,
        ids: &[RowId],
        updates: Map<String, JsonValue>,
    ) -> ClientResult<BulkResult> {
        let body = json!({ "selectedIds": ids, "updates": updates });
        send_json(self.http.patch(self.grid_url(grid_id, "bulk/edit")).json(&body)).await
    }

    pub async fn bulk_archive(&self, grid_id: &str, ids: &[RowId]) -> ClientResult<BulkResult> {
        let body = json!({ "selectedIds": ids });
        send_json(self.http.patch(self.grid_url(grid_id, "bulk/archive")).json(&body)).await
    }

    pub async fn bulk_delete(&self, grid_id: &str, ids: &[RowId]) -> ClientResult<BulkResult> {
        let body = json!({ "selectedIds": ids });
        send_json(self.http.delete(self.grid_url(grid_id, "bulk/delete")).json(&body)).await
    }

    /// CSV text of the selected rows
    pub async fn export(&self, grid_id: &str, ids: &[RowId]) -> ClientResult<String> {
        let body = json!({ "selectedIds": ids });
        let response = checked(self.http.post(self.grid_url(grid_id, "export")).json(&body)).await?;
        Ok(response.text().await?)
    }
}

fn lock(cache: &Mutex<GridCache>) -> std::sync::MutexGuard<'_, GridCache> {
    cache.lock().unwrap_or_else(|e| e.into_inner())
}

/// `limit`/`offset` query for the data route
pub fn data_query(params: &QueryParams) -> ClientResult<Vec<(&'static str, String)>> {
    let page_size = params.clamped_page_size(usize::MAX);
    let mut query = vec![
        ("limit", page_size.to_string()),
        ("offset", params.page_index.saturating_mul(page_size).to_string()),
    ];
    if !params.search_text.is_empty() {
        query.push(("search", params.search_text.clone()));
    }
    if !params.filter_by.is_empty() {
        query.push(("filterBy", params.filter_by.clone()));
    }
    if !params.sort_by.is_empty() {
        let sort = serde_json::to_string(&params.sort_by).map_err(|e| ClientError::Decode(e.to_string()))?;
        query.push(("sortBy", sort));
    }
    Ok(query)
}

async fn checked(request: RequestBuilder) -> ClientResult<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        message: error_message(&text),
    })
}

async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = checked(request).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Prefer the detailed `message` of an error body, then `error`, then the raw text.
fn error_message(body: &str) -> String {
    let Ok(JsonValue::Object(obj)) = serde_json::from_str::<JsonValue>(body) else {
        return body.to_string();
    };
    obj.get("message")
        .or_else(|| obj.get("error"))
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortSpec;

    #[test]
    fn test_data_query_converts_page_to_offset() {
        let params = QueryParams {
            page_index: 3,
            page_size: 25,
            sort_by: vec![SortSpec { id: "name".into(), desc: false }],
            ..QueryParams::default()
        };
        let query = data_query(&params).unwrap();

        assert_eq!(query[0], ("limit", "25".to_string()));
        assert_eq!(query[1], ("offset", "75".to_string()));
        assert_eq!(query[2], ("sortBy", r#"[{"id":"name","desc":false}]"#.to_string()));
    }

    #[test]
    fn test_error_message_prefers_detail() {
        assert_eq!(
            error_message(r#"{"error":"Failed to update field","message":"Field 'id' is not editable"}"#),
            "Field 'id' is not editable"
        );
        assert_eq!(error_message(r#"{"error":"selectedIds array is required"}"#), "selectedIds array is required");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = GridClient::new("http://localhost:5000/");
        assert_eq!(client.grid_url("users", "data"), "http://localhost:5000/api/grid/users/data");
    }
}

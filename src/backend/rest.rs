//! HTTP client for REST-backed grids.

use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value as JsonValue};

use crate::config::{ApiSource, UpdateMethod};
use crate::error::{GridError, GridResult};

type Fields = Map<String, JsonValue>;

/// One list response from the upstream API
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Fields>,
    pub total: u64,
    /// False when the upstream answered with a bare array and so ignored paging
    pub enveloped: bool,
}

/// Shared HTTP client for all REST grids
#[derive(Debug, Clone, Default)]
pub struct UpstreamApi {
    client: Client,
}

impl UpstreamApi {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GET the list endpoint with the given query parameters.
    pub async fn list(&self, api: &ApiSource, query: &[(String, String)]) -> GridResult<ListPage> {
        let request = self.client.get(api.list_url()).query(query);
        let response = send(with_headers(request, api), "fetch data").await?;
        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| GridError::upstream("fetch data", None, format!("Invalid JSON body: {}", e)))?;
        parse_list_response(body, api)
    }

    /// Send `body` to the row's update endpoint and return the upstream's reply.
    pub async fn update(&self, api: &ApiSource, id: &str, body: &JsonValue) -> GridResult<JsonValue> {
        let template = api
            .endpoints
            .update
            .as_deref()
            .ok_or_else(|| GridError::Unsupported("Update endpoint not configured".to_string()))?;
        let url = api.row_url(template, id)?;
        let request = match api.update_method {
            UpdateMethod::Put => self.client.put(url),
            UpdateMethod::Patch => self.client.patch(url),
        };
        let response = send(with_headers(request.json(body), api), "update").await?;
        // Some APIs answer 204 with no body
        let text = response
            .text()
            .await
            .map_err(|e| GridError::upstream("update", None, e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| GridError::upstream("update", None, format!("Invalid JSON body: {}", e)))
    }

    pub async fn delete(&self, api: &ApiSource, id: &str) -> GridResult<()> {
        let template = api
            .endpoints
            .delete
            .as_deref()
            .ok_or_else(|| GridError::Unsupported("Delete endpoint not configured".to_string()))?;
        let request = self.client.delete(api.row_url(template, id)?);
        send(with_headers(request, api), "delete").await?;
        Ok(())
    }
}

fn with_headers(mut request: RequestBuilder, api: &ApiSource) -> RequestBuilder {
    for (name, value) in &api.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

async fn send(request: RequestBuilder, operation: &str) -> GridResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| GridError::upstream(operation, None, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let reason = status.canonical_reason().unwrap_or("error");
        let message = if body.is_empty() {
            reason.to_string()
        } else {
            format!("{}: {}", reason, body)
        };
        return Err(GridError::upstream(operation, Some(status.as_u16()), message));
    }
    Ok(response)
}

/// Accept `{<itemsField>: [...], <totalField>: n}` or a bare array.
pub fn parse_list_response(body: JsonValue, api: &ApiSource) -> GridResult<ListPage> {
    match body {
        JsonValue::Array(items) => {
            let items = objects(items);
            Ok(ListPage {
                total: items.len() as u64,
                items,
                enveloped: false,
            })
        }
        JsonValue::Object(mut envelope) => {
            let Some(JsonValue::Array(items)) = envelope.remove(&api.items_field) else {
                return Err(GridError::upstream(
                    "fetch data",
                    None,
                    format!("Response has no '{}' array", api.items_field),
                ));
            };
            let items = objects(items);
            let total = envelope
                .get(&api.total_field)
                .and_then(JsonValue::as_u64)
                .unwrap_or(items.len() as u64);
            Ok(ListPage {
                items,
                total,
                enveloped: true,
            })
        }
        _ => Err(GridError::upstream(
            "fetch data",
            None,
            "Unsupported API response format",
        )),
    }
}

fn objects(items: Vec<JsonValue>) -> Vec<Fields> {
    items
        .into_iter()
        .filter_map(|item| match item {
            JsonValue::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

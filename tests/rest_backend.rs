//! REST-backed grids against a local mock of the upstream API

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use datagrid::backend::{Backends, MemoryStore, UpstreamApi};
use datagrid::config::GridRegistry;
use datagrid::query::BulkCount;
use datagrid::service::GridService;
use datagrid::{GridError, QueryParams, RowId};

const NAMES: [&str; 12] = [
    "Emily", "Michael", "Sophia", "James", "Emma", "Olivia", "Alexander", "Ava", "Ethan", "Isabella", "Liam", "Mia",
];

const GRIDS: &str = r#"
grids:
  people:
    id: people
    name: People
    dataSource:
      type: api
      api:
        baseUrl: BASE_URL
        itemsField: users
        endpoints:
          list: /users
          update: "/users/{id}"
          delete: "/users/{id}"
    columns:
      - { id: id, label: ID, type: number }
      - { id: firstName, label: First Name, type: string, editable: true }
      - { id: age, label: Age, type: number, editable: true }
    search: { enabled: true, searchableColumns: [firstName] }
    bulkActions:
      enabled: true
      actions: { edit: true, delete: true, archive: true, export: true }
  plain:
    id: plain
    name: Plain
    dataSource:
      type: api
      api:
        baseUrl: BASE_URL
        endpoints: { list: /plain }
    columns:
      - { id: id, label: ID, type: number }
      - { id: firstName, label: First Name, type: string }
  anonymous:
    id: anonymous
    name: Anonymous
    dataSource:
      type: api
      api:
        baseUrl: BASE_URL
        endpoints: { list: /anonymous }
    columns:
      - { id: firstName, label: First Name, type: string }
"#;

#[derive(Clone)]
struct Upstream {
    log: Arc<Mutex<Vec<String>>>,
    users: Arc<Mutex<Vec<Value>>>,
}

impl Upstream {
    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

async fn list_users(State(up): State<Upstream>, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let limit: usize = q.get("limit").and_then(|v| v.parse().ok()).unwrap_or(30);
    let skip: usize = q.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    up.record(format!(
        "GET /users limit={} skip={}",
        q.get("limit").map(String::as_str).unwrap_or("-"),
        q.get("skip").map(String::as_str).unwrap_or("-"),
    ));

    let users = up.users.lock().unwrap().clone();
    let total = users.len();
    // limit=0 means everything
    let take = if limit == 0 { total } else { limit };
    let page: Vec<Value> = users.into_iter().skip(skip).take(take).collect();
    Json(json!({ "users": page, "total": total, "skip": skip, "limit": take }))
}

async fn update_user(
    State(up): State<Upstream>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    up.record(format!("PUT /users/{} {}", id, body));
    let users = up.users.lock().unwrap();
    let mut user = users
        .iter()
        .find(|u| u["id"] == json!(id))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;
    for (k, v) in body.as_object().cloned().unwrap_or_default() {
        user[k] = v;
    }
    Ok(Json(user))
}

async fn delete_user(State(up): State<Upstream>, Path(id): Path<u64>) -> Result<Json<Value>, StatusCode> {
    up.record(format!("DELETE /users/{}", id));
    let mut users = up.users.lock().unwrap();
    let before = users.len();
    users.retain(|u| u["id"] != json!(id));
    if users.len() == before {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "id": id, "isDeleted": true })))
}

async fn plain(State(up): State<Upstream>) -> Json<Value> {
    up.record("GET /plain".to_string());
    Json(Value::Array(up.users.lock().unwrap().clone()))
}

async fn anonymous() -> Json<Value> {
    Json(json!([{ "pk_id": 7, "firstName": "Keyed" }, { "firstName": "Loose" }]))
}

struct Grids {
    registry: GridRegistry,
    backends: Backends,
}

/// Start the mock upstream and return the grids plus the request log.
async fn setup() -> (Grids, Arc<Mutex<Vec<String>>>) {
    let users = NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| json!({ "id": i + 1, "firstName": name, "age": 20 + i }))
        .collect();
    let upstream = Upstream {
        log: Arc::new(Mutex::new(Vec::new())),
        users: Arc::new(Mutex::new(users)),
    };
    let log = Arc::clone(&upstream.log);

    let app = Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", axum::routing::put(update_user).delete(delete_user))
        .route("/plain", get(plain))
        .route("/anonymous", get(anonymous))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let registry = GridRegistry::from_yaml_str(&GRIDS.replace("BASE_URL", &base_url)).unwrap();
    let http = reqwest::Client::builder().user_agent("datagrid-tests").build().unwrap();
    let backends = Backends::new(None, UpstreamApi::with_client(http), MemoryStore::from_registry(&registry));
    (Grids { registry, backends }, log)
}

fn service(grids: &Grids, grid_id: &str) -> GridService {
    GridService::new(&grids.registry, &grids.backends, grid_id).unwrap()
}

fn logged(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn page(page_index: usize, page_size: usize) -> QueryParams {
    QueryParams {
        page_index,
        page_size,
        ..QueryParams::default()
    }
}

#[tokio::test]
async fn test_paging_is_forwarded_upstream() {
    let (state, log) = setup().await;

    let data = service(&state, "people").get_data(&page(1, 5)).await.unwrap();

    assert_eq!(logged(&log), vec!["GET /users limit=5 skip=5"]);
    assert_eq!(data.pagination.total_rows, 12);
    let ids: Vec<_> = data.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["6", "7", "8", "9", "10"]);
    assert_eq!(data.rows[0].row_key.display_index, 5);
    assert_eq!(data.rows[0].fields["firstName"], json!("Olivia"));
}

#[tokio::test]
async fn test_search_fetches_everything_and_filters_locally() {
    let (state, log) = setup().await;
    let params = QueryParams {
        page_size: 1,
        search_text: "EM".into(),
        ..QueryParams::default()
    };

    let data = service(&state, "people").get_data(&params).await.unwrap();

    assert_eq!(logged(&log), vec!["GET /users limit=0 skip=-"]);
    assert_eq!(data.pagination.total_rows, 2);
    assert_eq!(data.rows.len(), 1);
    assert_eq!(data.rows[0].fields["firstName"], json!("Emily"));
}

#[tokio::test]
async fn test_bare_array_is_paged_in_process() {
    let (state, _) = setup().await;

    let data = service(&state, "plain").get_data(&page(1, 4)).await.unwrap();

    assert_eq!(data.pagination.total_rows, 12);
    let ids: Vec<_> = data.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["5", "6", "7", "8"]);
}

#[tokio::test]
async fn test_row_keys_without_id() {
    let (state, _) = setup().await;

    let data = service(&state, "anonymous").get_data(&QueryParams::default()).await.unwrap();

    assert_eq!(data.rows[0].id, "7");
    assert!(data.rows[1].id.starts_with("row-"));
    assert_eq!(data.rows[1].row_key.display_index, 1);
}

#[tokio::test]
async fn test_non_editable_update_sends_nothing() {
    let (state, log) = setup().await;

    let err = service(&state, "people")
        .update_field(&RowId::from("3"), "id", json!(30))
        .await
        .unwrap_err();

    assert_eq!(err, GridError::NotEditable("id".into()));
    assert!(logged(&log).is_empty());
}

#[tokio::test]
async fn test_update_returns_upstream_body() {
    let (state, log) = setup().await;

    let result = service(&state, "people")
        .update_field(&RowId::from("3"), "firstName", json!("Zoe"))
        .await
        .unwrap();

    assert_eq!(logged(&log), vec![r#"PUT /users/3 {"firstName":"Zoe"}"#]);
    assert_eq!(result.row_id, "3");
    let upstream = result.api_response.unwrap();
    assert_eq!(upstream["firstName"], json!("Zoe"));
    assert_eq!(upstream["age"], json!(22));
}

#[tokio::test]
async fn test_update_of_missing_row_reports_status() {
    let (state, _) = setup().await;

    let err = service(&state, "people")
        .update_field(&RowId::from("99"), "age", json!(1))
        .await
        .unwrap_err();

    assert!(matches!(err, GridError::Upstream { status: Some(404), .. }));
}

#[tokio::test]
async fn test_row_id_stays_one_path_segment() {
    let (state, log) = setup().await;

    let err = service(&state, "people")
        .update_field(&RowId::from("3/extra"), "age", json!(1))
        .await
        .unwrap_err();

    // `/users/3%2Fextra` reaches the `:id` route and fails to parse as a number
    assert!(matches!(err, GridError::Upstream { status: Some(400), .. }));
    assert!(logged(&log).is_empty());
}

#[tokio::test]
async fn test_bulk_delete_skips_missing_rows() {
    let (state, log) = setup().await;

    let result = service(&state, "people")
        .bulk_delete(&[RowId::from("1"), RowId::from("99")])
        .await
        .unwrap();

    assert_eq!(result.count, BulkCount::Deleted(1));
    assert!(result.errors.is_none());
    assert_eq!(logged(&log), vec!["DELETE /users/1", "DELETE /users/99"]);
}

#[tokio::test]
async fn test_bulk_edit_sends_editable_fields_only() {
    let (state, log) = setup().await;
    let updates = json!({ "age": 40, "id": 1 }).as_object().cloned().unwrap();

    let result = service(&state, "people")
        .bulk_edit(&[RowId::from("1"), RowId::from("2")], &updates)
        .await
        .unwrap();

    assert_eq!(result.count, BulkCount::Updated(2));
    assert_eq!(
        logged(&log),
        vec![r#"PUT /users/1 {"age":40}"#, r#"PUT /users/2 {"age":40}"#]
    );
}

#[tokio::test]
async fn test_unsupported_rest_operations() {
    let (state, log) = setup().await;
    let people = service(&state, "people");
    let updates = json!({ "_adjust": { "field": "age", "type": "amount", "value": 1 } })
        .as_object()
        .cloned()
        .unwrap();

    let err = people.bulk_edit(&[RowId::from("1")], &updates).await.unwrap_err();
    assert!(matches!(err, GridError::Unsupported(_)));

    let err = people.export_data(&[RowId::from("1")]).await.unwrap_err();
    assert!(matches!(err, GridError::Unsupported(_)));

    assert!(logged(&log).is_empty());
}

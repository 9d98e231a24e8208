//! MySQL grid routes over a recording executor

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use datagrid::backend::{SharedExecutor, SqlError, SqlExecutor};
use datagrid::config::GridRegistry;
use datagrid::db::{DatabaseConfig, LazyDatabase};
use datagrid::query::sql::{BindValue, SqlStatement};
use datagrid::server::{router, AppState};

#[derive(Default)]
struct Recorder {
    statements: Mutex<Vec<SqlStatement>>,
    rows: Vec<Map<String, Value>>,
    total: u64,
    affected: usize,
}

impl Recorder {
    fn recorded(&self) -> Vec<SqlStatement> {
        self.statements.lock().unwrap().clone()
    }

    fn push(&self, statement: &SqlStatement) {
        self.statements.lock().unwrap().push(statement.clone());
    }
}

impl SqlExecutor for Recorder {
    fn fetch_count(&self, statement: &SqlStatement) -> Result<u64, SqlError> {
        self.push(statement);
        Ok(self.total)
    }

    fn fetch_rows(&self, statement: &SqlStatement) -> Result<Vec<Map<String, Value>>, SqlError> {
        self.push(statement);
        Ok(self.rows.clone())
    }

    fn execute(&self, statement: &SqlStatement) -> Result<usize, SqlError> {
        self.push(statement);
        if statement.sql.starts_with("ALTER TABLE") {
            return Err(SqlError::query("Duplicate column name 'archived'"));
        }
        Ok(self.affected)
    }
}

fn employee(id: u64, first: &str, salary: f64) -> Map<String, Value> {
    json!({
        "employee_id": id,
        "first_name": first,
        "last_name": "Lovelace",
        "email": format!("{}@example.com", first.to_lowercase()),
        "department": "Engineering",
        "job_title": "Engineer",
        "salary": salary,
        "hire_date": "2020-01-15"
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn app(executor: SharedExecutor) -> Router {
    router(AppState::new(GridRegistry::builtin().unwrap(), Some(executor)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_data_route_issues_count_and_page() {
    let recorder = Arc::new(Recorder {
        rows: vec![employee(31, "Ann", 5000.0)],
        total: 31,
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, body) = send_json(&app, Method::GET, "/api/grid/employees/data?limit=10&offset=30&search=ann", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"], json!({"pageIndex": 3, "pageSize": 10, "totalRows": 31}));
    assert_eq!(body["primaryKey"], json!("employee_id"));
    assert_eq!(body["rows"][0]["id"], json!("31"));
    assert_eq!(body["rows"][0]["rowKey"], json!({"primaryKey": "31", "displayIndex": 30}));
    assert_eq!(body["rows"][0]["canExpand"], json!(true));

    let stmts = recorder.recorded();
    assert_eq!(stmts.len(), 2);
    assert!(stmts[0].sql.starts_with("SELECT COUNT(*) AS total FROM `employees_temp` WHERE"));
    assert!(stmts[1].sql.ends_with("ORDER BY `employee_id` DESC LIMIT 10 OFFSET 30"));
    assert_eq!(stmts[0].binds, stmts[1].binds);
    assert!(stmts[0].binds.iter().all(|b| *b == BindValue::from("%ann%")));
}

#[tokio::test]
async fn test_sort_by_unknown_column_is_ignored() {
    let recorder = Arc::new(Recorder::default());
    let app = app(recorder.clone());
    let uri = "/api/grid/employees/data?sortBy=%5B%7B%22id%22%3A%22salary%3B%20DROP%22%2C%22desc%22%3Atrue%7D%5D";

    let (status, _) = send_json(&app, Method::GET, uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(recorder.recorded()[1].sql.contains("ORDER BY `employee_id` DESC"));
}

#[tokio::test]
async fn test_field_update_binds_value_and_key() {
    let recorder = Arc::new(Recorder {
        affected: 1,
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/grid/employees/field",
        Some(json!({"rowId": {"primaryKey": "7", "displayIndex": 0}, "field": "salary", "value": 72000})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["affectedRows"], json!(1));
    let stmts = recorder.recorded();
    assert_eq!(stmts[0].sql, "UPDATE `employees_temp` SET `salary` = ? WHERE `employee_id` = ?");
    assert_eq!(stmts[0].binds, vec![BindValue::from("72000"), BindValue::from("7")]);
}

#[tokio::test]
async fn test_non_editable_update_runs_no_sql() {
    let recorder = Arc::new(Recorder {
        affected: 1,
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/grid/employees/field",
        Some(json!({"rowId": "7", "field": "employee_id", "value": 8})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], json!("Field 'employee_id' is not editable"));
    assert!(recorder.recorded().is_empty());
}

#[tokio::test]
async fn test_update_of_missing_row() {
    let recorder = Arc::new(Recorder::default());
    let app = app(recorder);

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/grid/employees/field",
        Some(json!({"rowId": "404", "field": "email", "value": "x@example.com"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], json!("No row found with employee_id = 404"));
}

#[tokio::test]
async fn test_archive_tolerates_existing_column() {
    let recorder = Arc::new(Recorder {
        affected: 1,
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/grid/employees/bulk/archive",
        Some(json!({"selectedIds": ["1", "2", "3"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archivedCount"], json!(3));
    assert_eq!(recorder.recorded().len(), 4);
}

#[tokio::test]
async fn test_legacy_salary_adjustment() {
    let recorder = Arc::new(Recorder {
        affected: 1,
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, body) = send_json(
        &app,
        Method::PATCH,
        "/api/grid/employees/bulk/edit",
        Some(json!({"selectedIds": [1, 2], "updates": {"_salaryAdjustment": {"type": "amount", "value": 250}}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updatedCount"], json!(2));
    let stmts = recorder.recorded();
    assert_eq!(stmts.len(), 2);
    assert_eq!(
        stmts[0].sql,
        "UPDATE `employees_temp` SET `salary` = `salary` + ? WHERE `employee_id` = ?"
    );
}

#[tokio::test]
async fn test_export_selects_by_key() {
    let recorder = Arc::new(Recorder {
        rows: vec![employee(1, "Ada", 5000.5), employee(2, "Grace", 6100.0)],
        ..Recorder::default()
    });
    let app = app(recorder.clone());

    let (status, bytes) = send(
        &app,
        Method::POST,
        "/api/grid/employees/export",
        Some(json!({"selectedIds": ["2", "1"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(bytes).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("\"Employee ID\",\"First Name\""));
    assert!(lines[1].starts_with("1,\"Ada\",\"Lovelace\""));

    let stmt = &recorder.recorded()[0];
    assert!(stmt.sql.contains("WHERE `employee_id` IN (?, ?) ORDER BY `employee_id`"));
    assert_eq!(stmt.binds, vec![BindValue::from("2"), BindValue::from("1")]);
}

#[tokio::test]
async fn test_unconfigured_database_fails_per_request() {
    let database: SharedExecutor = Arc::new(LazyDatabase::new(None, DatabaseConfig::default()));
    let app = app(database);

    let (status, body) = send_json(&app, Method::GET, "/api/grid/employees/data", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("Failed to fetch grid data"));
    assert!(body["message"].as_str().unwrap().contains("DATABASE_URL must be set"));

    // Other grids keep working without a database
    let (status, _) = send_json(&app, Method::GET, "/api/grid/departments/data", None).await;
    assert_eq!(status, StatusCode::OK);
}

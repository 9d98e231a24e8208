//! HTTP surface of the grid server.
//!
//! | Route | Method |
//! |-------|--------|
//! | `/api/grids` | GET |
//! | `/api/grid/:gridId/config` | GET |
//! | `/api/grid/:gridId/data` | GET |
//! | `/api/grid/:gridId/field` | PATCH |
//! | `/api/grid/:gridId/bulk/edit` | PATCH |
//! | `/api/grid/:gridId/bulk/archive` | PATCH |
//! | `/api/grid/:gridId/bulk/delete` | DELETE |
//! | `/api/grid/:gridId/export` | POST |
//! | `/health` | GET |

pub mod error;
pub mod handlers;

pub use error::ApiError;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backend::{Backends, MemoryStore, SharedExecutor, UpstreamApi};
use crate::config::GridRegistry;
use crate::error::GridResult;
use crate::service::GridService;

/// Shared state handed to every handler
pub struct AppState {
    pub registry: Arc<GridRegistry>,
    pub backends: Backends,
}

impl AppState {
    /// Wire the registry to its backends. Static grids get fresh in-memory tables.
    pub fn new(registry: GridRegistry, sql: Option<SharedExecutor>) -> Self {
        let memory = MemoryStore::from_registry(&registry);
        AppState {
            registry: Arc::new(registry),
            backends: Backends::new(sql, UpstreamApi::new(), memory),
        }
    }

    pub fn service(&self, grid_id: &str) -> GridResult<GridService> {
        GridService::new(&self.registry, &self.backends, grid_id)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/grids", get(handlers::list_grids))
        .route("/api/grid/:grid_id/config", get(handlers::grid_config))
        .route("/api/grid/:grid_id/data", get(handlers::grid_data))
        .route("/api/grid/:grid_id/field", patch(handlers::update_field))
        .route("/api/grid/:grid_id/bulk/edit", patch(handlers::bulk_edit))
        .route("/api/grid/:grid_id/bulk/archive", patch(handlers::bulk_archive))
        .route("/api/grid/:grid_id/bulk/delete", delete(handlers::bulk_delete))
        .route("/api/grid/:grid_id/export", post(handlers::export))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("datagrid-server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}

//! datagrid-server - HTTP API for config-driven data grids
//!
//! Serves the grids defined in a YAML registry. MySQL grids connect lazily
//! using `DATABASE_URL`; REST and static grids work without a database.

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use datagrid::backend::SharedExecutor;
use datagrid::config::GridRegistry;
use datagrid::db::{DatabaseConfig, LazyDatabase};
use datagrid::server::{self, AppState};

#[derive(Parser)]
#[command(name = "datagrid-server")]
#[command(version, about = "Serve paginated, searchable grids over MySQL, REST APIs or static data", long_about = None)]
struct Cli {
    /// Grid registry YAML (defaults to the bundled grids)
    #[arg(short, long, env = "DATAGRID_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 15)]
    max_connections: u32,
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads its env fallbacks
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let registry = match &cli.config {
        Some(path) => GridRegistry::load_from_file(path),
        None => GridRegistry::builtin(),
    };
    let registry = match registry {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    for config in registry.configs() {
        tracing::info!("Registered grid '{}' ({})", config.id, config.data_source.kind());
    }

    let db_config = DatabaseConfig {
        max_connections: cli.max_connections,
        min_idle: cli.max_connections.min(DatabaseConfig::default().min_idle),
        ..DatabaseConfig::default()
    };
    let database = LazyDatabase::from_env(db_config);
    if !database.is_configured() {
        tracing::warn!("DATABASE_URL is not set; MySQL grids will fail until it is");
    }
    let sql: SharedExecutor = Arc::new(database);

    let state = AppState::new(registry, Some(sql));
    let addr = SocketAddr::new(cli.host, cli.port);

    if let Err(e) = server::serve(addr, state).await {
        eprintln!("Error: server failed on {}: {}", addr, e);
        process::exit(1);
    }
}

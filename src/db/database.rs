//! MySQL connection pool and statement execution.
//!
//! Uses Diesel with r2d2 pooling. Rows are read as one JSON document per row
//! (see [`crate::query::sql::json_projection`]) so grids need no generated
//! schema.

use diesel::mysql::{Mysql, MysqlConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::r2d2::ConnectionManager;
use diesel::sql_types::{BigInt, Nullable, Text};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use super::DatabaseConfig;
use crate::backend::sql::{parse_row_json, SqlError, SqlExecutor};
use crate::query::sql::SqlStatement;

pub type Pool = r2d2::Pool<ConnectionManager<MysqlConnection>>;
pub type PooledConnection = r2d2::PooledConnection<ConnectionManager<MysqlConnection>>;

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Text)]
    row_json: String,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
}

/// Database connection pool manager
pub struct Database {
    pool: Arc<Pool>,
}

impl Database {
    /// Create a new database with custom configuration
    pub fn new_with_config(database_url: &str, config: DatabaseConfig) -> Result<Self, SqlError> {
        let manager = ConnectionManager::<MysqlConnection>::new(database_url);

        let pool = r2d2::Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_idle))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .max_lifetime(Some(Duration::from_secs(config.max_lifetime_secs)))
            .build(manager)
            .map_err(|e| SqlError::connection(format!("Failed to create connection pool: {}", e)))?;

        Ok(Database {
            pool: Arc::new(pool),
        })
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<PooledConnection, SqlError> {
        self.pool
            .get()
            .map_err(|e| SqlError::connection(format!("Failed to get connection: {}", e)))
    }

    /// Test database connectivity
    pub fn test_connection(&self) -> Result<(), SqlError> {
        let mut conn = self.get_connection()?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(|e| SqlError::query(e.to_string()))?;
        Ok(())
    }
}

fn bound(statement: &SqlStatement) -> BoxedSqlQuery<'static, Mysql, SqlQuery> {
    let mut query = diesel::sql_query(statement.sql.clone()).into_boxed::<Mysql>();
    for value in &statement.binds {
        query = query.bind::<Nullable<Text>, _>(value.as_option());
    }
    query
}

impl SqlExecutor for Database {
    fn fetch_count(&self, statement: &SqlStatement) -> Result<u64, SqlError> {
        let mut conn = self.get_connection()?;
        let rows: Vec<CountRow> = bound(statement)
            .load(&mut conn)
            .map_err(|e| SqlError::query(e.to_string()))?;
        Ok(rows.first().map(|r| r.total.max(0) as u64).unwrap_or(0))
    }

    fn fetch_rows(&self, statement: &SqlStatement) -> Result<Vec<Map<String, JsonValue>>, SqlError> {
        let mut conn = self.get_connection()?;
        let rows: Vec<JsonRow> = bound(statement)
            .load(&mut conn)
            .map_err(|e| SqlError::query(e.to_string()))?;
        rows.iter().map(|r| parse_row_json(&r.row_json)).collect()
    }

    fn execute(&self, statement: &SqlStatement) -> Result<usize, SqlError> {
        let mut conn = self.get_connection()?;
        bound(statement)
            .execute(&mut conn)
            .map_err(|e| SqlError::query(e.to_string()))
    }
}

//! Mutable in-memory tables for static grids.
//!
//! Each static grid gets a table seeded from its configured rows. Writes land
//! in the table; the grid configuration itself never changes.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{DataSource, GridRegistry, StaticSource};
use crate::query::render_key;

type Fields = Map<String, JsonValue>;

#[derive(Debug)]
pub struct MemoryTable {
    primary_key: String,
    rows: RwLock<Vec<Fields>>,
}

impl MemoryTable {
    pub fn new(source: &StaticSource) -> Self {
        MemoryTable {
            primary_key: source.primary_key.clone(),
            rows: RwLock::new(source.data.clone()),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Copy of all rows in insertion order
    pub fn snapshot(&self) -> Vec<Fields> {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `change` to the row with this key. Returns false if absent.
    pub fn update<F>(&self, key: &str, change: F) -> bool
    where
        F: FnOnce(&mut Fields),
    {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        match rows.iter_mut().find(|r| self.key_matches(r, key)) {
            Some(row) => {
                change(row);
                true
            }
            None => false,
        }
    }

    /// Remove the row with this key. Returns false if absent.
    pub fn remove(&self, key: &str) -> bool {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|r| !self.key_matches(r, key));
        rows.len() != before
    }

    /// Rows whose key is in `keys`, in table order
    pub fn find_all(&self, keys: &[String]) -> Vec<Fields> {
        self.rows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| keys.iter().any(|k| self.key_matches(r, k)))
            .cloned()
            .collect()
    }

    fn key_matches(&self, row: &Fields, key: &str) -> bool {
        row.get(&self.primary_key)
            .and_then(render_key)
            .map(|k| k == key)
            .unwrap_or(false)
    }
}

/// All static tables, keyed by grid id
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Arc<MemoryTable>>,
}

impl MemoryStore {
    pub fn from_registry(registry: &GridRegistry) -> Self {
        let tables = registry
            .configs()
            .filter_map(|config| match &config.data_source {
                DataSource::Static { source } => {
                    Some((config.id.clone(), Arc::new(MemoryTable::new(source))))
                }
                _ => None,
            })
            .collect();
        MemoryStore { tables }
    }

    pub fn table(&self, grid_id: &str) -> Option<Arc<MemoryTable>> {
        self.tables.get(grid_id).cloned()
    }
}

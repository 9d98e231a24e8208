//! Client-side page cache with optimistic cell updates.
//!
//! Every in-flight edit is a pending mutation with its own [`MutationId`].
//! Starting an edit writes the new value into every cached page of the grid
//! and remembers what it replaced; committing forgets the old values and
//! rolling back restores them. Whether a cell is "updating" is derived from
//! the pending set rather than stored separately.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::query::QueryParams;
use crate::service::DataResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(Uuid);

impl MutationId {
    fn new() -> Self {
        MutationId(Uuid::new_v4())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cache key: one grid queried with one set of parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub grid_id: String,
    params: String,
}

impl PageKey {
    pub fn new(grid_id: &str, params: &QueryParams) -> Self {
        PageKey {
            grid_id: grid_id.to_string(),
            params: serde_json::to_string(params).unwrap_or_default(),
        }
    }
}

/// A single-cell edit awaiting the server's answer
#[derive(Debug, Clone, PartialEq)]
pub struct CellMutation {
    pub grid_id: String,
    pub row_id: String,
    pub field: String,
    pub value: JsonValue,
    /// Value each cached page held before the edit; `None` if the field was absent
    previous: Vec<(PageKey, Option<JsonValue>)>,
}

impl CellMutation {
    fn targets(&self, grid_id: &str, row_id: &str, field: &str) -> bool {
        self.grid_id == grid_id && self.row_id == row_id && self.field == field
    }
}

/// Registry of pending cell mutations
#[derive(Debug, Default)]
pub struct MutationTracker {
    pending: HashMap<MutationId, CellMutation>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, mutation: CellMutation) -> MutationId {
        let id = MutationId::new();
        self.pending.insert(id, mutation);
        id
    }

    /// Settle a mutation as saved. Returns it if it was pending.
    pub fn commit(&mut self, id: MutationId) -> Option<CellMutation> {
        self.pending.remove(&id)
    }

    /// Settle a mutation as failed. Returns it so the caller can undo it.
    pub fn rollback(&mut self, id: MutationId) -> Option<CellMutation> {
        self.pending.remove(&id)
    }

    pub fn is_cell_updating(&self, grid_id: &str, row_id: &str, field: &str) -> bool {
        self.pending.values().any(|m| m.targets(grid_id, row_id, field))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Cached `DataResult` pages plus the mutations applied on top of them
#[derive(Debug, Default)]
pub struct GridCache {
    pages: HashMap<PageKey, DataResult>,
    tracker: MutationTracker,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, grid_id: &str, params: &QueryParams) -> Option<&DataResult> {
        self.pages.get(&PageKey::new(grid_id, params))
    }

    pub fn insert(&mut self, params: &QueryParams, page: DataResult) {
        self.pages.insert(PageKey::new(&page.grid_id, params), page);
    }

    /// Drop every cached page of a grid, e.g. after a bulk operation.
    pub fn invalidate(&mut self, grid_id: &str) {
        self.pages.retain(|key, _| key.grid_id != grid_id);
    }

    /// Apply an edit to all cached pages of the grid and start tracking it.
    pub fn begin_update(&mut self, grid_id: &str, row_id: &str, field: &str, value: JsonValue) -> MutationId {
        let mut previous = Vec::new();
        for (key, page) in self.pages.iter_mut().filter(|(k, _)| k.grid_id == grid_id) {
            for row in page.rows.iter_mut().filter(|r| r.id == row_id) {
                let old = row.fields.insert(field.to_string(), value.clone());
                previous.push((key.clone(), old));
            }
        }

        self.tracker.begin(CellMutation {
            grid_id: grid_id.to_string(),
            row_id: row_id.to_string(),
            field: field.to_string(),
            value,
            previous,
        })
    }

    pub fn commit(&mut self, id: MutationId) -> bool {
        self.tracker.commit(id).is_some()
    }

    /// Restore the values the mutation replaced. Returns false if it was not pending.
    pub fn rollback(&mut self, id: MutationId) -> bool {
        let Some(mutation) = self.tracker.rollback(id) else {
            return false;
        };
        for (key, old) in mutation.previous {
            let Some(page) = self.pages.get_mut(&key) else {
                continue;
            };
            for row in page.rows.iter_mut().filter(|r| r.id == mutation.row_id) {
                match &old {
                    Some(value) => {
                        row.fields.insert(mutation.field.clone(), value.clone());
                    }
                    None => {
                        row.fields.remove(&mutation.field);
                    }
                }
            }
        }
        true
    }

    pub fn is_cell_updating(&self, grid_id: &str, row_id: &str, field: &str) -> bool {
        self.tracker.is_cell_updating(grid_id, row_id, field)
    }

    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }
}

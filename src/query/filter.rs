//! In-process search, sort and pagination.
//!
//! Used for static grids and for REST grids whose upstream cannot search.

use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

use super::{QueryParams, SortSpec};
use crate::config::GridConfig;

type Fields = Map<String, JsonValue>;

/// Columns the current search term applies to.
///
/// `filterBy` narrows the search to one column, but only when that column is
/// searchable; otherwise every searchable column is used.
pub fn search_columns<'a>(config: &'a GridConfig, params: &QueryParams) -> Vec<&'a str> {
    let searchable = config.searchable_columns();
    if !params.filter_by.is_empty() {
        if let Some(col) = searchable.iter().find(|c| **c == params.filter_by) {
            return vec![col.as_str()];
        }
    }
    searchable.iter().map(String::as_str).collect()
}

/// Case-insensitive substring match of `needle_lower` against any listed column.
pub fn matches_search(row: &Fields, columns: &[&str], needle_lower: &str) -> bool {
    columns.iter().any(|col| match row.get(*col) {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => s.to_lowercase().contains(needle_lower),
        Some(other) => other.to_string().to_lowercase().contains(needle_lower),
    })
}

/// Drop rows that do not match the request's search term.
pub fn apply_search(rows: Vec<Fields>, config: &GridConfig, params: &QueryParams) -> Vec<Fields> {
    let Some(term) = params.search_term() else {
        return rows;
    };
    if !config.search_enabled() {
        return rows;
    }
    let columns = search_columns(config, params);
    let needle = term.to_lowercase();
    rows.into_iter()
        .filter(|row| matches_search(row, &columns, &needle))
        .collect()
}

/// Stable multi-key sort. Unknown sort ids are ignored.
pub fn sort_rows(rows: &mut [Fields], config: &GridConfig, sort_by: &[SortSpec]) {
    let keys: Vec<&SortSpec> = sort_by
        .iter()
        .filter(|s| config.column(&s.id).is_some())
        .collect();
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in &keys {
            let ord = compare_values(a.get(&key.id), b.get(&key.id));
            let ord = if key.desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Missing and null sort first, numbers numerically, everything else by its text.
pub fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => sort_text(x).cmp(&sort_text(y)),
    }
}

fn sort_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Slice out one page; pages past the end are empty.
pub fn paginate<T: Clone>(rows: &[T], page_index: usize, page_size: usize) -> Vec<T> {
    let start = page_index.saturating_mul(page_size);
    if start >= rows.len() {
        return Vec::new();
    }
    let end = start.saturating_add(page_size).min(rows.len());
    rows[start..end].to_vec()
}

//! SQL text for relational grids.
//!
//! Identifiers come from validated grid configs and are backtick-quoted;
//! every user-supplied value travels as a bound parameter.

use serde_json::Value as JsonValue;

use super::filter::search_columns;
use super::{AdjustmentKind, NumericAdjustment, QueryParams, SortSpec};
use crate::config::{GridConfig, MysqlSource};

/// Parameter bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Null,
    Text(String),
}

impl From<&JsonValue> for BindValue {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => BindValue::Null,
            JsonValue::String(s) => BindValue::Text(s.clone()),
            JsonValue::Bool(true) => BindValue::Text("1".to_string()),
            JsonValue::Bool(false) => BindValue::Text("0".to_string()),
            other => BindValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl BindValue {
    pub fn as_option(&self) -> Option<String> {
        match self {
            BindValue::Null => None,
            BindValue::Text(s) => Some(s.clone()),
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlStatement {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<BindValue>) -> Self {
        self.binds.push(value.into());
        self
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Fully qualified table reference
pub fn table_ref(source: &MysqlSource) -> String {
    match &source.database {
        Some(db) => format!("{}.{}", quote_ident(db), quote_ident(&source.table)),
        None => quote_ident(&source.table),
    }
}

/// `WHERE` clause for the search term, or an empty clause.
pub fn where_clause(config: &GridConfig, params: &QueryParams) -> SqlStatement {
    let (Some(term), true) = (params.search_term(), config.search_enabled()) else {
        return SqlStatement::new("");
    };
    let columns = search_columns(config, params);
    if columns.is_empty() {
        return SqlStatement::new("");
    }

    let pattern = format!("%{}%", term);
    let conditions: Vec<String> = columns
        .iter()
        .map(|c| format!("{} LIKE ?", quote_ident(c)))
        .collect();
    SqlStatement {
        sql: format!(" WHERE {}", conditions.join(" OR ")),
        binds: columns.iter().map(|_| BindValue::Text(pattern.clone())).collect(),
    }
}

/// `ORDER BY` over known columns, falling back to primary key descending.
pub fn order_by_clause(config: &GridConfig, sort_by: &[SortSpec]) -> String {
    let parts: Vec<String> = sort_by
        .iter()
        .filter(|s| config.column(&s.id).is_some())
        .map(|s| format!("{} {}", quote_ident(&s.id), if s.desc { "DESC" } else { "ASC" }))
        .collect();

    if parts.is_empty() {
        format!(" ORDER BY {} DESC", quote_ident(config.primary_key()))
    } else {
        format!(" ORDER BY {}", parts.join(", "))
    }
}

/// Projection yielding each row as one JSON document in `row_json`
pub fn json_projection(config: &GridConfig) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(config.columns.len() + 1);
    let pk = config.primary_key();
    if config.column(pk).is_none() {
        fields.push(format!("'{}', {}", pk, quote_ident(pk)));
    }
    fields.extend(
        config
            .columns
            .iter()
            .map(|c| format!("'{}', {}", c.id, quote_ident(&c.id))),
    );
    format!("CAST(JSON_OBJECT({}) AS CHAR) AS row_json", fields.join(", "))
}

pub fn count_query(config: &GridConfig, source: &MysqlSource, params: &QueryParams) -> SqlStatement {
    let filter = where_clause(config, params);
    SqlStatement {
        sql: format!("SELECT COUNT(*) AS total FROM {}{}", table_ref(source), filter.sql),
        binds: filter.binds,
    }
}

pub fn page_query(
    config: &GridConfig,
    source: &MysqlSource,
    params: &QueryParams,
    limit: usize,
    offset: usize,
) -> SqlStatement {
    let filter = where_clause(config, params);
    SqlStatement {
        sql: format!(
            "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
            json_projection(config),
            table_ref(source),
            filter.sql,
            order_by_clause(config, &params.sort_by),
            limit,
            offset
        ),
        binds: filter.binds,
    }
}

pub fn update_field(source: &MysqlSource, field: &str, value: &JsonValue, pk: &str) -> SqlStatement {
    SqlStatement::new(format!(
        "UPDATE {} SET {} = ? WHERE {} = ?",
        table_ref(source),
        quote_ident(field),
        quote_ident(&source.primary_key)
    ))
    .bind(value)
    .bind(pk)
}

pub fn adjust_field(source: &MysqlSource, adjustment: &NumericAdjustment, pk: &str) -> SqlStatement {
    let col = quote_ident(&adjustment.field);
    let expr = match adjustment.kind {
        AdjustmentKind::Percentage => format!("ROUND({} * (1 + ? / 100), 2)", col),
        AdjustmentKind::Amount => format!("{} + ?", col),
    };
    SqlStatement::new(format!(
        "UPDATE {} SET {} = {} WHERE {} = ?",
        table_ref(source),
        col,
        expr,
        quote_ident(&source.primary_key)
    ))
    .bind(BindValue::Text(adjustment.value.to_string()))
    .bind(pk)
}

pub fn delete_row(source: &MysqlSource, pk: &str) -> SqlStatement {
    SqlStatement::new(format!(
        "DELETE FROM {} WHERE {} = ?",
        table_ref(source),
        quote_ident(&source.primary_key)
    ))
    .bind(pk)
}

pub fn add_archived_column(source: &MysqlSource) -> SqlStatement {
    SqlStatement::new(format!(
        "ALTER TABLE {} ADD COLUMN `archived` BOOLEAN DEFAULT FALSE",
        table_ref(source)
    ))
}

pub fn archive_row(source: &MysqlSource, pk: &str) -> SqlStatement {
    SqlStatement::new(format!(
        "UPDATE {} SET `archived` = TRUE WHERE {} = ?",
        table_ref(source),
        quote_ident(&source.primary_key)
    ))
    .bind(pk)
}

/// Selected rows ordered by primary key
pub fn export_rows(config: &GridConfig, source: &MysqlSource, pks: &[String]) -> SqlStatement {
    let placeholders = vec!["?"; pks.len()].join(", ");
    SqlStatement {
        sql: format!(
            "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
            json_projection(config),
            table_ref(source),
            quote_ident(&source.primary_key),
            placeholders,
            quote_ident(&source.primary_key)
        ),
        binds: pks.iter().map(|pk| BindValue::Text(pk.clone())).collect(),
    }
}

//! Declarative row-expansion predicates.
//!
//! A grid decides per row whether the detail panel may open. The rule is data,
//! interpreted here against the row's fields; configuration never carries code.
//!
//! ```yaml
//! canExpand:
//!   rule: all
//!   rules:
//!     - { rule: fieldPresent, field: email }
//!     - { rule: fieldNotEquals, field: status, value: terminated }
//!     - rule: not
//!       inner: { rule: fieldEquals, field: role, value: contractor }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Predicate deciding whether a row can be expanded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum ExpandRule {
    #[default]
    Always,
    Never,
    /// Field exists and is not null
    FieldPresent { field: String },
    /// Field is present and not `false`, `0`, or an empty string
    FieldTruthy { field: String },
    FieldEquals { field: String, value: JsonValue },
    FieldNotEquals { field: String, value: JsonValue },
    All { rules: Vec<ExpandRule> },
    Any { rules: Vec<ExpandRule> },
    /// Negation; the operand is `inner` since `rule` is the tag
    Not { inner: Box<ExpandRule> },
}

impl ExpandRule {
    /// Evaluate the rule against one row.
    pub fn evaluate(&self, row: &Map<String, JsonValue>) -> bool {
        match self {
            ExpandRule::Always => true,
            ExpandRule::Never => false,
            ExpandRule::FieldPresent { field } => {
                row.get(field).map(|v| !v.is_null()).unwrap_or(false)
            }
            ExpandRule::FieldTruthy { field } => row.get(field).map(is_truthy).unwrap_or(false),
            ExpandRule::FieldEquals { field, value } => {
                row.get(field).map(|v| loosely_equal(v, value)).unwrap_or(false)
            }
            ExpandRule::FieldNotEquals { field, value } => {
                !row.get(field).map(|v| loosely_equal(v, value)).unwrap_or(false)
            }
            ExpandRule::All { rules } => rules.iter().all(|r| r.evaluate(row)),
            ExpandRule::Any { rules } => rules.iter().any(|r| r.evaluate(row)),
            ExpandRule::Not { inner } => !inner.evaluate(row),
        }
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// Numbers compare by value so `1` from MySQL matches `1.0` from YAML; a
/// string row value matches a number literal with the same rendering.
fn loosely_equal(row_value: &JsonValue, expected: &JsonValue) -> bool {
    match (row_value, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::String(a), JsonValue::Number(b)) => *a == b.to_string(),
        (JsonValue::Number(a), JsonValue::String(b)) => a.to_string() == *b,
        _ => row_value == expected,
    }
}

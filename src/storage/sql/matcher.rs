//! Metadata constraint translation to dialect SQL.
//!
//! Field names are re-validated here because constraints can be built
//! directly; operators come from a fixed enum and values are escaped, so
//! the rendered predicate carries no caller-controlled SQL.

use serde_json::Value;

use crate::interfaces::event_store::{EventStoreError, Result};
use crate::metadata::{validate_field, MetadataConstraint, Operator};

pub(crate) fn render_postgres(constraint: &MetadataConstraint) -> Result<String> {
    validate_field(&constraint.field)?;
    let field = &constraint.field;
    let text = format!("metadata->>'{field}'");
    match constraint.operator {
        Operator::In | Operator::NotIn => {
            let keyword = list_keyword(constraint.operator);
            let items = list_items(constraint)?;
            if items.iter().all(|v| v.is_number()) {
                Ok(format!(
                    "({text})::numeric {keyword} ({})",
                    join_numbers(items)
                ))
            } else {
                Ok(format!("{text} {keyword} ({})", join_text(items, escape_postgres)))
            }
        }
        Operator::Regex => {
            let pattern = pattern_of(constraint)?;
            Ok(format!("{text} ~ '{}'", escape_postgres(pattern)))
        }
        op => {
            let sql_op = comparison_sql(op);
            match &constraint.value {
                Value::Number(n) => Ok(format!("({text})::numeric {sql_op} {n}")),
                Value::Bool(b) => Ok(format!("({text})::boolean {sql_op} {b}")),
                Value::String(s) => Ok(format!("{text} {sql_op} '{}'", escape_postgres(s))),
                other => Err(non_scalar(field, other)),
            }
        }
    }
}

pub(crate) fn render_mysql(constraint: &MetadataConstraint) -> Result<String> {
    validate_field(&constraint.field)?;
    let field = &constraint.field;
    let json = format!("JSON_EXTRACT(metadata, '$.{field}')");
    let text = format!("JSON_UNQUOTE({json})");
    match constraint.operator {
        Operator::In | Operator::NotIn => {
            let keyword = list_keyword(constraint.operator);
            let items = list_items(constraint)?;
            if items.iter().all(|v| v.is_number()) {
                Ok(format!("{json} {keyword} ({})", join_numbers(items)))
            } else {
                Ok(format!("{text} {keyword} ({})", join_text(items, escape_mysql)))
            }
        }
        Operator::Regex => {
            let pattern = pattern_of(constraint)?;
            Ok(format!("{text} REGEXP '{}'", escape_mysql(pattern)))
        }
        op => {
            let sql_op = comparison_sql(op);
            match &constraint.value {
                Value::Number(n) => Ok(format!("{json} {sql_op} {n}")),
                Value::Bool(b) => Ok(format!("{json} {sql_op} {b}")),
                Value::String(s) => Ok(format!("{text} {sql_op} '{}'", escape_mysql(s))),
                other => Err(non_scalar(field, other)),
            }
        }
    }
}

fn comparison_sql(operator: Operator) -> &'static str {
    match operator {
        Operator::Equals => "=",
        Operator::NotEquals => "!=",
        Operator::GreaterThan => ">",
        Operator::GreaterThanEquals => ">=",
        Operator::LowerThan => "<",
        Operator::LowerThanEquals => "<=",
        // handled before comparison_sql is consulted
        Operator::In | Operator::NotIn | Operator::Regex => "=",
    }
}

fn list_keyword(operator: Operator) -> &'static str {
    if operator == Operator::NotIn {
        "NOT IN"
    } else {
        "IN"
    }
}

fn list_items(constraint: &MetadataConstraint) -> Result<&[Value]> {
    match &constraint.value {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(EventStoreError::InvalidConstraint(format!(
            "constraint on {:?}: IN requires a non-empty array",
            constraint.field
        ))),
    }
}

fn pattern_of(constraint: &MetadataConstraint) -> Result<&str> {
    constraint.value.as_str().ok_or_else(|| {
        EventStoreError::InvalidConstraint(format!(
            "constraint on {:?}: REGEX requires a pattern string",
            constraint.field
        ))
    })
}

fn non_scalar(field: &str, value: &Value) -> EventStoreError {
    EventStoreError::InvalidConstraint(format!(
        "constraint on {field:?}: comparison requires a scalar value, got {value}"
    ))
}

fn join_numbers(items: &[Value]) -> String {
    items
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render every list element as quoted text. Non-string scalars take their
/// JSON text form so mixed lists stay comparable against the text accessor.
fn join_text(items: &[Value], escape: fn(&str) -> String) -> String {
    items
        .iter()
        .map(|v| match v {
            Value::String(s) => format!("'{}'", escape(s)),
            other => format!("'{}'", escape(&other.to_string())),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_postgres(text: &str) -> String {
    text.replace('\'', "''")
}

fn escape_mysql(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "''")
}

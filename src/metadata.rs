//! Composable predicates over event metadata.
//!
//! A [`MetadataMatcher`] is an ordered conjunction of field constraints.
//! SQL backends translate each constraint into a dialect expression at load
//! time; the in-memory backend evaluates them directly.

use regex::Regex;
use serde_json::Value;

use crate::envelope::JsonMap;
use crate::interfaces::event_store::{EventStoreError, Result};

/// Comparison operator of a metadata constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanEquals,
    LowerThan,
    LowerThanEquals,
    In,
    NotIn,
    Regex,
}

/// One `(field, op, value)` predicate.
#[derive(Debug, Clone)]
pub struct MetadataConstraint {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

/// Ordered conjunction of metadata constraints.
#[derive(Debug, Clone, Default)]
pub struct MetadataMatcher {
    constraints: Vec<MetadataConstraint>,
}

impl MetadataMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint.
    ///
    /// Field names are restricted to `[A-Za-z0-9_.-]`. `In`/`NotIn` require
    /// a non-empty array of scalars, `Regex` requires a valid pattern
    /// string, and the remaining operators require a scalar value.
    pub fn with(
        mut self,
        field: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let field = field.into();
        let value = value.into();
        validate_field(&field)?;
        validate_value(&field, operator, &value)?;
        self.constraints.push(MetadataConstraint {
            field,
            operator,
            value,
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &[MetadataConstraint] {
        &self.constraints
    }

    /// Evaluate the conjunction against a metadata mapping.
    ///
    /// A constraint on an absent field never matches.
    pub fn matches(&self, metadata: &JsonMap) -> Result<bool> {
        for constraint in &self.constraints {
            let Some(actual) = metadata.get(&constraint.field) else {
                return Ok(false);
            };
            if !constraint_matches(constraint, actual)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub(crate) fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(EventStoreError::InvalidConstraint(format!(
            "invalid metadata field name: {field:?}"
        )))
    }
}

fn validate_value(field: &str, operator: Operator, value: &Value) -> Result<()> {
    let invalid = |reason: &str| {
        Err(EventStoreError::InvalidConstraint(format!(
            "constraint on {field:?}: {reason}"
        )))
    };
    match operator {
        Operator::In | Operator::NotIn => match value {
            Value::Array(items) if items.is_empty() => invalid("IN list must not be empty"),
            Value::Array(items) if items.iter().all(is_scalar) => Ok(()),
            _ => invalid("IN requires an array of scalar values"),
        },
        Operator::Regex => match value {
            Value::String(pattern) => {
                Regex::new(pattern)
                    .map_err(|e| EventStoreError::InvalidConstraint(e.to_string()))?;
                Ok(())
            }
            _ => invalid("REGEX requires a pattern string"),
        },
        _ if is_scalar(value) => Ok(()),
        _ => invalid("comparison requires a scalar value"),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn constraint_matches(constraint: &MetadataConstraint, actual: &Value) -> Result<bool> {
    let expected = &constraint.value;
    Ok(match constraint.operator {
        Operator::Equals => actual == expected,
        Operator::NotEquals => actual != expected,
        Operator::GreaterThan => compare(actual, expected) == Some(std::cmp::Ordering::Greater),
        Operator::GreaterThanEquals => matches!(
            compare(actual, expected),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        Operator::LowerThan => compare(actual, expected) == Some(std::cmp::Ordering::Less),
        Operator::LowerThanEquals => matches!(
            compare(actual, expected),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        Operator::In => in_list(actual, expected),
        Operator::NotIn => !in_list(actual, expected),
        Operator::Regex => {
            let Some(pattern) = expected.as_str() else {
                return Ok(false);
            };
            let Some(text) = actual.as_str() else {
                return Ok(false);
            };
            let regex = Regex::new(pattern)
                .map_err(|e| EventStoreError::InvalidConstraint(e.to_string()))?;
            regex.is_match(text)
        }
    })
}

fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn in_list(actual: &Value, expected: &Value) -> bool {
    expected
        .as_array()
        .map(|items| items.contains(actual))
        .unwrap_or(false)
}

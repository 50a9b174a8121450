//! Condition evaluation — the gate between transform and write.
//!
//! All conditions must hold (logical AND). Operators are validated for the
//! whole list before the first condition is evaluated; evaluation then
//! short-circuits on the first failing condition.

use std::cmp::Ordering;
use std::str::FromStr;

use adapters::Record;
use serde_json::Value;

use crate::EngineError;
use crate::field::{display, resolve};
use crate::models::Condition;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Exists,
    NotExists,
}

impl FromStr for Operator {
    type Err = ();

    /// Accepts the camelCase names and their snake_case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "notEquals" | "not_equals" => Ok(Self::NotEquals),
            "contains" => Ok(Self::Contains),
            "notContains" | "not_contains" => Ok(Self::NotContains),
            "greaterThan" | "greater_than" => Ok(Self::GreaterThan),
            "lessThan" | "less_than" => Ok(Self::LessThan),
            "exists" => Ok(Self::Exists),
            "notExists" | "not_exists" => Ok(Self::NotExists),
            _ => Err(()),
        }
    }
}

/// A condition whose operator has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition<'a> {
    pub field: &'a str,
    pub operator: Operator,
    pub expected: &'a Value,
}

impl CompiledCondition<'_> {
    /// Evaluate against `record`.
    pub fn holds(&self, record: &Record) -> bool {
        let actual = resolve(record, self.field);
        match self.operator {
            Operator::Equals => actual.is_some_and(|a| values_equal(a, self.expected)),
            Operator::NotEquals => !actual.is_some_and(|a| values_equal(a, self.expected)),
            Operator::Contains => actual.is_some_and(|a| contains(a, self.expected)),
            Operator::NotContains => !actual.is_some_and(|a| contains(a, self.expected)),
            Operator::GreaterThan => {
                actual.and_then(|a| compare(a, self.expected)) == Some(Ordering::Greater)
            }
            Operator::LessThan => {
                actual.and_then(|a| compare(a, self.expected)) == Some(Ordering::Less)
            }
            Operator::Exists => actual.is_some(),
            Operator::NotExists => actual.is_none(),
        }
    }
}

/// Validate every operator in the list.
///
/// # Errors
/// [`EngineError::UnsupportedOperator`] for the first unknown operator.
pub fn compile(conditions: &[Condition]) -> Result<Vec<CompiledCondition<'_>>, EngineError> {
    conditions
        .iter()
        .map(|c| {
            let operator = c.operator.parse::<Operator>().map_err(|()| {
                EngineError::UnsupportedOperator {
                    field: c.field.clone(),
                    operator: c.operator.clone(),
                }
            })?;
            Ok(CompiledCondition {
                field: &c.field,
                operator,
                expected: &c.value,
            })
        })
        .collect()
}

/// `true` when every condition holds. An empty list is no gate at all.
pub fn evaluate(record: &Record, conditions: &[Condition]) -> Result<bool, EngineError> {
    let compiled = compile(conditions)?;
    Ok(compiled.iter().all(|c| c.holds(record)))
}

/// Strict equality; numbers compare by value so `20` equals `20.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Substring test for strings, membership test for arrays.
fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(display(needle).as_str()),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

/// Ordering between two values, if they are comparable.
///
/// Numbers compare numerically and strings lexicographically. A numeric
/// string against a number compares numerically; everything else is
/// incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => {
            let x = as_number(a)?;
            let y = as_number(b)?;
            x.partial_cmp(&y)
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

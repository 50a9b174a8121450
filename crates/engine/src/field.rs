//! Field resolution against a record.
//!
//! `None` is the absent sentinel; a present JSON `null` resolves to
//! `Some(&Value::Null)`. The `exists` / `notExists` operators rely on that
//! distinction.

use adapters::Record;
use serde_json::Value;

/// Resolve `path` in `record`.
///
/// A flat key always wins: `"user.email"` first looks for a top-level key
/// spelled exactly `user.email`. Only when that key is missing is the path
/// walked segment by segment through nested objects (numeric segments index
/// into arrays).
pub fn resolve<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }
    if !path.contains('.') {
        return None;
    }

    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// String form of a value used by `map` lookups, templates and `concat`:
/// strings verbatim, everything else as JSON text.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JavaScript-style truthiness, used by `format` to skip empty values.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

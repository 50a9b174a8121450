//! Transformation engine.
//!
//! Transformations are compiled up front and only then applied, so a bad
//! entry anywhere in the list fails the stage before any field is touched.
//! Each transformation reads the *current* record (including the output of
//! earlier transformations) and writes back into its own top-level `field`.

use adapters::Record;
use serde_json::{Map, Value};

use crate::EngineError;
use crate::field::{display, is_truthy, resolve};
use crate::models::{AppliedTransformation, Transformation};

/// Case/whitespace operation for the `format` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatOp {
    Uppercase,
    Lowercase,
    /// First character upper-cased, the rest lower-cased.
    Capitalize,
    Trim,
}

impl FormatOp {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "uppercase" => Some(Self::Uppercase),
            "lowercase" => Some(Self::Lowercase),
            "capitalize" => Some(Self::Capitalize),
            "trim" => Some(Self::Trim),
            _ => None,
        }
    }

    fn apply(self, input: &str) -> String {
        match self {
            Self::Uppercase => input.to_uppercase(),
            Self::Lowercase => input.to_lowercase(),
            Self::Trim => input.trim().to_owned(),
            Self::Capitalize => {
                let mut chars = input.chars();
                let Some(first) = chars.next() else {
                    return String::new();
                };
                let mut out: String = first.to_uppercase().collect();
                out.push_str(&chars.as_str().to_lowercase());
                out
            }
        }
    }
}

/// A validated transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    /// Lookup table keyed by the field's string form.
    Map(Map<String, Value>),
    /// Template with `${key}` placeholders.
    Template(String),
    /// Fields to join with a single space.
    Concat(Vec<String>),
    /// Literal delimiter.
    Split(String),
    Format(FormatOp),
}

/// A transformation ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTransformation {
    pub field: String,
    pub kind: String,
    pub op: TransformOp,
}

fn unsupported(t: &Transformation, detail: impl Into<String>) -> EngineError {
    EngineError::UnsupportedTransformation {
        field: t.field.clone(),
        detail: detail.into(),
    }
}

fn compile_one(t: &Transformation) -> Result<CompiledTransformation, EngineError> {
    let op = match t.kind.as_str() {
        "map" => match &t.value {
            Value::Object(table) => TransformOp::Map(table.clone()),
            _ => return Err(unsupported(t, "map requires an object lookup table")),
        },
        "template" => match &t.value {
            Value::String(template) => TransformOp::Template(template.clone()),
            _ => return Err(unsupported(t, "template requires a string value")),
        },
        "concat" => {
            let fields = t
                .value
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|item| item.as_str().map(str::to_owned))
                        .collect::<Option<Vec<_>>>()
                })
                .ok_or_else(|| unsupported(t, "concat requires an array of field names"))?;
            TransformOp::Concat(fields)
        }
        "split" => match &t.value {
            Value::String(delimiter) => TransformOp::Split(delimiter.clone()),
            _ => return Err(unsupported(t, "split requires a string delimiter")),
        },
        "format" => {
            let format = t
                .value
                .as_str()
                .and_then(FormatOp::parse)
                .ok_or_else(|| {
                    unsupported(t, format!("unknown format '{}'", display(&t.value)))
                })?;
            TransformOp::Format(format)
        }
        other => return Err(unsupported(t, format!("unknown kind '{other}'"))),
    };

    Ok(CompiledTransformation {
        field: t.field.clone(),
        kind: t.kind.clone(),
        op,
    })
}

/// Validate every transformation in the list.
///
/// # Errors
/// [`EngineError::UnsupportedTransformation`] for the first unknown kind or
/// malformed parameter.
pub fn compile(
    transformations: &[Transformation],
) -> Result<Vec<CompiledTransformation>, EngineError> {
    transformations.iter().map(compile_one).collect()
}

/// Apply `transformations` to a copy of `record`.
pub fn apply(record: &Record, transformations: &[Transformation]) -> Result<Record, EngineError> {
    apply_traced(record, transformations).map(|(record, _)| record)
}

/// Like [`apply`], also returning a before/after trace for each entry.
pub fn apply_traced(
    record: &Record,
    transformations: &[Transformation],
) -> Result<(Record, Vec<AppliedTransformation>), EngineError> {
    let compiled = compile(transformations)?;

    let mut current = record.clone();
    let mut trace = Vec::with_capacity(compiled.len());

    for step in &compiled {
        let before = resolve(&current, &step.field).cloned();
        let after = step.op.evaluate(&current, before.as_ref());

        if let Some(value) = &after {
            current.insert(step.field.clone(), value.clone());
        }

        trace.push(AppliedTransformation {
            field: step.field.clone(),
            kind: step.kind.clone(),
            before,
            after,
        });
    }

    Ok((current, trace))
}

impl TransformOp {
    /// New value for the field, or the unchanged `current` value when the
    /// transformation falls back.
    fn evaluate(&self, record: &Record, current: Option<&Value>) -> Option<Value> {
        match self {
            Self::Map(table) => match current {
                Some(value) => table.get(&display(value)).or(Some(value)).cloned(),
                None => None,
            },
            Self::Template(template) => Some(Value::String(render_template(template, record))),
            Self::Concat(fields) => {
                let joined = fields
                    .iter()
                    .map(|f| resolve(record, f).map(display).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(" ");
                Some(Value::String(joined.trim().to_owned()))
            }
            Self::Split(delimiter) => {
                let parts = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(value) => split(&display(value), delimiter),
                };
                Some(Value::Array(parts.into_iter().map(Value::String).collect()))
            }
            Self::Format(op) => match current {
                Some(value @ Value::String(_)) if is_truthy(value) => {
                    value.as_str().map(|s| Value::String(op.apply(s)))
                }
                other => other.cloned(),
            },
        }
    }
}

fn split(input: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return input.chars().map(String::from).collect();
    }
    input.split(delimiter).map(str::to_owned).collect()
}

/// Substitute `${key}` placeholders from `record`. A placeholder whose key is
/// absent, or an unterminated `${`, is copied through verbatim.
pub fn render_template(template: &str, record: &Record) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after_open[..end];
        match resolve(record, key.trim()) {
            Some(value) => out.push_str(&display(value)),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after_open[end + 1..];
    }

    out.push_str(rest);
    out
}

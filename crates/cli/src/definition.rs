//! Loading workflow files from disk.
//!
//! A file is either a pipeline (optionally with a `name`, i.e. a stored
//! workflow definition) or a step graph (has `steps`). Both end up as a
//! validated [`Pipeline`].

use std::path::Path;

use anyhow::{Context, Result};
use engine::{graph, Pipeline, StepGraph};
use serde_json::Value;

/// A workflow file after validation.
#[derive(Debug)]
pub struct LoadedWorkflow {
    pub name: String,
    pub pipeline: Pipeline,
    pub from_graph: bool,
}

impl LoadedWorkflow {
    /// One-line description printed by `flowlink validate`.
    pub fn summary(&self) -> String {
        let p = &self.pipeline;
        format!(
            "Workflow '{}' is valid{}: {} -> {} ({} transformations, {} conditions)",
            self.name,
            if self.from_graph { " (compiled from step graph)" } else { "" },
            p.source.integration,
            p.target.integration,
            p.transformations.len(),
            p.conditions.len()
        )
    }
}

pub fn load(path: &Path) -> Result<LoadedWorkflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let fallback_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_owned());
    parse(value, fallback_name)
}

pub fn parse(value: Value, fallback_name: String) -> Result<LoadedWorkflow> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .unwrap_or(fallback_name);

    if value.get("steps").is_some() {
        let graph: StepGraph = serde_json::from_value(value).context("invalid step graph")?;
        let pipeline = graph::compile(&graph)?;
        return Ok(LoadedWorkflow { name, pipeline, from_graph: true });
    }

    let pipeline: Pipeline = serde_json::from_value(value).context("invalid workflow definition")?;
    pipeline.validate()?;
    Ok(LoadedWorkflow { name, pipeline, from_graph: false })
}

/// Read a JSON payload file, or `{}` when none is given.
pub fn load_payload(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Object(Default::default()));
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read payload {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pipeline_file_uses_its_name() {
        let loaded = parse(
            json!({
                "name": "leads",
                "source": { "integration": "passthrough" },
                "target": { "integration": "log" }
            }),
            "file".into(),
        )
        .unwrap();
        assert_eq!(loaded.name, "leads");
        assert!(!loaded.summary().contains("step graph"));
    }

    #[test]
    fn step_graph_file_is_compiled() {
        let loaded = parse(
            json!({
                "steps": [
                    { "id": "s", "kind": "source", "config": { "integration": "passthrough" } },
                    { "id": "t", "kind": "target", "config": { "integration": "log" } }
                ],
                "edges": [{ "from": "s", "to": "t" }]
            }),
            "graph".into(),
        )
        .unwrap();
        assert_eq!(loaded.name, "graph");
        assert!(loaded.from_graph);
        assert_eq!(loaded.pipeline.target.integration, "log");
        assert_eq!(
            loaded.summary(),
            "Workflow 'graph' is valid (compiled from step graph): passthrough -> log \
             (0 transformations, 0 conditions)"
        );
    }

    #[test]
    fn unsupported_operator_is_rejected_on_load() {
        let err = parse(
            json!({
                "source": { "integration": "passthrough" },
                "target": { "integration": "log" },
                "conditions": [{ "field": "a", "operator": "regex", "value": "x" }]
            }),
            "bad".into(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("regex"));
    }
}

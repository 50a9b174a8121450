//! Step-graph workflows, compiled down to a [`Pipeline`].
//!
//! A step graph is the generic authoring shape: typed steps joined by edges.
//! There is no second execution engine for it. The graph is validated and
//! flattened into the same read → transform → evaluate → write pipeline.
//!
//! A compilable graph has unique step IDs, edges between declared steps, no
//! cycles, one `source`, one `target` and at most one `trigger`. Walking it
//! in execution order, step kinds only move forward through
//! trigger, source, transform, condition, target.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::EngineError;
use crate::models::{Condition, Endpoint, Pipeline, Transformation};

/// What a step does. The order of variants is the pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Trigger,
    Source,
    Transform,
    Condition,
    Target,
}

/// A single node in the step graph.
///
/// `config` shape by kind: `source`/`target` → an [`Endpoint`], `transform`
/// → a [`Transformation`], `condition` → a [`Condition`], `trigger` → ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub config: Value,
}

/// Directed edge from one step to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Declared retry/fallback policy. Accepted for compatibility with stored
/// graphs; the engine does not retry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub fallback_action: Option<String>,
}

/// A complete step-graph workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepGraph {
    #[serde(default)]
    pub name: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub error_handling: Option<ErrorHandling>,
}

/// Check the graph's shape and return step IDs in execution order.
///
/// Steps that become ready at the same time keep their declaration order.
///
/// # Errors
/// - [`EngineError::DuplicateStepId`] when an ID is declared twice.
/// - [`EngineError::UnknownStepReference`] when an edge names a missing step.
/// - [`EngineError::CycleDetected`] when no complete ordering exists.
pub fn validate_graph(graph: &StepGraph) -> Result<Vec<String>, EngineError> {
    let count = graph.steps.len();

    let mut position: HashMap<&str, usize> = HashMap::with_capacity(count);
    for (i, step) in graph.steps.iter().enumerate() {
        if position.insert(step.id.as_str(), i).is_some() {
            return Err(EngineError::DuplicateStepId(step.id.clone()));
        }
    }

    let lookup = |id: &str, side: &'static str| {
        position
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnknownStepReference { step_id: id.to_owned(), side })
    };

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut waiting_on = vec![0usize; count];
    for edge in &graph.edges {
        let from = lookup(&edge.from, "from")?;
        let to = lookup(&edge.to, "to")?;
        successors[from].push(to);
        waiting_on[to] += 1;
    }

    // Kahn's algorithm over step positions.
    let mut ready: VecDeque<usize> = (0..count).filter(|&i| waiting_on[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(current) = ready.pop_front() {
        order.push(graph.steps[current].id.clone());
        for &next in &successors[current] {
            waiting_on[next] -= 1;
            if waiting_on[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() < count {
        return Err(EngineError::CycleDetected);
    }
    Ok(order)
}

fn step_config<T: serde::de::DeserializeOwned>(step: &Step) -> Result<T, EngineError> {
    serde_json::from_value(step.config.clone()).map_err(|e| {
        EngineError::InvalidStepGraph(format!("step '{}' has invalid config: {e}", step.id))
    })
}

/// Compile a step graph into the canonical pipeline.
pub fn compile(graph: &StepGraph) -> Result<Pipeline, EngineError> {
    let order = validate_graph(graph)?;
    let by_id: HashMap<&str, &Step> = graph.steps.iter().map(|s| (s.id.as_str(), s)).collect();

    if let Some(policy) = &graph.error_handling {
        warn!(
            graph = %graph.name,
            retry_count = policy.retry_count,
            "step graph declares error_handling; retries and fallbacks are not executed"
        );
    }

    let mut source: Option<Endpoint> = None;
    let mut target: Option<Endpoint> = None;
    let mut triggers = 0usize;
    let mut transformations: Vec<Transformation> = Vec::new();
    let mut conditions: Vec<Condition> = Vec::new();
    let mut previous: Option<&Step> = None;

    for id in &order {
        let Some(&step) = by_id.get(id.as_str()) else {
            continue;
        };

        if let Some(prev) = previous {
            if step.kind < prev.kind {
                return Err(EngineError::InvalidStepGraph(format!(
                    "step '{}' ({:?}) cannot run after step '{}' ({:?})",
                    step.id, step.kind, prev.id, prev.kind
                )));
            }
        }

        match step.kind {
            StepKind::Trigger => triggers += 1,
            StepKind::Source => {
                if source.replace(step_config(step)?).is_some() {
                    return Err(EngineError::InvalidStepGraph("more than one source step".into()));
                }
            }
            StepKind::Target => {
                if target.replace(step_config(step)?).is_some() {
                    return Err(EngineError::InvalidStepGraph("more than one target step".into()));
                }
            }
            StepKind::Transform => transformations.push(step_config(step)?),
            StepKind::Condition => conditions.push(step_config(step)?),
        }

        previous = Some(step);
    }

    if triggers > 1 {
        return Err(EngineError::InvalidStepGraph("more than one trigger step".into()));
    }
    let source = source.ok_or_else(|| EngineError::InvalidStepGraph("missing source step".into()))?;
    let target = target.ok_or_else(|| EngineError::InvalidStepGraph("missing target step".into()))?;

    let pipeline = Pipeline {
        source,
        target,
        transformations,
        conditions,
    };
    pipeline.validate()?;
    Ok(pipeline)
}

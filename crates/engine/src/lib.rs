//! `engine` crate — workflow models, field resolution, transformations,
//! conditions, step-graph compilation, storage contracts and the execution
//! engine.

pub mod models;
pub mod error;
pub mod field;
pub mod transform;
pub mod conditions;
pub mod graph;
pub mod store;
pub mod executor;

pub use models::{
    Condition, Endpoint, HistoryRecord, HistoryStatus, LastStatus, Pipeline, Transformation,
    TriggerEvent, TriggerType, WorkflowDefinition,
};
pub use error::EngineError;
pub use graph::{StepGraph, validate_graph};
pub use store::{
    HistoryRecorder, MemoryHistory, MemoryWorkflowStore, PgHistory, PgWorkflowStore, WorkflowStore,
};
pub use executor::{ExecutionEngine, ExecutionResult, ExecutorConfig};

#[cfg(test)]
mod executor_tests;

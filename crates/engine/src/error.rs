//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (validation, execution, storage).
///
/// Every variant has a stable [`code`](EngineError::code) that is what ends
/// up in history records and API responses.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Pre-execution rejections (no history record) ------

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} is inactive")]
    WorkflowInactive(Uuid),

    // ------ Execution errors (always a terminal `error` history record) ------

    #[error("source integration '{0}' is not connected")]
    SourceNotConnected(String),

    #[error("target integration '{0}' is not connected")]
    TargetNotConnected(String),

    /// The source adapter could not be reached or timed out.
    #[error("source integration '{integration}' unavailable: {message}")]
    SourceUnavailable { integration: String, message: String },

    /// The target adapter could not be reached or timed out.
    #[error("target integration '{integration}' unavailable: {message}")]
    TargetUnavailable { integration: String, message: String },

    /// The condition gate rejected the record. An expected outcome, recorded
    /// like any other failure.
    #[error("conditions not met")]
    ConditionsNotMet,

    #[error("unsupported transformation on field '{field}': {detail}")]
    UnsupportedTransformation { field: String, detail: String },

    #[error("unsupported operator '{operator}' on field '{field}'")]
    UnsupportedOperator { field: String, operator: String },

    /// The adapter answered with an integration-specific failure.
    #[error("integration '{integration}' failed: {message}")]
    Adapter { integration: String, message: String },

    // ------ Definition / step-graph errors ------

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("edge references unknown step '{step_id}' ({side} side)")]
    UnknownStepReference {
        step_id: String,
        side: &'static str,
    },

    #[error("step graph contains a cycle")]
    CycleDetected,

    #[error("invalid step graph: {0}")]
    InvalidStepGraph(String),

    // ------ Storage errors ------

    #[error("history record {0} not found")]
    HistoryNotFound(Uuid),

    #[error("history record {0} is already finalized")]
    HistoryAlreadyFinalized(Uuid),

    #[error("storage error: {0}")]
    Storage(String),

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound(_) => "WorkflowNotFound",
            Self::WorkflowInactive(_) => "WorkflowInactive",
            Self::SourceNotConnected(_) => "SourceNotConnected",
            Self::TargetNotConnected(_) => "TargetNotConnected",
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::TargetUnavailable { .. } => "TargetUnavailable",
            Self::ConditionsNotMet => "ConditionsNotMet",
            Self::UnsupportedTransformation { .. } => "UnsupportedTransformation",
            Self::UnsupportedOperator { .. } => "UnsupportedOperator",
            Self::Adapter { .. } => "AdapterError",
            Self::InvalidDefinition(_) => "InvalidDefinition",
            Self::DuplicateStepId(_) => "DuplicateStepId",
            Self::UnknownStepReference { .. } => "UnknownStepReference",
            Self::CycleDetected => "CycleDetected",
            Self::InvalidStepGraph(_) => "InvalidStepGraph",
            Self::HistoryNotFound(_) => "HistoryNotFound",
            Self::HistoryAlreadyFinalized(_) => "HistoryAlreadyFinalized",
            Self::Storage(_) | Self::Database(_) => "StorageError",
        }
    }

    /// Rejections that happen before an execution attempt exists.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::WorkflowNotFound(_) | Self::WorkflowInactive(_))
    }
}

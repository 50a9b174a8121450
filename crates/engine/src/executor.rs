//! Workflow execution engine.
//!
//! `ExecutionEngine` is the central orchestrator. One call to
//! [`ExecutionEngine::execute`] walks a single workflow through
//! `Validating → ReadingSource → Transforming → Evaluating → WritingTarget →
//! Recording` and ends in exactly one terminal history write.
//!
//! Every failure after the history record is opened is caught here, recorded,
//! and returned as an unsuccessful [`ExecutionResult`]. Only the pre-checks
//! (not found, inactive) and storage faults surface as `Err`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use adapters::{AdapterError, ConnectionResolver, IntegrationAdapter, Record};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

use crate::EngineError;
use crate::conditions;
use crate::models::{
    AppliedTransformation, Completion, ErrorInfo, HistoryStatus, LastStatus, PendingRecord, Stage,
    TriggerEvent, WorkflowDefinition,
};
use crate::store::{HistoryRecorder, WorkflowStore};
use crate::transform;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on a single adapter read or write.
    pub adapter_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Output of an execution
// ---------------------------------------------------------------------------

/// The caller-facing outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// ID of the history record written for this attempt.
    pub history_id: Uuid,
    pub success: bool,
    /// The target adapter's response on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// What a pipeline run produced, kept even when it fails part way.
#[derive(Debug, Default)]
struct RunOutput {
    source_data: Option<Value>,
    transformations: Vec<AppliedTransformation>,
    target_data: Option<Value>,
}

type StageResult<T> = Result<T, (Stage, EngineError)>;

fn at<T>(stage: Stage, result: Result<T, EngineError>) -> StageResult<T> {
    result.map_err(|e| (stage, e))
}

// ---------------------------------------------------------------------------
// ExecutionEngine
// ---------------------------------------------------------------------------

/// Runs workflows against a store, a history recorder and a set of
/// connected integrations.
///
/// Holds no per-execution state; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct ExecutionEngine {
    workflows: Arc<dyn WorkflowStore>,
    history: Arc<dyn HistoryRecorder>,
    connections: Arc<dyn ConnectionResolver>,
    config: ExecutorConfig,
}

impl ExecutionEngine {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        history: Arc<dyn HistoryRecorder>,
        connections: Arc<dyn ConnectionResolver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            workflows,
            history,
            connections,
            config,
        }
    }

    pub fn history(&self) -> &Arc<dyn HistoryRecorder> {
        &self.history
    }

    /// Execute a workflow for one trigger event.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] and [`EngineError::WorkflowInactive`]
    /// before anything is recorded; storage errors from the history recorder
    /// or the workflow store. Everything else is an `Ok` result with
    /// `success == false`.
    #[instrument(skip(self, trigger), fields(trigger = %trigger.trigger_type))]
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        trigger: TriggerEvent,
    ) -> Result<ExecutionResult, EngineError> {
        // ------------------------------------------------------------------
        // Validating
        // ------------------------------------------------------------------
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;

        if !workflow.active {
            warn!("workflow {} is inactive, trigger rejected", workflow_id);
            return Err(EngineError::WorkflowInactive(workflow_id));
        }

        let history_id = self.history.begin(PendingRecord::new(&workflow, &trigger)).await?;

        // Runs to completion on its own task even if this future is dropped.
        let engine = self.clone();
        let run = tokio::spawn(
            async move { engine.run_and_record(workflow, trigger, history_id).await }
                .instrument(Span::current()),
        );

        run.await.map_err(|e| {
            EngineError::Storage(format!("execution task for history {history_id} failed: {e}"))
        })?
    }

    /// Run the pipeline, then write the terminal history record and the run
    /// counters. Both writes are always attempted; the first failure wins.
    async fn run_and_record(
        &self,
        workflow: WorkflowDefinition,
        trigger: TriggerEvent,
        history_id: Uuid,
    ) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let mut output = RunOutput::default();
        let outcome = self.run_pipeline(&workflow, &trigger, &mut output).await;

        // ------------------------------------------------------------------
        // Recording
        // ------------------------------------------------------------------
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let completed_at = Utc::now();

        let (status, error) = match &outcome {
            Ok(()) => {
                info!(%history_id, duration_ms, "workflow '{}' succeeded", workflow.name);
                (HistoryStatus::Success, None)
            }
            Err((stage, err)) => {
                if matches!(err, EngineError::ConditionsNotMet) {
                    info!(%history_id, "workflow '{}' skipped: {}", workflow.name, err);
                } else {
                    error!(%history_id, %stage, "workflow '{}' failed: {}", workflow.name, err);
                }
                (HistoryStatus::Error, Some(ErrorInfo::from_error(err, Some(*stage))))
            }
        };

        let success = status == HistoryStatus::Success;
        let data = if success { output.target_data.clone() } else { None };

        let completed = self
            .history
            .complete(
                history_id,
                Completion {
                    status,
                    source_data: output.source_data,
                    target_data: output.target_data,
                    transformations: output.transformations,
                    error: error.clone(),
                    duration_ms,
                    completed_at,
                },
            )
            .await;
        if let Err(e) = &completed {
            error!(%history_id, "failed to finalize history record: {}", e);
        }

        let last_status = if success { LastStatus::Success } else { LastStatus::Error };
        let recorded = self
            .workflows
            .record_run(workflow.id, last_status, completed_at)
            .await;
        if let Err(e) = &recorded {
            error!(workflow_id = %workflow.id, "failed to record run: {}", e);
        }

        completed?;
        recorded?;

        Ok(ExecutionResult {
            history_id,
            success,
            data,
            error,
        })
    }

    // -----------------------------------------------------------------------
    // Internal: the read → transform → evaluate → write pipeline.
    // -----------------------------------------------------------------------

    async fn run_pipeline(
        &self,
        workflow: &WorkflowDefinition,
        trigger: &TriggerEvent,
        output: &mut RunOutput,
    ) -> StageResult<()> {
        let pipeline = &workflow.pipeline;
        let org = workflow.organization_id;

        // ReadingSource
        let source = self
            .connections
            .resolve(org, &pipeline.source.integration)
            .await
            .ok_or_else(|| {
                (
                    Stage::ReadingSource,
                    EngineError::SourceNotConnected(pipeline.source.integration.clone()),
                )
            })?;

        let record = at(
            Stage::ReadingSource,
            self.read_source(source.as_ref(), &pipeline.source.config, &trigger.payload)
                .await,
        )?;
        debug!(fields = record.len(), "source read complete");
        output.source_data = Some(Value::Object(record.clone()));

        // Transforming
        let (record, trace) = at(
            Stage::Transforming,
            transform::apply_traced(&record, &pipeline.transformations),
        )?;
        output.transformations = trace;

        // Evaluating
        let passed = at(
            Stage::Evaluating,
            conditions::evaluate(&record, &pipeline.conditions),
        )?;
        if !passed {
            return Err((Stage::Evaluating, EngineError::ConditionsNotMet));
        }

        // WritingTarget
        let target = self
            .connections
            .resolve(org, &pipeline.target.integration)
            .await
            .ok_or_else(|| {
                (
                    Stage::WritingTarget,
                    EngineError::TargetNotConnected(pipeline.target.integration.clone()),
                )
            })?;

        let response = at(
            Stage::WritingTarget,
            self.write_target(target, &pipeline.target.config, record).await,
        )?;
        output.target_data = Some(response);

        Ok(())
    }

    async fn read_source(
        &self,
        adapter: &dyn IntegrationAdapter,
        config: &adapters::AdapterConfig,
        payload: &Value,
    ) -> Result<Record, EngineError> {
        let integration = adapter.integration().to_owned();
        let read = adapter.read(config, payload);
        match tokio::time::timeout(self.config.adapter_timeout, read).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(AdapterError::Unavailable(message))) => {
                Err(EngineError::SourceUnavailable { integration, message })
            }
            Ok(Err(other)) => Err(EngineError::Adapter {
                integration,
                message: other.to_string(),
            }),
            Err(_) => Err(EngineError::SourceUnavailable {
                integration,
                message: format!("read timed out after {:?}", self.config.adapter_timeout),
            }),
        }
    }

    /// The write runs on its own task so that a timeout stops the wait, not
    /// the write.
    async fn write_target(
        &self,
        adapter: Arc<dyn IntegrationAdapter>,
        config: &adapters::AdapterConfig,
        record: Record,
    ) -> Result<Value, EngineError> {
        let integration = adapter.integration().to_owned();
        let config = config.clone();
        let task = tokio::spawn(async move { adapter.write(&config, &record).await });

        match tokio::time::timeout(self.config.adapter_timeout, task).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(AdapterError::Unavailable(message)))) => {
                Err(EngineError::TargetUnavailable { integration, message })
            }
            Ok(Ok(Err(other))) => Err(EngineError::Adapter {
                integration,
                message: other.to_string(),
            }),
            Ok(Err(join_err)) => Err(EngineError::Adapter {
                integration,
                message: format!("write task failed: {join_err}"),
            }),
            Err(_) => {
                warn!(%integration, "target write still in flight after timeout");
                Err(EngineError::TargetUnavailable {
                    integration,
                    message: format!("write timed out after {:?}", self.config.adapter_timeout),
                })
            }
        }
    }
}

//! End-to-end tests for the execution engine.
//!
//! These run the full state machine against in-memory stores and
//! `MockAdapter`, so no Postgres connection is required. Timeout tests use
//! tokio's paused clock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use adapters::builtin::PassthroughAdapter;
use adapters::mock::MockAdapter;
use adapters::{AdapterError, AdapterRegistry, ConnectionResolver, OrgConnections};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::executor::{ExecutionEngine, ExecutorConfig};
use crate::graph::{self, StepGraph};
use crate::models::{
    Completion, Condition, Endpoint, HistoryRecord, HistoryStatus, LastStatus, PendingRecord,
    Pipeline, Stage, Transformation, TriggerEvent, TriggerType, WorkflowDefinition,
};
use crate::store::{HistoryRecorder, MemoryHistory, MemoryWorkflowStore, WorkflowStore};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    engine: ExecutionEngine,
    workflows: Arc<MemoryWorkflowStore>,
    history: Arc<MemoryHistory>,
}

impl Harness {
    fn new(connections: Arc<dyn ConnectionResolver>, config: ExecutorConfig) -> Self {
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let history = Arc::new(MemoryHistory::new());
        let engine = ExecutionEngine::new(workflows.clone(), history.clone(), connections, config);
        Self { engine, workflows, history }
    }

    fn with_mocks(mocks: &[&MockAdapter]) -> Self {
        Self::new(Arc::new(registry(mocks)), ExecutorConfig::default())
    }

    fn add(&self, workflow: WorkflowDefinition) -> Uuid {
        let id = workflow.id;
        self.workflows.insert(workflow).unwrap();
        id
    }

    async fn workflow(&self, id: Uuid) -> WorkflowDefinition {
        self.workflows.get(id).await.unwrap().expect("workflow exists")
    }

    async fn only_record(&self) -> HistoryRecord {
        let all = self.history.all().unwrap();
        assert_eq!(all.len(), 1, "expected exactly one history record");
        all.into_iter().next().unwrap()
    }
}

fn registry(mocks: &[&MockAdapter]) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    for mock in mocks {
        registry.register(Arc::new((*mock).clone()));
    }
    registry
}

fn lead_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new(Endpoint::new("crm"), Endpoint::new("mailer"));
    pipeline.transformations = vec![Transformation::new(
        "status",
        "map",
        json!({ "new": "lead" }),
    )];
    pipeline.conditions = vec![Condition::new("status", "equals", json!("lead"))];
    pipeline
}

fn manual(payload: Value) -> TriggerEvent {
    TriggerEvent::manual(payload, Some("user-1".into()))
}

// ============================================================
// Success path
// ============================================================

#[tokio::test]
async fn mapped_record_reaches_the_target_and_is_recorded() {
    let crm = MockAdapter::reading("crm", json!({ "email": "a@b.com", "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "lead sync", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({ "id": 1 }))).await.unwrap();

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.data, Some(json!({ "email": "a@b.com", "status": "lead" })));

    let captured = mailer.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(Value::Object(captured[0].clone()), json!({ "email": "a@b.com", "status": "lead" }));
    assert_eq!(crm.reads.lock().unwrap().as_slice(), &[json!({ "id": 1 })]);

    let record = h.only_record().await;
    assert_eq!(record.id, result.history_id);
    assert_eq!(record.status, HistoryStatus::Success);
    assert_eq!(record.trigger.trigger_type, TriggerType::Manual);
    assert_eq!(record.trigger.data, json!({ "id": 1 }));
    assert_eq!(record.source_data, Some(json!({ "email": "a@b.com", "status": "new" })));
    assert_eq!(record.target_data, result.data);
    assert_eq!(record.transformations.len(), 1);
    assert_eq!(record.transformations[0].before, Some(json!("new")));
    assert_eq!(record.transformations[0].after, Some(json!("lead")));
    assert!(record.duration_ms.is_some());
    assert!(record.completed_at.is_some());

    let wf = h.workflow(id).await;
    assert_eq!(wf.last_status, LastStatus::Success);
    assert_eq!(wf.error_count, 0);
    assert!(wf.last_run.is_some());
}

#[tokio::test]
async fn empty_pipeline_writes_the_source_record_unchanged() {
    let crm = MockAdapter::reading("crm", json!({ "a": 1 }));
    let sink = MockAdapter::capturing("sink");
    let h = Harness::with_mocks(&[&crm, &sink]);
    let id = h.add(WorkflowDefinition::new(
        Uuid::new_v4(),
        "copy",
        Pipeline::new(Endpoint::new("crm"), Endpoint::new("sink")),
    ));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();
    assert!(result.success);
    assert_eq!(Value::Object(sink.captured()[0].clone()), json!({ "a": 1 }));
}

#[tokio::test]
async fn webhook_trigger_is_snapshotted_on_the_record() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "hook", lead_pipeline()));

    let mut headers = BTreeMap::new();
    headers.insert("x-signature".to_owned(), "abc".to_owned());
    h.engine
        .execute(id, TriggerEvent::webhook(json!({ "ref": "r-9" }), headers))
        .await
        .unwrap();

    let record = h.only_record().await;
    assert_eq!(record.trigger.trigger_type, TriggerType::Webhook);
    assert_eq!(record.trigger.data, json!({ "ref": "r-9" }));
}

// ============================================================
// Pre-execution rejections
// ============================================================

#[tokio::test]
async fn inactive_workflow_is_rejected_without_history() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let mut wf = WorkflowDefinition::new(Uuid::new_v4(), "off", lead_pipeline());
    wf.active = false;
    let id = h.add(wf);

    let err = h.engine.execute(id, manual(json!({}))).await.unwrap_err();

    assert!(matches!(err, EngineError::WorkflowInactive(x) if x == id));
    assert!(h.history.all().unwrap().is_empty());
    assert_eq!(crm.read_count(), 0);
    assert_eq!(h.workflow(id).await.error_count, 0);
}

#[tokio::test]
async fn unknown_workflow_is_rejected_without_history() {
    let h = Harness::with_mocks(&[]);
    let missing = Uuid::new_v4();

    let err = h.engine.execute(missing, manual(json!({}))).await.unwrap_err();

    assert!(matches!(err, EngineError::WorkflowNotFound(x) if x == missing));
    assert!(h.history.all().unwrap().is_empty());
}

// ============================================================
// Condition gate
// ============================================================

#[tokio::test]
async fn unmet_conditions_skip_the_target_and_count_as_an_error() {
    let crm = MockAdapter::reading("crm", json!({ "status": "customer" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "gate", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    assert!(!result.success);
    assert!(result.data.is_none());
    let error = result.error.expect("error info");
    assert_eq!(error.code, "ConditionsNotMet");
    assert_eq!(error.stage, Some(Stage::Evaluating));
    assert_eq!(mailer.write_count(), 0);

    let record = h.only_record().await;
    assert_eq!(record.status, HistoryStatus::Error);
    assert_eq!(record.error.as_ref().map(|e| e.code.as_str()), Some("ConditionsNotMet"));
    assert_eq!(record.source_data, Some(json!({ "status": "customer" })));
    assert_eq!(record.transformations.len(), 1);
    assert!(record.target_data.is_none());

    let wf = h.workflow(id).await;
    assert_eq!(wf.last_status, LastStatus::Error);
    assert_eq!(wf.error_count, 1);
}

#[tokio::test]
async fn error_count_increments_then_resets_on_success() {
    let sink = MockAdapter::capturing("sink");
    let mut registry = registry(&[&sink]);
    registry.register(Arc::new(PassthroughAdapter));
    let h = Harness::new(Arc::new(registry), ExecutorConfig::default());

    let mut pipeline = Pipeline::new(Endpoint::new("passthrough"), Endpoint::new("sink"));
    pipeline.conditions = vec![Condition::new("score", "greaterThan", json!(50))];
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "scores", pipeline));

    for _ in 0..2 {
        let result = h.engine.execute(id, manual(json!({ "score": 10 }))).await.unwrap();
        assert!(!result.success);
    }
    assert_eq!(h.workflow(id).await.error_count, 2);

    let result = h.engine.execute(id, manual(json!({ "score": 90 }))).await.unwrap();
    assert!(result.success);
    let wf = h.workflow(id).await;
    assert_eq!(wf.error_count, 0);
    assert_eq!(wf.last_status, LastStatus::Success);

    assert_eq!(h.history.list(id, 10, 0).await.unwrap().len(), 3);
    assert_eq!(sink.write_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_are_all_counted() {
    let crm = MockAdapter::reading("crm", json!({ "status": "customer" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "busy", lead_pipeline()));

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.execute(id, manual(json!({}))).await })
        })
        .collect();
    for handle in handles {
        assert!(!handle.await.unwrap().unwrap().success);
    }

    assert_eq!(h.workflow(id).await.error_count, 5);
    assert_eq!(h.history.all().unwrap().len(), 5);
}

// ============================================================
// Connections
// ============================================================

#[tokio::test]
async fn unconnected_source_fails_before_any_read() {
    let org = Uuid::new_v4();
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let mut connections = OrgConnections::new(registry(&[&crm, &mailer]));
    connections.connect(org, "mailer");
    let h = Harness::new(Arc::new(connections), ExecutorConfig::default());
    let id = h.add(WorkflowDefinition::new(org, "no source", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "SourceNotConnected");
    assert_eq!(error.stage, Some(Stage::ReadingSource));
    assert_eq!(crm.read_count(), 0);
    assert_eq!(mailer.write_count(), 0);
    assert!(h.only_record().await.source_data.is_none());
}

#[tokio::test]
async fn unconnected_target_fails_after_the_read() {
    let org = Uuid::new_v4();
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let mut connections = OrgConnections::new(registry(&[&crm, &mailer]));
    connections.connect(org, "crm");
    let h = Harness::new(Arc::new(connections), ExecutorConfig::default());
    let id = h.add(WorkflowDefinition::new(org, "no target", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "TargetNotConnected");
    assert_eq!(error.stage, Some(Stage::WritingTarget));
    assert_eq!(crm.read_count(), 1);
    assert_eq!(mailer.write_count(), 0);

    let record = h.only_record().await;
    assert_eq!(record.source_data, Some(json!({ "status": "new" })));
    assert_eq!(record.transformations.len(), 1);
}

#[tokio::test]
async fn connections_are_scoped_per_organisation() {
    let connected_org = Uuid::new_v4();
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let mut connections = OrgConnections::new(registry(&[&crm, &mailer]));
    connections.connect(connected_org, "crm").connect(connected_org, "mailer");
    let h = Harness::new(Arc::new(connections), ExecutorConfig::default());

    let ok = h.add(WorkflowDefinition::new(connected_org, "mine", lead_pipeline()));
    let other = h.add(WorkflowDefinition::new(Uuid::new_v4(), "theirs", lead_pipeline()));

    assert!(h.engine.execute(ok, manual(json!({}))).await.unwrap().success);
    let result = h.engine.execute(other, manual(json!({}))).await.unwrap();
    assert_eq!(result.error.unwrap().code, "SourceNotConnected");
}

// ============================================================
// Adapter failures
// ============================================================

#[tokio::test]
async fn unreachable_source_maps_to_source_unavailable() {
    let crm = MockAdapter::capturing("crm")
        .failing_read(AdapterError::Unavailable("connection refused".into()));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "down", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "SourceUnavailable");
    assert!(error.message.contains("connection refused"));
    assert_eq!(mailer.write_count(), 0);
}

#[tokio::test]
async fn rejected_write_is_an_adapter_error_with_partial_data() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer")
        .failing_write(AdapterError::Rejected("invalid email".into()));
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "reject", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "AdapterError");
    assert_eq!(error.stage, Some(Stage::WritingTarget));
    assert_eq!(mailer.write_count(), 1);

    let record = h.only_record().await;
    assert_eq!(record.status, HistoryStatus::Error);
    assert_eq!(record.source_data, Some(json!({ "status": "new" })));
    assert_eq!(record.transformations[0].after, Some(json!("lead")));
    assert!(record.target_data.is_none());
    assert_eq!(h.workflow(id).await.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out_as_unavailable() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }))
        .with_delay(Duration::from_secs(60));
    let mailer = MockAdapter::capturing("mailer");
    let config = ExecutorConfig { adapter_timeout: Duration::from_secs(1) };
    let h = Harness::new(Arc::new(registry(&[&crm, &mailer])), config);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "slow", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "SourceUnavailable");
    assert!(error.message.contains("timed out"));
    assert_eq!(mailer.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_target_times_out_as_unavailable() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer").with_delay(Duration::from_secs(60));
    let config = ExecutorConfig { adapter_timeout: Duration::from_secs(1) };
    let h = Harness::new(Arc::new(registry(&[&crm, &mailer])), config);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "slow", lead_pipeline()));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "TargetUnavailable");
    assert_eq!(error.stage, Some(Stage::WritingTarget));
    assert_eq!(h.only_record().await.status, HistoryStatus::Error);
}

// ============================================================
// Configuration errors
// ============================================================

#[tokio::test]
async fn unsupported_transformation_is_recorded_and_nothing_is_written() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let mut pipeline = lead_pipeline();
    pipeline.transformations.push(Transformation::new("status", "reverse", Value::Null));
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "bad kind", pipeline));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    let error = result.error.expect("error info");
    assert_eq!(error.code, "UnsupportedTransformation");
    assert_eq!(error.stage, Some(Stage::Transforming));
    assert_eq!(mailer.write_count(), 0);
    let record = h.only_record().await;
    assert_eq!(record.source_data, Some(json!({ "status": "new" })));
    assert!(record.transformations.is_empty());
}

#[tokio::test]
async fn unsupported_operator_wins_over_a_failing_condition() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let mut pipeline = lead_pipeline();
    pipeline.conditions = vec![
        Condition::new("status", "equals", json!("nope")),
        Condition::new("status", "startsWith", json!("l")),
    ];
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "bad op", pipeline));

    let result = h.engine.execute(id, manual(json!({}))).await.unwrap();

    assert_eq!(result.error.expect("error info").code, "UnsupportedOperator");
    assert_eq!(mailer.write_count(), 0);
}

// ============================================================
// Step graphs share the pipeline semantics
// ============================================================

#[tokio::test]
async fn compiled_step_graph_runs_like_the_pipeline() {
    let graph: StepGraph = serde_json::from_value(json!({
        "name": "graph lead sync",
        "steps": [
            { "id": "in", "kind": "trigger" },
            { "id": "read", "kind": "source", "config": { "integration": "crm" } },
            { "id": "map", "kind": "transform",
              "config": { "field": "status", "type": "map", "value": { "new": "lead" } } },
            { "id": "gate", "kind": "condition",
              "config": { "field": "status", "operator": "equals", "value": "lead" } },
            { "id": "send", "kind": "target", "config": { "integration": "mailer" } }
        ],
        "edges": [
            { "from": "in", "to": "read" },
            { "from": "read", "to": "map" },
            { "from": "map", "to": "gate" },
            { "from": "gate", "to": "send" }
        ]
    }))
    .unwrap();
    let pipeline = graph::compile(&graph).unwrap();
    assert_eq!(pipeline, lead_pipeline());

    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), graph.name.clone(), pipeline));

    let trigger = TriggerEvent::event(json!({}), Some("lead.created".into()));
    let result = h.engine.execute(id, trigger).await.unwrap();
    assert!(result.success);
    assert_eq!(mailer.captured()[0]["status"], json!("lead"));
}

// ============================================================
// Recording guarantees
// ============================================================

#[tokio::test(start_paused = true)]
async fn dropped_caller_still_gets_a_terminal_record() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer").with_delay(Duration::from_secs(5));
    let h = Harness::with_mocks(&[&crm, &mailer]);
    let id = h.add(WorkflowDefinition::new(Uuid::new_v4(), "abandoned", lead_pipeline()));

    let abandoned =
        tokio::time::timeout(Duration::from_secs(1), h.engine.execute(id, manual(json!({})))).await;
    assert!(abandoned.is_err(), "caller should give up before the write finishes");

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(mailer.write_count(), 1);
    let record = h.only_record().await;
    assert_eq!(record.status, HistoryStatus::Success);
    assert!(record.completed_at.is_some());

    let wf = h.workflow(id).await;
    assert_eq!(wf.last_status, LastStatus::Success);
    assert!(wf.last_run.is_some());
}

/// Opens records normally but refuses every terminal write.
struct UnwritableHistory(MemoryHistory);

#[async_trait::async_trait]
impl HistoryRecorder for UnwritableHistory {
    async fn begin(&self, pending: PendingRecord) -> Result<Uuid, EngineError> {
        self.0.begin(pending).await
    }

    async fn complete(&self, _id: Uuid, _completion: Completion) -> Result<(), EngineError> {
        Err(EngineError::Storage("history table unavailable".into()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<HistoryRecord>, EngineError> {
        self.0.get(id).await
    }

    async fn list(
        &self,
        workflow_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        self.0.list(workflow_id, limit, offset).await
    }
}

#[tokio::test]
async fn run_is_counted_even_when_the_history_write_fails() {
    let crm = MockAdapter::reading("crm", json!({ "status": "new" }));
    let mailer = MockAdapter::capturing("mailer");
    let workflows = Arc::new(MemoryWorkflowStore::new());
    let engine = ExecutionEngine::new(
        workflows.clone(),
        Arc::new(UnwritableHistory(MemoryHistory::new())),
        Arc::new(registry(&[&crm, &mailer])),
        ExecutorConfig::default(),
    );
    let wf = WorkflowDefinition::new(Uuid::new_v4(), "half recorded", lead_pipeline());
    let id = wf.id;
    workflows.insert(wf).unwrap();

    let err = engine.execute(id, manual(json!({}))).await.unwrap_err();

    assert!(matches!(err, EngineError::Storage(ref msg) if msg.contains("history table")));
    assert_eq!(mailer.write_count(), 1);
    let wf = workflows.get(id).await.unwrap().unwrap();
    assert_eq!(wf.last_status, LastStatus::Success);
    assert!(wf.last_run.is_some());
}

//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow, a trigger and a
//! history entry look like in memory. [`Pipeline`] is what gets stored in the
//! JSONB `definition` column of the `workflows` table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use adapters::AdapterConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One side of a pipeline: which integration to talk to and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Integration identifier resolved through the connection collaborator.
    pub integration: String,
    #[serde(default)]
    pub config: AdapterConfig,
}

impl Endpoint {
    pub fn new(integration: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            config: AdapterConfig::new(),
        }
    }

    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }
}

/// A single field transformation as authored.
///
/// `kind` stays a string so that an unknown kind survives deserialisation
/// and is reported as `UnsupportedTransformation` by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub field: String,
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: Value,
}

impl Transformation {
    pub fn new(field: impl Into<String>, kind: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            kind: kind.into(),
            value,
        }
    }
}

/// A single predicate as authored. `operator` is validated at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }
}

/// The read → transform → evaluate → write configuration of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Pipeline {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            transformations: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Save-time validation: every transformation kind and condition operator
    /// must be supported.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.source.integration.trim().is_empty() {
            return Err(EngineError::InvalidDefinition("source integration is empty".into()));
        }
        if self.target.integration.trim().is_empty() {
            return Err(EngineError::InvalidDefinition("target integration is empty".into()));
        }
        crate::transform::compile(&self.transformations)?;
        crate::conditions::compile(&self.conditions)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// Outcome of the most recent run, as stored on the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastStatus {
    /// Never executed.
    #[default]
    None,
    Success,
    Error,
}

impl fmt::Display for LastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LastStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown last status: {other}")),
        }
    }
}

/// The unit of automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub active: bool,
    #[serde(flatten)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: LastStatus,
    #[serde(default)]
    pub error_count: u64,
}

impl WorkflowDefinition {
    /// Convenience constructor: an active, never-run workflow.
    pub fn new(organization_id: Uuid, name: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            active: true,
            pipeline,
            last_run: None,
            last_status: LastStatus::None,
            error_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// TriggerEvent
// ---------------------------------------------------------------------------

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Webhook,
    Manual,
    Event,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook => write!(f, "webhook"),
            Self::Manual => write!(f, "manual"),
            Self::Event => write!(f, "event"),
        }
    }
}

impl FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(Self::Webhook),
            "manual" => Ok(Self::Manual),
            "event" => Ok(Self::Event),
            other => Err(format!("unknown trigger type: {other}")),
        }
    }
}

/// Ambient facts about a trigger that are not part of the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerMetadata {
    /// Webhook request headers (lower-cased names).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Acting user for manual runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Name of the generic event, if the emitter supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

/// Normalised inbound trigger. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub payload: Value,
    #[serde(default)]
    pub metadata: TriggerMetadata,
}

impl TriggerEvent {
    pub fn manual(payload: Value, user_id: Option<String>) -> Self {
        Self {
            trigger_type: TriggerType::Manual,
            payload,
            metadata: TriggerMetadata {
                user_id,
                ..TriggerMetadata::default()
            },
        }
    }

    pub fn webhook(payload: Value, headers: BTreeMap<String, String>) -> Self {
        Self {
            trigger_type: TriggerType::Webhook,
            payload,
            metadata: TriggerMetadata {
                headers,
                ..TriggerMetadata::default()
            },
        }
    }

    pub fn event(payload: Value, event_name: Option<String>) -> Self {
        Self {
            trigger_type: TriggerType::Event,
            payload,
            metadata: TriggerMetadata {
                event_name,
                ..TriggerMetadata::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// HistoryRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Success,
    Error,
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl FromStr for HistoryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown history status: {other}")),
        }
    }
}

/// Pipeline stage, used for logging and to tag where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    ReadingSource,
    Transforming,
    Evaluating,
    WritingTarget,
    Recording,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::ReadingSource => "reading_source",
            Self::Transforming => "transforming",
            Self::Evaluating => "evaluating",
            Self::WritingTarget => "writing_target",
            Self::Recording => "recording",
        };
        f.write_str(s)
    }
}

impl FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validating" => Ok(Self::Validating),
            "reading_source" => Ok(Self::ReadingSource),
            "transforming" => Ok(Self::Transforming),
            "evaluating" => Ok(Self::Evaluating),
            "writing_target" => Ok(Self::WritingTarget),
            "recording" => Ok(Self::Recording),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// The trigger as captured on a history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSnapshot {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub data: Value,
}

/// One applied transformation with the field's value before and after.
/// `None` means the field was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTransformation {
    pub field: String,
    pub kind: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Structured failure carried by history records and execution results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl ErrorInfo {
    pub fn from_error(error: &EngineError, stage: Option<Stage>) -> Self {
        Self {
            code: error.code().to_owned(),
            message: error.to_string(),
            stage,
        }
    }
}

/// Immutable audit entry for one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    pub status: HistoryStatus,
    pub trigger: TriggerSnapshot,
    pub source_data: Option<Value>,
    pub target_data: Option<Value>,
    #[serde(default)]
    pub transformations: Vec<AppliedTransformation>,
    pub error: Option<ErrorInfo>,
    pub duration_ms: Option<u64>,
    /// When the attempt started.
    pub timestamp: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What `HistoryRecorder::begin` needs to open a pending record.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    pub trigger: TriggerSnapshot,
    pub started_at: DateTime<Utc>,
}

impl PendingRecord {
    pub fn new(workflow: &WorkflowDefinition, trigger: &TriggerEvent) -> Self {
        Self {
            workflow_id: workflow.id,
            organization_id: workflow.organization_id,
            trigger: TriggerSnapshot {
                trigger_type: trigger.trigger_type,
                data: trigger.payload.clone(),
            },
            started_at: Utc::now(),
        }
    }
}

/// The single terminal write applied to a pending record.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: HistoryStatus,
    pub source_data: Option<Value>,
    pub target_data: Option<Value>,
    pub transformations: Vec<AppliedTransformation>,
    pub error: Option<ErrorInfo>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn workflow_definition_round_trips_with_flattened_pipeline() {
        let raw = json!({
            "id": "6f1c1f5e-8d0a-4a55-9a55-0d8f1b0c2e11",
            "organization_id": "0b4e7b1c-3c4e-4a8b-9f0e-2f1d3c4b5a69",
            "name": "lead sync",
            "active": true,
            "source": { "integration": "crm", "config": { "list": "inbound" } },
            "target": { "integration": "mailer" },
            "transformations": [
                { "field": "status", "kind": "map", "value": { "new": "lead" } }
            ],
            "conditions": [
                { "field": "status", "operator": "equals", "value": "lead" }
            ]
        });

        let wf: WorkflowDefinition = serde_json::from_value(raw).expect("valid workflow");
        assert_eq!(wf.pipeline.source.integration, "crm");
        assert!(wf.pipeline.target.config.is_empty());
        assert_eq!(wf.last_status, LastStatus::None);
        assert_eq!(wf.error_count, 0);
        assert_eq!(wf.pipeline.transformations[0].kind, "map");

        let back = serde_json::to_value(&wf).unwrap();
        assert_eq!(back["source"]["config"]["list"], "inbound");
        assert_eq!(back["last_status"], "none");
    }

    #[test]
    fn transformation_accepts_type_alias_for_kind() {
        let t: Transformation =
            serde_json::from_value(json!({ "field": "x", "type": "format", "value": "trim" })).unwrap();
        assert_eq!(t.kind, "format");
    }

    #[test]
    fn trigger_constructors_fill_metadata() {
        let manual = TriggerEvent::manual(json!({}), Some("u-1".into()));
        assert_eq!(manual.trigger_type, TriggerType::Manual);
        assert_eq!(manual.metadata.user_id.as_deref(), Some("u-1"));

        let mut headers = BTreeMap::new();
        headers.insert("x-signature".into(), "abc".into());
        let hook = TriggerEvent::webhook(json!({ "a": 1 }), headers);
        assert_eq!(hook.trigger_type, TriggerType::Webhook);
        assert_eq!(hook.metadata.headers["x-signature"], "abc");

        let event = TriggerEvent::event(json!(null), Some("user.created".into()));
        assert_eq!(event.metadata.event_name.as_deref(), Some("user.created"));
    }

    #[test]
    fn status_enums_parse_their_display_form() {
        for status in [HistoryStatus::Pending, HistoryStatus::Success, HistoryStatus::Error] {
            assert_eq!(status.to_string().parse::<HistoryStatus>(), Ok(status));
        }
        for stage in [Stage::ReadingSource, Stage::WritingTarget] {
            assert_eq!(stage.to_string().parse::<Stage>(), Ok(stage));
        }
        assert!("running".parse::<LastStatus>().is_err());
    }
}

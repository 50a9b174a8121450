//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub active: bool,
    /// JSON pipeline: `{ source, target, transformations, conditions }`.
    pub definition: serde_json::Value,
    pub last_run: Option<DateTime<Utc>>,
    /// `none`, `success` or `error`.
    pub last_status: String,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// workflow_history
// ---------------------------------------------------------------------------

/// A persisted execution history row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    /// `pending`, `success` or `error`.
    pub status: String,
    pub trigger_type: String,
    pub trigger_data: serde_json::Value,
    pub source_data: Option<serde_json::Value>,
    pub target_data: Option<serde_json::Value>,
    pub transformations: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_stage: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Column values for inserting a `pending` history row.
#[derive(Debug, Clone)]
pub struct NewHistoryRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub organization_id: Uuid,
    pub trigger_type: String,
    pub trigger_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Column values for the single terminal update of a history row.
#[derive(Debug, Clone)]
pub struct HistoryCompletion {
    /// `success` or `error`.
    pub status: String,
    pub source_data: Option<serde_json::Value>,
    pub target_data: Option<serde_json::Value>,
    pub transformations: serde_json::Value,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_stage: Option<String>,
    pub duration_ms: i64,
    pub completed_at: DateTime<Utc>,
}

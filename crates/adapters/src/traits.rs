//! The `IntegrationAdapter` trait — the contract every integration must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::AdapterError;

/// A structured record flowing through a pipeline: a JSON object.
pub type Record = Map<String, Value>;

/// Opaque per-endpoint configuration stored on the workflow definition.
pub type AdapterConfig = Map<String, Value>;

/// Capability boundary through which the engine reads from or writes to an
/// external integrated system.
///
/// Implementations own their own I/O budget; the engine additionally wraps
/// every call in a timeout.
#[async_trait]
pub trait IntegrationAdapter: Send + Sync {
    /// Identifier used as the lookup key in the adapter registry
    /// (e.g. `"http"`, `"static"`).
    fn integration(&self) -> &str;

    /// Fetch the source record for a run, given the source config and the
    /// trigger payload.
    async fn read(&self, config: &AdapterConfig, payload: &Value) -> Result<Record, AdapterError>;

    /// Deliver the transformed record to the target system and return
    /// whatever the integration answered.
    async fn write(&self, config: &AdapterConfig, record: &Record) -> Result<Value, AdapterError>;
}

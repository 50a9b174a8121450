//! `MockAdapter` — a test double for `IntegrationAdapter`.
//!
//! Useful in unit and integration tests where a real integration is either
//! unavailable or irrelevant. Clones share their call logs, so a test can hand
//! one clone to a registry and keep another for assertions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{AdapterConfig, AdapterError, IntegrationAdapter, Record};

/// Behaviour injected into one direction of a `MockAdapter`.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// `read` returns this value (must be a JSON object); `write` echoes the
    /// record it received and ignores the value.
    Succeed(Value),
    /// Fail with the given error.
    Fail(AdapterError),
}

/// A mock adapter that records every call it receives and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    /// Registry key.
    pub integration: String,
    pub read_behaviour: MockBehaviour,
    pub write_behaviour: MockBehaviour,
    /// Sleep before answering; used to exercise engine timeouts.
    pub delay: Option<Duration>,
    /// Trigger payloads seen by `read` (in call order).
    pub reads: Arc<Mutex<Vec<Value>>>,
    /// Records seen by `write` (in call order).
    pub writes: Arc<Mutex<Vec<Record>>>,
}

impl MockAdapter {
    /// A mock whose `read` succeeds with `value` and whose `write` echoes.
    pub fn reading(integration: impl Into<String>, value: Value) -> Self {
        Self {
            integration: integration.into(),
            read_behaviour: MockBehaviour::Succeed(value),
            write_behaviour: MockBehaviour::Succeed(Value::Null),
            delay: None,
            reads: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that only captures writes; `read` yields an empty record.
    pub fn capturing(integration: impl Into<String>) -> Self {
        Self::reading(integration, Value::Object(Record::new()))
    }

    pub fn failing_read(mut self, error: AdapterError) -> Self {
        self.read_behaviour = MockBehaviour::Fail(error);
        self
    }

    pub fn failing_write(mut self, error: AdapterError) -> Self {
        self.write_behaviour = MockBehaviour::Fail(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or_default()
    }

    /// Every record handed to `write` so far.
    pub fn captured(&self) -> Vec<Record> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IntegrationAdapter for MockAdapter {
    fn integration(&self) -> &str {
        &self.integration
    }

    async fn read(&self, _config: &AdapterConfig, payload: &Value) -> Result<Record, AdapterError> {
        if let Ok(mut reads) = self.reads.lock() {
            reads.push(payload.clone());
        }
        self.pause().await;

        match &self.read_behaviour {
            MockBehaviour::Succeed(Value::Object(record)) => Ok(record.clone()),
            MockBehaviour::Succeed(other) => Err(AdapterError::Rejected(format!(
                "mock read value is not an object: {other}"
            ))),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }

    async fn write(&self, _config: &AdapterConfig, record: &Record) -> Result<Value, AdapterError> {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(record.clone());
        }
        self.pause().await;

        match &self.write_behaviour {
            MockBehaviour::Succeed(_) => Ok(Value::Object(record.clone())),
            MockBehaviour::Fail(err) => Err(err.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn read_returns_configured_record_and_logs_payload() {
        let mock = MockAdapter::reading("crm", json!({ "email": "a@b.com" }));
        let record = mock
            .read(&AdapterConfig::new(), &json!({ "id": 7 }))
            .await
            .expect("read should succeed");

        assert_eq!(record.get("email"), Some(&json!("a@b.com")));
        assert_eq!(mock.read_count(), 1);
        assert_eq!(mock.reads.lock().unwrap()[0], json!({ "id": 7 }));
    }

    #[tokio::test]
    async fn clones_share_call_logs() {
        let mock = MockAdapter::capturing("sink");
        let handle = mock.clone();

        let mut record = Record::new();
        record.insert("k".into(), json!("v"));
        let echoed = mock.write(&AdapterConfig::new(), &record).await.unwrap();

        assert_eq!(echoed, json!({ "k": "v" }));
        assert_eq!(handle.write_count(), 1);
        assert_eq!(handle.captured(), vec![record]);
    }

    #[tokio::test]
    async fn failing_write_still_records_the_attempt() {
        let mock = MockAdapter::capturing("sink")
            .failing_write(AdapterError::Rejected("quota exceeded".into()));

        let result = mock.write(&AdapterConfig::new(), &Record::new()).await;
        assert_eq!(result, Err(AdapterError::Rejected("quota exceeded".into())));
        assert_eq!(mock.write_count(), 1);
    }

    #[tokio::test]
    async fn non_object_read_value_is_rejected() {
        let mock = MockAdapter::reading("crm", json!([1, 2, 3]));
        let result = mock.read(&AdapterConfig::new(), &Value::Null).await;
        assert!(matches!(result, Err(AdapterError::Rejected(_))));
    }
}

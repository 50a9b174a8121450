//! Built-in adapters that need no external system.
//!
//! - `passthrough` — source only; the trigger payload *is* the source record.
//! - `static`      — source only; returns `config.record`.
//! - `log`         — target only; logs the record and echoes it back.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{AdapterConfig, AdapterError, IntegrationAdapter, Record};

/// Uses the trigger payload as the source record.
///
/// Object payloads are returned as-is (merged over optional
/// `config.defaults`); any other payload is wrapped as `{ "payload": … }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughAdapter;

#[async_trait]
impl IntegrationAdapter for PassthroughAdapter {
    fn integration(&self) -> &str {
        "passthrough"
    }

    async fn read(&self, config: &AdapterConfig, payload: &Value) -> Result<Record, AdapterError> {
        let mut record = match config.get("defaults") {
            Some(Value::Object(defaults)) => defaults.clone(),
            Some(_) => {
                return Err(AdapterError::Rejected(
                    "passthrough `defaults` must be an object".into(),
                ))
            }
            None => Record::new(),
        };

        match payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    record.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                record.insert("payload".into(), other.clone());
            }
        }

        Ok(record)
    }

    async fn write(&self, _config: &AdapterConfig, _record: &Record) -> Result<Value, AdapterError> {
        Err(AdapterError::Unsupported("passthrough cannot be used as a target".into()))
    }
}

/// Returns a fixed record from `config.record`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAdapter;

#[async_trait]
impl IntegrationAdapter for StaticAdapter {
    fn integration(&self) -> &str {
        "static"
    }

    async fn read(&self, config: &AdapterConfig, _payload: &Value) -> Result<Record, AdapterError> {
        match config.get("record") {
            Some(Value::Object(record)) => Ok(record.clone()),
            Some(_) => Err(AdapterError::Rejected("static `record` must be an object".into())),
            None => Ok(Record::new()),
        }
    }

    async fn write(&self, _config: &AdapterConfig, _record: &Record) -> Result<Value, AdapterError> {
        Err(AdapterError::Unsupported("static cannot be used as a target".into()))
    }
}

/// Logs every record it receives. Handy as a dry-run target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAdapter;

#[async_trait]
impl IntegrationAdapter for LogAdapter {
    fn integration(&self) -> &str {
        "log"
    }

    async fn read(&self, _config: &AdapterConfig, _payload: &Value) -> Result<Record, AdapterError> {
        Err(AdapterError::Unsupported("log cannot be used as a source".into()))
    }

    async fn write(&self, config: &AdapterConfig, record: &Record) -> Result<Value, AdapterError> {
        let label = config
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("log");
        let delivered = Value::Object(record.clone());
        info!(target: "flowlink::log_adapter", label, record = %delivered, "record delivered");
        Ok(delivered)
    }
}

//! Generic HTTP adapter.
//!
//! Config keys:
//! - `url` (required)
//! - `headers` — object of string header values
//! - `method`  — target only, `POST` (default), `PUT` or `PATCH`
//!
//! `read` issues a GET and forwards the trigger payload's scalar fields as
//! query parameters; `write` sends the record as a JSON body. JSON object
//! responses become the record; anything else is wrapped as `{ "data": … }`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use crate::{AdapterConfig, AdapterError, IntegrationAdapter, Record};

#[derive(Debug, Clone, Default)]
pub struct HttpAdapter {
    client: Client,
}

impl HttpAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn url(config: &AdapterConfig) -> Result<&str, AdapterError> {
        config
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| AdapterError::Rejected("http adapter requires a `url` string".into()))
    }

    fn write_method(config: &AdapterConfig) -> Result<Method, AdapterError> {
        match config.get("method").and_then(Value::as_str) {
            None => Ok(Method::POST),
            Some(m) if m.eq_ignore_ascii_case("post") => Ok(Method::POST),
            Some(m) if m.eq_ignore_ascii_case("put") => Ok(Method::PUT),
            Some(m) if m.eq_ignore_ascii_case("patch") => Ok(Method::PATCH),
            Some(other) => Err(AdapterError::Rejected(format!(
                "unsupported http write method '{other}'"
            ))),
        }
    }

    fn with_headers(mut request: RequestBuilder, config: &AdapterConfig) -> RequestBuilder {
        if let Some(Value::Object(headers)) = config.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }
        request
    }

    async fn send(request: RequestBuilder) -> Result<Value, AdapterError> {
        let response = request.send().await.map_err(classify)?;
        let response = check_status(response)?;

        let body = response.bytes().await.map_err(classify)?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice::<Value>(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned())))
    }
}

fn classify(err: reqwest::Error) -> AdapterError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AdapterError::Unavailable(err.to_string())
    } else {
        AdapterError::Rejected(err.to_string())
    }
}

fn check_status(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(AdapterError::Unavailable(format!("upstream answered {status}")));
    }
    if status.is_client_error() {
        return Err(AdapterError::Rejected(format!("upstream answered {status}")));
    }
    Ok(response)
}

/// Scalar payload fields as query parameters; nested values are skipped.
fn query_params(payload: &Value) -> Vec<(String, String)> {
    let Value::Object(fields) = payload else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            Value::Bool(b) => Some((key.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        Value::Null => Record::new(),
        other => {
            let mut record = Record::new();
            record.insert("data".into(), other);
            record
        }
    }
}

#[async_trait]
impl IntegrationAdapter for HttpAdapter {
    fn integration(&self) -> &str {
        "http"
    }

    async fn read(&self, config: &AdapterConfig, payload: &Value) -> Result<Record, AdapterError> {
        let url = Self::url(config)?;
        debug!(url, "http source read");

        let request = self.client.get(url).query(&query_params(payload));
        let body = Self::send(Self::with_headers(request, config)).await?;
        Ok(into_record(body))
    }

    async fn write(&self, config: &AdapterConfig, record: &Record) -> Result<Value, AdapterError> {
        let url = Self::url(config)?;
        let method = Self::write_method(config)?;
        debug!(url, %method, "http target write");

        let request = self.client.request(method, url).json(record);
        Self::send(Self::with_headers(request, config)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> AdapterConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn missing_url_is_rejected_before_any_request() {
        let adapter = HttpAdapter::default();
        let err = adapter.read(&AdapterConfig::new(), &Value::Null).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(msg) if msg.contains("url")));
    }

    #[test]
    fn write_method_defaults_to_post() {
        assert_eq!(HttpAdapter::write_method(&AdapterConfig::new()).unwrap(), Method::POST);
        assert_eq!(
            HttpAdapter::write_method(&config(json!({ "method": "put" }))).unwrap(),
            Method::PUT
        );
        assert!(HttpAdapter::write_method(&config(json!({ "method": "DELETE" }))).is_err());
    }

    #[test]
    fn only_scalar_payload_fields_become_query_params() {
        let params = query_params(&json!({ "id": 4, "q": "x", "nested": { "a": 1 }, "on": true }));
        assert_eq!(params.len(), 3);
        assert!(params.contains(&("id".into(), "4".into())));
        assert!(params.contains(&("on".into(), "true".into())));
    }

    #[test]
    fn non_object_responses_are_wrapped() {
        assert_eq!(Value::Object(into_record(json!([1, 2]))), json!({ "data": [1, 2] }));
        assert!(into_record(Value::Null).is_empty());
    }
}

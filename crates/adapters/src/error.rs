//! Adapter-level error type.

use thiserror::Error;

/// Errors returned by an adapter's `read` or `write`.
///
/// The engine uses the variant to pick its own error code:
/// - `Unavailable` — the integration could not be reached (timeouts, connection
///   refused, 5xx). Maps to `SourceUnavailable` / `TargetUnavailable`.
/// - `Rejected`    — the integration answered but refused the request.
/// - `Unsupported` — the adapter does not implement the requested direction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("integration unavailable: {0}")]
    Unavailable(String),

    #[error("integration rejected the request: {0}")]
    Rejected(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),
}

//! `adapters` crate — the `IntegrationAdapter` trait, the connection lookup
//! table, and built-in adapter implementations.
//!
//! Every integration must implement [`IntegrationAdapter`]. The engine crate
//! resolves adapters through a [`ConnectionResolver`] and dispatches through
//! the trait object; there is no branching on integration names.

pub mod builtin;
pub mod error;
pub mod http;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::AdapterError;
pub use registry::{AdapterRegistry, ConnectionResolver, OrgConnections};
pub use traits::{AdapterConfig, IntegrationAdapter, Record};

//! Adapter lookup table and the connection contract.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::IntegrationAdapter;
use crate::builtin::{LogAdapter, PassthroughAdapter, StaticAdapter};
use crate::http::HttpAdapter;

/// The Connection collaborator as seen by the engine.
///
/// Returns `None` when the organisation has no live connection for the
/// integration; the engine turns that into `SourceNotConnected` /
/// `TargetNotConnected`.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(
        &self,
        organization_id: Uuid,
        integration: &str,
    ) -> Option<Arc<dyn IntegrationAdapter>>;
}

// ---------------------------------------------------------------------------
// AdapterRegistry
// ---------------------------------------------------------------------------

/// Maps integration identifiers to adapter implementations.
///
/// Resolving through a bare registry treats every registered integration as
/// connected for every organisation. Wrap it in [`OrgConnections`] to gate by
/// organisation.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn IntegrationAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `passthrough`, `static`, `log` and `http`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PassthroughAdapter));
        registry.register(Arc::new(StaticAdapter));
        registry.register(Arc::new(LogAdapter));
        registry.register(Arc::new(HttpAdapter::default()));
        registry
    }

    /// Register an adapter under its own `integration()` identifier,
    /// replacing any previous registration.
    pub fn register(&mut self, adapter: Arc<dyn IntegrationAdapter>) -> &mut Self {
        self.adapters
            .insert(adapter.integration().to_owned(), adapter);
        self
    }

    pub fn get(&self, integration: &str) -> Option<Arc<dyn IntegrationAdapter>> {
        self.adapters.get(integration).cloned()
    }

    /// Registered integration identifiers, sorted.
    pub fn integrations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl ConnectionResolver for AdapterRegistry {
    async fn resolve(
        &self,
        _organization_id: Uuid,
        integration: &str,
    ) -> Option<Arc<dyn IntegrationAdapter>> {
        self.get(integration)
    }
}

// ---------------------------------------------------------------------------
// OrgConnections
// ---------------------------------------------------------------------------

/// A registry plus the set of `(organisation, integration)` pairs that are
/// currently connected.
#[derive(Clone, Default)]
pub struct OrgConnections {
    registry: AdapterRegistry,
    connected: HashSet<(Uuid, String)>,
}

impl OrgConnections {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            connected: HashSet::new(),
        }
    }

    pub fn connect(&mut self, organization_id: Uuid, integration: impl Into<String>) -> &mut Self {
        self.connected.insert((organization_id, integration.into()));
        self
    }

    pub fn disconnect(&mut self, organization_id: Uuid, integration: &str) -> &mut Self {
        self.connected
            .remove(&(organization_id, integration.to_owned()));
        self
    }

    pub fn is_connected(&self, organization_id: Uuid, integration: &str) -> bool {
        self.connected
            .contains(&(organization_id, integration.to_owned()))
    }
}

#[async_trait]
impl ConnectionResolver for OrgConnections {
    async fn resolve(
        &self,
        organization_id: Uuid,
        integration: &str,
    ) -> Option<Arc<dyn IntegrationAdapter>> {
        if !self.is_connected(organization_id, integration) {
            return None;
        }
        self.registry.get(integration)
    }
}

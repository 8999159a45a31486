//! Connection Registry
//!
//! Central mapping from database name to its live connector.
//! This is the single source of truth for which databases a federated
//! query may reference.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::Connector;
use crate::engine::types::ConnectionInfo;

/// Registry that holds all registered database connections
///
/// Reads vastly outnumber writes (every fetch step looks up its connector),
/// so the map sits behind a read/write lock rather than a mutex.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<dyn Connector>>>,
}

impl ConnectionRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connection under `name`, replacing any previous one
    pub fn register(&self, name: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connections.write().insert(name.into(), connector);
    }

    /// Removes a connection; returns false when no such name was registered
    pub fn deregister(&self, name: &str) -> bool {
        self.connections.write().remove(name).is_some()
    }

    /// Gets a connection by database name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connections.read().get(name).cloned()
    }

    /// Gets a connection by database name, failing when absent
    pub fn require(&self, name: &str) -> EngineResult<Arc<dyn Connector>> {
        self.get(name)
            .ok_or_else(|| EngineError::connection_not_found(name))
    }

    /// Returns the registry-level view of one connection
    pub fn info(&self, name: &str) -> Option<ConnectionInfo> {
        self.connections.read().get(name).map(|c| ConnectionInfo {
            driver: c.driver_id().to_string(),
            connected: c.is_connected(),
        })
    }

    /// Lists all registered database names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns true if no connections are registered
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::connectors::MemoryConnector;

    #[test]
    fn register_lookup_deregister() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        registry.register("usersdb", Arc::new(MemoryConnector::new()));
        registry.register("ordersdb", Arc::new(MemoryConnector::new()));
        assert_eq!(registry.len(), 2);

        assert!(registry.get("usersdb").is_some());
        assert!(registry.get("nope").is_none());
        assert!(registry.require("nope").is_err());

        assert!(registry.deregister("usersdb"));
        assert!(!registry.deregister("usersdb"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn info_reports_driver_and_state() {
        let registry = ConnectionRegistry::new();
        registry.register("usersdb", Arc::new(MemoryConnector::new()));

        let info = registry.info("usersdb").unwrap();
        assert_eq!(info.driver, "memory");
        assert!(info.connected);
        assert!(registry.info("ghost").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let registry = ConnectionRegistry::new();
        registry.register("zeta", Arc::new(MemoryConnector::new()));
        registry.register("alpha", Arc::new(MemoryConnector::new()));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}

// fedsql - federated SQL query engine
// Core library

pub mod engine;
pub mod federation;

pub use engine::connectors::MemoryConnector;
pub use engine::error::{EngineError, EngineResult};
pub use engine::registry::ConnectionRegistry;
pub use engine::traits::Connector;
pub use engine::types::{ConnectionInfo, Row, TableSizeEstimate, Value};
pub use federation::cache::ResultCache;
pub use federation::engine::FederationEngine;
pub use federation::stats::StatisticsSnapshot;
pub use federation::types::{ExecutionPlan, FederationOptions, ParsedQuery};

// Connection layer
// Boundary between the federation core and per-database drivers

pub mod connectors;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use registry::ConnectionRegistry;
pub use traits::Connector;
pub use types::*;

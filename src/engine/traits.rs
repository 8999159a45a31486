//! Connector trait definition
//!
//! This is the boundary to the per-database drivers. The federation core
//! never speaks a wire protocol itself: it asks a connector for rows and for
//! a size estimate, and everything else (pooling, retries, dialects) lives
//! behind this trait.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{Row, TableSizeEstimate};

/// A live connection to one external database
///
/// Each registered database exposes exactly one connector. The raw WHERE
/// span of a federated query is passed through untouched: a driver evaluates
/// the portion of the predicate it understands and ignores the rest.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the driver type for this connection (e.g. "postgres", "mongodb")
    fn driver_id(&self) -> &str;

    /// Whether the underlying connection is currently usable
    fn is_connected(&self) -> bool;

    /// Fetches the rows of `table`, optionally filtered by the raw WHERE span
    async fn fetch_rows(&self, table: &str, where_span: Option<&str>) -> EngineResult<Vec<Row>>;

    /// Approximates the size of `table` for cost estimation
    ///
    /// Planning must survive a failure here; the planner substitutes a
    /// conservative default when the estimate is unavailable.
    async fn estimate_table_size(&self, table: &str) -> EngineResult<TableSizeEstimate>;
}

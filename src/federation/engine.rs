// SPDX-License-Identifier: Apache-2.0

//! Federation engine facade.
//!
//! Wires the pipeline together: tokenize → parse → validate → plan →
//! execute, with the statistics record and result cache alongside. This is
//! the surface a CLI or REPL talks to.

use std::fmt::Write as _;
use std::sync::Arc;

use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::ConnectionRegistry;
use crate::engine::types::Row;

use super::cache::{query_fingerprint, LruResultCache, ResultCache};
use super::executor;
use super::parser;
use super::planner;
use super::stats::{FederationStatistics, StatisticsSnapshot};
use super::types::{ExecutionPlan, FederationOptions, ParsedQuery};
use super::validator;

/// Default global timeout for the full federation pipeline (60 s).
const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 60_000;

/// Executes federated SQL against a set of registered connections.
pub struct FederationEngine {
    registry: Arc<ConnectionRegistry>,
    statistics: FederationStatistics,
    cache: Arc<dyn ResultCache>,
    default_database: Option<String>,
}

impl FederationEngine {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            statistics: FederationStatistics::new(),
            cache: Arc::new(LruResultCache::default()),
            default_database: None,
        }
    }

    /// Replaces the bundled LRU cache with a caller-provided implementation.
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Database that bare (unqualified) table names belong to.
    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Parses without validating or executing. Tooling/debugging surface.
    pub fn parse_sql(&self, sql: &str) -> EngineResult<ParsedQuery> {
        parser::parse(sql, self.default_database.as_deref())
    }

    /// Plans `sql` and renders the plan as human-readable text, without
    /// executing anything.
    pub async fn explain_query(&self, sql: &str) -> EngineResult<String> {
        let plan = self.plan_query(sql).await?;
        Ok(render_plan(&plan))
    }

    /// Executes a federated query with default options.
    pub async fn execute_federated_query(&self, sql: &str) -> EngineResult<Vec<Row>> {
        self.execute_with_options(sql, FederationOptions::default()).await
    }

    /// Executes a federated query under explicit timeout/cache/row-cap
    /// options.
    #[instrument(skip(self, options), fields(query_len = sql.len()))]
    pub async fn execute_with_options(
        &self,
        sql: &str,
        options: FederationOptions,
    ) -> EngineResult<Vec<Row>> {
        let global_timeout = options.timeout_ms.unwrap_or(DEFAULT_GLOBAL_TIMEOUT_MS);

        let result = match timeout(
            Duration::from_millis(global_timeout),
            self.execute_inner(sql, &options),
        )
        .await
        {
            Ok(inner) => inner,
            Err(_) => Err(EngineError::Timeout { timeout_ms: global_timeout }),
        };

        if result.is_err() {
            self.statistics.record_failed();
        }
        result
    }

    /// Current counters plus the live connection count.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot(self.registry.len())
    }

    /// Zeroes the counters in one atomic swap.
    pub fn reset_statistics(&self) {
        self.statistics.reset();
    }

    /// Drops every cached result set.
    pub fn clear_caches(&self) {
        self.cache.clear();
    }

    async fn plan_query(&self, sql: &str) -> EngineResult<ExecutionPlan> {
        let query = self.parse_sql(sql)?;
        validator::validate(&query, &self.registry)?;
        planner::build_plan(sql, &query, &self.registry).await
    }

    async fn execute_inner(
        &self,
        sql: &str,
        options: &FederationOptions,
    ) -> EngineResult<Vec<Row>> {
        let plan = self.plan_query(sql).await?;

        let fingerprint = query_fingerprint(sql);
        if !options.no_cache {
            if let Some(rows) = self.cache.get(&fingerprint) {
                debug!(rows = rows.len(), "result cache hit");
                self.statistics.record_completed(0, true);
                return Ok(rows);
            }
        }

        let outcome = executor::execute(&plan, &self.registry, options).await?;
        debug!(
            rows = outcome.rows.len(),
            bytes = outcome.bytes_fetched,
            "federated query complete"
        );

        if !options.no_cache {
            self.cache.put(fingerprint, outcome.rows.clone());
        }
        self.statistics.record_completed(outcome.bytes_fetched, false);
        Ok(outcome.rows)
    }
}

/// Renders an execution plan as indented human-readable text.
fn render_plan(plan: &ExecutionPlan) -> String {
    let databases: Vec<&str> = plan.databases.iter().map(|d| d.as_str()).collect();

    let mut out = String::new();
    let _ = writeln!(out, "Execution plan {}", plan.id);
    let _ = writeln!(out, "Query: {}", plan.query.trim());
    let _ = writeln!(out, "Strategy: {}", plan.strategy);
    let _ = writeln!(out, "Databases: {}", databases.join(", "));
    let _ = writeln!(out, "Estimated cost: {:.1}", plan.estimated_cost);
    let _ = writeln!(out, "Steps:");
    for (position, step) in plan.steps.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. [{}] {} ({})",
            position + 1,
            step.kind.type_label(),
            step.operation,
            step.id
        );
        if !step.dependencies.is_empty() {
            let _ = writeln!(out, "     depends on: {}", step.dependencies.join(", "));
        }
        let _ = writeln!(
            out,
            "     rows~{}  cost~{:.1}",
            step.estimated_rows, step.estimated_cost
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::connectors::MemoryConnector;
    use crate::engine::types::Value;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn engine() -> FederationEngine {
        let registry = Arc::new(ConnectionRegistry::new());
        registry.register(
            "usersdb",
            Arc::new(MemoryConnector::new().with_table(
                "users",
                vec![
                    row(&[("id", Value::Int(1)), ("name", Value::Text("Ada".into()))]),
                    row(&[("id", Value::Int(2)), ("name", Value::Text("Grace".into()))]),
                ],
            )),
        );
        registry.register(
            "ordersdb",
            Arc::new(MemoryConnector::new().with_table(
                "orders",
                vec![row(&[("user_id", Value::Int(1)), ("total", Value::Int(100))])],
            )),
        );
        FederationEngine::new(registry)
    }

    #[tokio::test]
    async fn explain_renders_without_executing() {
        let engine = engine();
        let text = engine
            .explain_query(
                "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id",
            )
            .await
            .unwrap();

        assert!(text.contains("Strategy:"));
        assert!(text.contains("Databases: ordersdb, usersdb"));
        assert!(text.contains("fetch_usersdb_users"));
        assert!(text.contains("join_0"));

        // Nothing executed, nothing counted.
        assert_eq!(engine.statistics().queries_executed, 0);
    }

    #[tokio::test]
    async fn repeated_query_hits_the_cache() {
        let engine = engine();
        let sql = "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id";

        let first = engine.execute_federated_query(sql).await.unwrap();
        let second = engine.execute_federated_query(sql).await.unwrap();
        assert_eq!(first, second);

        let stats = engine.statistics();
        assert_eq!(stats.queries_executed, 2);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn clear_caches_forces_re_execution() {
        let engine = engine();
        let sql = "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id";

        engine.execute_federated_query(sql).await.unwrap();
        engine.clear_caches();
        engine.execute_federated_query(sql).await.unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.cache_misses, 2);
    }

    #[tokio::test]
    async fn failed_queries_are_counted() {
        let engine = engine();
        let err = engine
            .execute_federated_query("SELECT * FROM usersdb.users")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Federation { .. }));
        assert_eq!(engine.statistics().queries_failed, 1);
        assert_eq!(engine.statistics().queries_executed, 0);
    }

    #[tokio::test]
    async fn reset_statistics_is_observed_as_all_zero() {
        let engine = engine();
        let sql = "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id";
        engine.execute_federated_query(sql).await.unwrap();

        engine.reset_statistics();
        let stats = engine.statistics();
        assert_eq!(stats.queries_executed, 0);
        assert_eq!(stats.total_data_transferred, 0);
        assert_eq!(stats.cache_misses, 0);
        // Connection count is live state, not a counter.
        assert_eq!(stats.databases, 2);
    }
}

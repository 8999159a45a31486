//! End-to-end federation pipeline tests against in-memory connectors.

use std::sync::Arc;

use async_trait::async_trait;
use fedsql::federation::planner;
use fedsql::{
    ConnectionRegistry, Connector, EngineError, EngineResult, FederationEngine, FederationOptions,
    MemoryConnector, Row, TableSizeEstimate, Value,
};

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn int(n: i64) -> Value {
    Value::Int(n)
}

fn text(s: &str) -> Value {
    Value::Text(s.into())
}

/// Two databases: a relational-style users table and an orders table that
/// could just as well come from a document store.
fn demo_registry() -> Arc<ConnectionRegistry> {
    let users = MemoryConnector::new().with_table(
        "users",
        vec![
            row(&[("id", int(1)), ("name", text("Ada")), ("status", text("active"))]),
            row(&[("id", int(2)), ("name", text("Grace")), ("status", text("active"))]),
            row(&[("id", int(3)), ("name", text("Linus")), ("status", text("inactive"))]),
        ],
    );
    let orders = MemoryConnector::new().with_table(
        "orders",
        vec![
            row(&[("order_id", int(100)), ("user_id", int(1)), ("total", int(250))]),
            row(&[("order_id", int(101)), ("user_id", int(1)), ("total", int(50))]),
            row(&[("order_id", int(102)), ("user_id", int(2)), ("total", int(300))]),
            row(&[("order_id", int(103)), ("user_id", int(9)), ("total", int(10))]),
        ],
    );

    let registry = Arc::new(ConnectionRegistry::new());
    registry.register("usersdb", Arc::new(users));
    registry.register("ordersdb", Arc::new(orders));
    registry
}

#[tokio::test]
async fn inner_join_across_two_databases() {
    let engine = FederationEngine::new(demo_registry());
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();

    // Ada has two orders, Grace one, Linus none; order 103 matches nobody.
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.get("name").is_some() && r.get("total").is_some()));
}

#[tokio::test]
async fn left_join_keeps_customers_without_orders() {
    let engine = FederationEngine::new(demo_registry());
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM usersdb.users u LEFT JOIN ordersdb.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 4);
    let linus = rows
        .iter()
        .find(|r| r.get("name") == Some(&text("Linus")))
        .unwrap();
    assert_eq!(linus.get("total"), Some(&Value::Null));
    assert_eq!(linus.get("order_id"), Some(&Value::Null));
}

#[tokio::test]
async fn full_join_covers_orphaned_orders() {
    let engine = FederationEngine::new(demo_registry());
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM usersdb.users u FULL OUTER JOIN ordersdb.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();

    // 3 matches + Linus unmatched + order 103 unmatched.
    assert_eq!(rows.len(), 5);
    let orphan = rows
        .iter()
        .find(|r| r.get("order_id") == Some(&int(103)))
        .unwrap();
    assert_eq!(orphan.get("name"), Some(&Value::Null));
}

#[tokio::test]
async fn where_span_filters_at_each_source() {
    let engine = FederationEngine::new(demo_registry());
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id \
             WHERE u.status = 'active' AND o.total >= 100",
        )
        .await
        .unwrap();

    // Ada's 250 order and Grace's 300 order survive; Ada's 50 order is
    // filtered out by the orders source.
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| {
        r.get("total")
            .and_then(|v| v.as_f64())
            .map(|t| t >= 100.0)
            .unwrap_or(false)
    }));
}

#[tokio::test]
async fn aggregate_sort_limit_pipeline() {
    let engine = FederationEngine::new(demo_registry());
    let rows = engine
        .execute_federated_query(
            "SELECT u.name, SUM(o.total), COUNT(o.total) \
             FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id \
             GROUP BY u.name ORDER BY name ASC LIMIT 1",
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&text("Ada")));
    assert_eq!(rows[0].get("sum_total"), Some(&int(300)));
    assert_eq!(rows[0].get("count_total"), Some(&int(2)));
}

#[tokio::test]
async fn limit_offset_windows_the_result() {
    let registry = Arc::new(ConnectionRegistry::new());
    registry.register(
        "leftdb",
        Arc::new(MemoryConnector::new().with_table(
            "numbers",
            (0..100).map(|i| row(&[("id", int(i))])).collect(),
        )),
    );
    registry.register(
        "rightdb",
        Arc::new(
            MemoryConnector::new()
                .with_table("mirror", (0..100).map(|i| row(&[("ref_id", int(i))])).collect()),
        ),
    );

    let engine = FederationEngine::new(registry);
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM leftdb.numbers n JOIN rightdb.mirror m ON n.id = m.ref_id \
             ORDER BY id ASC LIMIT 10 OFFSET 20",
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(rows.first().unwrap().get("id"), Some(&int(20)));
    assert_eq!(rows.last().unwrap().get("id"), Some(&int(29)));
}

#[tokio::test]
async fn plan_databases_match_referenced_databases() {
    let registry = demo_registry();
    let engine = FederationEngine::new(Arc::clone(&registry));

    let sql = "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id";
    let query = engine.parse_sql(sql).unwrap();
    let plan = planner::build_plan(sql, &query, &registry).await.unwrap();

    let expected: Vec<&str> = vec!["ordersdb", "usersdb"];
    let got: Vec<&str> = plan.databases.iter().map(|d| d.as_str()).collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn single_database_query_is_rejected() {
    let engine = FederationEngine::new(demo_registry());
    let err = engine
        .execute_federated_query("SELECT * FROM usersdb.users")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Federation { .. }));
}

#[tokio::test]
async fn missing_source_table_aborts_the_query() {
    let engine = FederationEngine::new(demo_registry());
    let err = engine
        .execute_federated_query(
            "SELECT * FROM usersdb.ghosts g JOIN ordersdb.orders o ON g.id = o.user_id",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Execution { .. }));
    assert!(err.to_string().contains("ghosts"));
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
    let registry = Arc::new(ConnectionRegistry::new());
    registry.register(
        "a",
        Arc::new(MemoryConnector::new().with_table("t1", vec![row(&[("id", int(1))])])),
    );
    registry.register(
        "b",
        Arc::new(MemoryConnector::new().with_table("t2", vec![row(&[("ref_id", int(99))])])),
    );

    let engine = FederationEngine::new(registry);
    let rows = engine
        .execute_federated_query("SELECT * FROM a.t1 x JOIN b.t2 y ON x.id = y.ref_id")
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn statistics_track_bytes_and_queries() {
    let engine = FederationEngine::new(demo_registry());
    engine
        .execute_federated_query(
            "SELECT * FROM usersdb.users u JOIN ordersdb.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();

    let stats = engine.statistics();
    assert_eq!(stats.queries_executed, 1);
    assert_eq!(stats.databases, 2);
    assert!(stats.total_data_transferred > 0);
}

#[tokio::test]
async fn row_cap_truncates_oversized_fetches() {
    let registry = Arc::new(ConnectionRegistry::new());
    registry.register(
        "bigdb",
        Arc::new(MemoryConnector::new().with_table(
            "wide",
            (0..1_000).map(|i| row(&[("id", int(i))])).collect(),
        )),
    );
    registry.register(
        "smalldb",
        Arc::new(MemoryConnector::new().with_table("keys", vec![row(&[("ref_id", int(5))])])),
    );

    let engine = FederationEngine::new(registry);
    let options = FederationOptions {
        row_limit_per_source: Some(10),
        ..FederationOptions::default()
    };
    let rows = engine
        .execute_with_options(
            "SELECT * FROM bigdb.wide w JOIN smalldb.keys k ON w.id = k.ref_id",
            options,
        )
        .await
        .unwrap();

    // Only the first 10 wide rows survive the cap, so id 5 still matches.
    assert_eq!(rows.len(), 1);
}

/// Connector that never answers, for timeout coverage.
struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    fn driver_id(&self) -> &str {
        "stalled"
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn fetch_rows(&self, _table: &str, _where_span: Option<&str>) -> EngineResult<Vec<Row>> {
        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn estimate_table_size(&self, _table: &str) -> EngineResult<TableSizeEstimate> {
        Ok(TableSizeEstimate { row_count: 1, size_bytes: 16 })
    }
}

#[tokio::test]
async fn stalled_fetch_times_out() {
    let registry = Arc::new(ConnectionRegistry::new());
    registry.register("slowdb", Arc::new(StalledConnector));
    registry.register(
        "fastdb",
        Arc::new(MemoryConnector::new().with_table("t", vec![row(&[("ref_id", int(1))])])),
    );

    let engine = FederationEngine::new(registry);
    let options = FederationOptions {
        fetch_timeout_ms: Some(50),
        ..FederationOptions::default()
    };
    let err = engine
        .execute_with_options(
            "SELECT * FROM slowdb.stuck s JOIN fastdb.t f ON s.id = f.ref_id",
            options,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));
    assert_eq!(engine.statistics().queries_failed, 1);
}

#[tokio::test]
async fn default_database_resolves_bare_tables() {
    let engine = FederationEngine::new(demo_registry()).with_default_database("usersdb");
    let rows = engine
        .execute_federated_query(
            "SELECT * FROM users u JOIN ordersdb.orders o ON u.id = o.user_id",
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn explain_does_not_touch_sources_or_counters() {
    let engine = FederationEngine::new(demo_registry());
    let text = engine
        .explain_query(
            "SELECT u.name, SUM(o.total) FROM usersdb.users u \
             JOIN ordersdb.orders o ON u.id = o.user_id \
             GROUP BY u.name ORDER BY name LIMIT 5",
        )
        .await
        .unwrap();

    assert!(text.contains("[fetch]"));
    assert!(text.contains("[join]"));
    assert!(text.contains("[aggregate]"));
    assert!(text.contains("[sort]"));
    assert!(text.contains("[limit]"));
    assert_eq!(engine.statistics().queries_executed, 0);
    assert_eq!(engine.statistics().total_data_transferred, 0);
}

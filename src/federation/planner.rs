// SPDX-License-Identifier: Apache-2.0

//! Federation query planner.
//!
//! Lowers a validated query into a DAG of typed execution steps: one fetch
//! per distinct source table, a join step per JOIN clause chained
//! left-to-right, then aggregate, sort, and limit steps as the query asks
//! for them. Each step carries row/cost estimates; the strategy label is
//! explanatory only and never changes the execution algorithm.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::ConnectionRegistry;
use crate::engine::types::TableSizeEstimate;

use super::types::{
    AggregateSpec, ExecutionPlan, ExecutionStep, JoinCondition, ParsedQuery, StepKind, Strategy,
};

/// Fallback estimate when a source cannot provide one. Planning must never
/// abort on a missing estimate.
const DEFAULT_ESTIMATE: TableSizeEstimate = TableSizeEstimate {
    row_count: 1_000,
    size_bytes: 100_000,
};

/// Fraction of the cross product an equi-join is assumed to keep.
const JOIN_SELECTIVITY: f64 = 0.1;

/// Group-by is assumed to collapse its input by this factor.
const GROUP_REDUCTION: u64 = 10;

/// A fetch at or under this row count makes the plan a broadcast candidate.
const BROADCAST_ROW_THRESHOLD: u64 = 1_000;

/// Combined fetch volume beyond which the plan is labeled `hash`.
const HASH_ROW_THRESHOLD: u64 = 100_000;

// Per-unit cost weights; the absolute scale is arbitrary, only relative
// step weights matter for the explain output.
const FETCH_COST_PER_KB: f64 = 1.0;
const JOIN_COST_PER_PAIR: f64 = 0.01;
const AGGREGATE_COST_PER_ROW: f64 = 0.005;
const SORT_COST_PER_ROW: f64 = 0.002;
const LIMIT_COST_PER_ROW: f64 = 0.001;

/// Builds an [`ExecutionPlan`] for a parsed and validated query.
pub async fn build_plan(
    sql: &str,
    query: &ParsedQuery,
    registry: &ConnectionRegistry,
) -> EngineResult<ExecutionPlan> {
    let where_clause = query.where_text();
    let mut steps: Vec<ExecutionStep> = Vec::new();
    let mut estimated_rows: HashMap<String, u64> = HashMap::new();

    // One fetch step per distinct (database, table) pair, in reference order.
    let mut fetch_ids: HashMap<(String, String), String> = HashMap::new();
    for table_ref in query.table_refs() {
        let key = (table_ref.database.clone(), table_ref.table.clone());
        if fetch_ids.contains_key(&key) {
            continue;
        }

        let estimate = estimate_source(registry, &table_ref.database, &table_ref.table).await;
        let id = format!("fetch_{}_{}", table_ref.database, table_ref.table);
        debug!(
            step = %id,
            rows = estimate.row_count,
            bytes = estimate.size_bytes,
            "planned fetch step"
        );

        estimated_rows.insert(id.clone(), estimate.row_count);
        steps.push(ExecutionStep {
            id: id.clone(),
            kind: StepKind::Fetch {
                database: table_ref.database.clone(),
                table: table_ref.table.clone(),
                where_clause: where_clause.clone(),
            },
            operation: format!("Fetch rows from {}", table_ref.qualified()),
            dependencies: Vec::new(),
            estimated_rows: estimate.row_count,
            estimated_cost: estimate.size_bytes as f64 / 1024.0 * FETCH_COST_PER_KB,
        });
        fetch_ids.insert(key, id);
    }

    // Binding name (alias or bare table) -> fetch step id, for resolving
    // which fetch a join condition side refers to.
    let mut bindings: HashMap<String, String> = HashMap::new();
    for table_ref in query.table_refs() {
        let key = (table_ref.database.clone(), table_ref.table.clone());
        if let Some(id) = fetch_ids.get(&key) {
            bindings.insert(table_ref.binding().to_string(), id.clone());
        }
    }

    // Join steps chain left-to-right off the first FROM table.
    let first = query
        .from
        .first()
        .ok_or_else(|| EngineError::internal("parsed query has no FROM table"))?;
    let mut terminal = fetch_ids
        .get(&(first.database.clone(), first.table.clone()))
        .cloned()
        .ok_or_else(|| EngineError::internal("missing fetch step for first FROM table"))?;
    let mut terminal_rows = estimated_rows.get(&terminal).copied().unwrap_or(0);

    for (index, join) in query.joins.iter().enumerate() {
        let right_binding = join.table.binding();
        let right_id = bindings
            .get(right_binding)
            .cloned()
            .ok_or_else(|| EngineError::internal("missing fetch step for joined table"))?;
        let on = orient_condition(&join.on, right_binding, &bindings)?;

        let right_rows = estimated_rows.get(&right_id).copied().unwrap_or(0);
        let pairings = terminal_rows as f64 * right_rows as f64;
        let join_rows = (pairings * JOIN_SELECTIVITY).ceil().max(1.0) as u64;

        let id = format!("join_{index}");
        estimated_rows.insert(id.clone(), join_rows);
        steps.push(ExecutionStep {
            id: id.clone(),
            kind: StepKind::Join {
                left: terminal.clone(),
                right: right_id.clone(),
                join_type: join.join_type,
                on: on.clone(),
            },
            operation: format!(
                "{} JOIN {} ON {}.{} = {}.{}",
                join.join_type,
                join.table.qualified(),
                on.left_table,
                on.left_column,
                on.right_table,
                on.right_column
            ),
            dependencies: vec![terminal.clone(), right_id],
            estimated_rows: join_rows,
            estimated_cost: pairings * JOIN_COST_PER_PAIR,
        });

        terminal = id;
        terminal_rows = join_rows;
    }

    if !query.group_by.is_empty() {
        let aggregates: Vec<AggregateSpec> = query
            .select
            .iter()
            .filter_map(|item| {
                item.aggregate.map(|function| AggregateSpec {
                    function,
                    column: bare_column(&item.expression),
                })
            })
            .collect();

        let rows = (terminal_rows / GROUP_REDUCTION).max(1);
        let fields: Vec<String> = aggregates
            .iter()
            .map(|a| format!("{}_{}", a.function.field_prefix(), a.column))
            .collect();
        let operation = if fields.is_empty() {
            format!("Aggregate by {}", query.group_by.join(", "))
        } else {
            format!(
                "Aggregate by {} computing {}",
                query.group_by.join(", "),
                fields.join(", ")
            )
        };

        let id = "aggregate".to_string();
        steps.push(ExecutionStep {
            id: id.clone(),
            kind: StepKind::Aggregate { group_by: query.group_by.clone(), aggregates },
            operation,
            dependencies: vec![terminal.clone()],
            estimated_rows: rows,
            estimated_cost: terminal_rows as f64 * AGGREGATE_COST_PER_ROW,
        });
        terminal = id;
        terminal_rows = rows;
    }

    if !query.order_by.is_empty() {
        let keys = query.order_by.clone();
        let described: Vec<String> = keys
            .iter()
            .map(|k| format!("{} {}", k.column, k.direction))
            .collect();
        let n = terminal_rows as f64;

        let id = "sort".to_string();
        steps.push(ExecutionStep {
            id: id.clone(),
            kind: StepKind::Sort { keys },
            operation: format!("Sort by {}", described.join(", ")),
            dependencies: vec![terminal.clone()],
            estimated_rows: terminal_rows,
            estimated_cost: n * n.max(2.0).log2() * SORT_COST_PER_ROW,
        });
        terminal = id;
    }

    if query.limit.is_some() || query.offset.is_some() {
        let offset = query.offset.unwrap_or(0);
        let after_offset = terminal_rows.saturating_sub(offset);
        let rows = query.limit.map_or(after_offset, |l| after_offset.min(l));
        let operation = match query.limit {
            Some(limit) => format!("Limit {limit} offset {offset}"),
            None => format!("Offset {offset}"),
        };

        let id = "limit".to_string();
        steps.push(ExecutionStep {
            id: id.clone(),
            kind: StepKind::Limit { limit: query.limit, offset },
            operation,
            dependencies: vec![terminal.clone()],
            estimated_rows: rows,
            estimated_cost: terminal_rows as f64 * LIMIT_COST_PER_ROW,
        });
    }

    let estimated_cost: f64 = steps.iter().map(|s| s.estimated_cost).sum();
    let strategy = select_strategy(query, &steps);

    Ok(ExecutionPlan {
        id: Uuid::new_v4(),
        query: sql.to_string(),
        databases: query.databases(),
        steps,
        estimated_cost,
        strategy,
        created_at: Utc::now(),
    })
}

/// Asks the source for a size estimate, falling back to a conservative
/// default when the connection or the estimate itself is unavailable.
async fn estimate_source(
    registry: &ConnectionRegistry,
    database: &str,
    table: &str,
) -> TableSizeEstimate {
    match registry.get(database) {
        Some(connector) => connector
            .estimate_table_size(table)
            .await
            .unwrap_or(DEFAULT_ESTIMATE),
        None => DEFAULT_ESTIMATE,
    }
}

/// Orients a join condition so its right side names the joined table.
///
/// `... JOIN b.t2 x ON x.id = t1.ref` and `... ON t1.ref = x.id` describe
/// the same join; the executor expects the accumulated (left) side first.
fn orient_condition(
    on: &JoinCondition,
    right_binding: &str,
    bindings: &HashMap<String, String>,
) -> EngineResult<JoinCondition> {
    let oriented = if on.right_table == right_binding {
        on.clone()
    } else if on.left_table == right_binding {
        JoinCondition {
            left_table: on.right_table.clone(),
            left_column: on.right_column.clone(),
            right_table: on.left_table.clone(),
            right_column: on.left_column.clone(),
        }
    } else {
        return Err(EngineError::federation(format!(
            "join condition '{}.{} = {}.{}' does not reference joined table '{}'",
            on.left_table, on.left_column, on.right_table, on.right_column, right_binding
        )));
    };

    if !bindings.contains_key(&oriented.left_table) {
        return Err(EngineError::federation(format!(
            "join condition references unknown table '{}'",
            oriented.left_table
        )));
    }
    Ok(oriented)
}

fn bare_column(reference: &str) -> String {
    reference
        .rsplit('.')
        .next()
        .unwrap_or(reference)
        .to_string()
}

/// Picks the strategy label. Purely explanatory: execution always uses the
/// same nested-loop join.
fn select_strategy(query: &ParsedQuery, steps: &[ExecutionStep]) -> Strategy {
    if query.joins.is_empty() {
        return Strategy::NestedLoop;
    }

    let fetch_rows: Vec<u64> = steps
        .iter()
        .filter(|s| matches!(s.kind, StepKind::Fetch { .. }))
        .map(|s| s.estimated_rows)
        .collect();

    let smallest = fetch_rows.iter().copied().min().unwrap_or(0);
    let total: u64 = fetch_rows.iter().sum();

    if smallest <= BROADCAST_ROW_THRESHOLD {
        Strategy::Broadcast
    } else if total > HASH_ROW_THRESHOLD {
        Strategy::Hash
    } else {
        Strategy::NestedLoop
    }
}

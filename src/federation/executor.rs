// SPDX-License-Identifier: Apache-2.0

//! Plan executor.
//!
//! Schedules plan steps in dependency order. Source fetches are I/O-bound
//! and touch disjoint databases, so every dependency-free fetch is
//! dispatched concurrently and awaited jointly; the in-memory operators
//! (join, aggregate, sort, limit) then run sequentially, each consuming its
//! dependencies' row sets.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::registry::ConnectionRegistry;
use crate::engine::types::{Row, Value};

use super::types::{
    AggregateFunction, AggregateSpec, ExecutionPlan, ExecutionStep, FederationOptions,
    JoinCondition, JoinType, OrderKey, SortDirection, StepKind,
};

/// Default per-source fetch timeout (30 s).
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Outcome of one plan execution.
pub struct ExecutionOutcome {
    pub rows: Vec<Row>,
    /// Serialized size of every fetched source row set, for the
    /// data-transferred counter.
    pub bytes_fetched: u64,
}

/// Executes a plan against the registry and returns the terminal step's rows.
pub async fn execute(
    plan: &ExecutionPlan,
    registry: &Arc<ConnectionRegistry>,
    options: &FederationOptions,
) -> EngineResult<ExecutionOutcome> {
    let order = topological_order(&plan.steps)?;

    let mut results: HashMap<String, Vec<Row>> = HashMap::new();
    let mut bytes_fetched = 0u64;

    let fetch_timeout =
        Duration::from_millis(options.fetch_timeout_ms.unwrap_or(DEFAULT_FETCH_TIMEOUT_MS));
    let row_cap = options.row_limit_per_source;

    // Phase 1: dispatch every dependency-free fetch concurrently.
    let mut handles = Vec::new();
    for (index, step) in plan.steps.iter().enumerate() {
        if !step.dependencies.is_empty() {
            continue;
        }
        if let StepKind::Fetch { database, table, where_clause } = &step.kind {
            let registry = Arc::clone(registry);
            let database = database.clone();
            let table = table.clone();
            let where_clause = where_clause.clone();
            let step_id = step.id.clone();

            handles.push((
                index,
                tokio::spawn(async move {
                    let connector = registry.require(&database)?;
                    let rows = timeout(
                        fetch_timeout,
                        connector.fetch_rows(&table, where_clause.as_deref()),
                    )
                    .await
                    .map_err(|_| EngineError::Timeout {
                        timeout_ms: fetch_timeout.as_millis() as u64,
                    })??;
                    Ok::<Vec<Row>, EngineError>(rows)
                }),
            ));
        }
    }

    // Await every sibling before reporting the first failure, so in-flight
    // fetches finish instead of leaking their connections; results of
    // siblings of a failed fetch are discarded with the query.
    let (indices, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let outcomes = futures::future::join_all(tasks).await;

    let mut first_error: Option<EngineError> = None;
    for (index, outcome) in indices.into_iter().zip(outcomes) {
        let step = &plan.steps[index];
        match outcome {
            Ok(Ok(mut rows)) => {
                if let Some(cap) = row_cap {
                    if rows.len() as u64 > cap {
                        warn!(
                            step = %step.id,
                            cap,
                            fetched = rows.len(),
                            "source fetch truncated to row cap; results may be incomplete"
                        );
                        rows.truncate(cap as usize);
                    }
                }
                bytes_fetched += serialized_size(&rows);
                debug!(step = %step.id, rows = rows.len(), "fetch step complete");
                results.insert(step.id.clone(), rows);
            }
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(wrap_step_error(step, e));
                }
            }
            Err(join_error) => {
                if first_error.is_none() {
                    first_error = Some(EngineError::internal(format!(
                        "fetch task for step '{}' panicked: {join_error}",
                        step.id
                    )));
                }
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    // Phase 2: remaining steps in topological order, sequentially.
    for &index in &order {
        let step = &plan.steps[index];
        if results.contains_key(&step.id) {
            continue;
        }

        let rows = match &step.kind {
            StepKind::Fetch { database, table, where_clause } => {
                // Not produced by the planner, but a dependent fetch in a
                // hand-built plan still has to run somewhere.
                let connector = registry.require(database)?;
                timeout(fetch_timeout, connector.fetch_rows(table, where_clause.as_deref()))
                    .await
                    .map_err(|_| EngineError::Timeout {
                        timeout_ms: fetch_timeout.as_millis() as u64,
                    })?
                    .map_err(|e| wrap_step_error(step, e))?
            }
            StepKind::Join { left, right, join_type, on } => {
                let left_rows = step_input(&results, left, &step.id)?;
                let right_rows = step_input(&results, right, &step.id)?;
                nested_loop_join(left_rows, right_rows, *join_type, on)
            }
            StepKind::Aggregate { group_by, aggregates } => {
                let input = dependency_input(&results, step)?;
                aggregate_rows(input, group_by, aggregates)?
            }
            StepKind::Sort { keys } => {
                let input = dependency_input(&results, step)?;
                sort_rows(input.clone(), keys)
            }
            StepKind::Limit { limit, offset } => {
                let input = dependency_input(&results, step)?;
                apply_limit(input.clone(), *limit, *offset)
            }
        };

        debug!(step = %step.id, rows = rows.len(), "step complete");
        results.insert(step.id.clone(), rows);
    }

    let terminal = plan
        .terminal_step()
        .ok_or_else(|| EngineError::internal("execution plan has no steps"))?;
    let rows = results
        .remove(&terminal.id)
        .ok_or_else(|| EngineError::internal("terminal step produced no result"))?;

    Ok(ExecutionOutcome { rows, bytes_fetched })
}

/// Kahn's algorithm over the step arena. The absence of a complete ordering
/// is the cycle signal; a cycle is a planner bug, so it is logged loudly.
fn topological_order(steps: &[ExecutionStep]) -> EngineResult<Vec<usize>> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for dependency in &step.dependencies {
            let Some(&d) = index.get(dependency.as_str()) else {
                return Err(EngineError::internal(format!(
                    "step '{}' depends on unknown step '{dependency}'",
                    step.id
                )));
            };
            indegree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..steps.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != steps.len() {
        let unresolved: Vec<&str> = (0..steps.len())
            .filter(|i| !order.contains(i))
            .map(|i| steps[i].id.as_str())
            .collect();
        error!(steps = ?unresolved, "execution plan contains a dependency cycle");
        return Err(EngineError::circular_dependency(format!(
            "no topological order exists; unresolved steps: {}",
            unresolved.join(", ")
        )));
    }
    Ok(order)
}

fn step_input<'a>(
    results: &'a HashMap<String, Vec<Row>>,
    id: &str,
    consumer: &str,
) -> EngineResult<&'a Vec<Row>> {
    results.get(id).ok_or_else(|| {
        EngineError::internal(format!("step '{consumer}' is missing input from step '{id}'"))
    })
}

fn dependency_input<'a>(
    results: &'a HashMap<String, Vec<Row>>,
    step: &ExecutionStep,
) -> EngineResult<&'a Vec<Row>> {
    let dependency = step
        .dependencies
        .first()
        .ok_or_else(|| EngineError::internal(format!("step '{}' has no dependency", step.id)))?;
    step_input(results, dependency, &step.id)
}

fn wrap_step_error(step: &ExecutionStep, err: EngineError) -> EngineError {
    match err {
        EngineError::Timeout { .. } => err,
        other => EngineError::execution(format!("step '{}' failed: {other}", step.id)),
    }
}

fn serialized_size(rows: &[Row]) -> u64 {
    serde_json::to_vec(rows).map(|v| v.len() as u64).unwrap_or(0)
}

// --- In-memory relational operators ---

/// Nested-loop join, used for all four join types.
///
/// INNER emits matches only; LEFT emits every left row at least once with
/// NULL-filled right columns when unmatched; RIGHT is the mirror image; FULL
/// is LEFT plus the unmatched right rows with NULL-filled left columns.
/// One-to-many matches fan out, duplicating the other side's fields.
pub(crate) fn nested_loop_join(
    left: &[Row],
    right: &[Row],
    join_type: JoinType,
    on: &JoinCondition,
) -> Vec<Row> {
    let left_columns = column_union(left);
    let right_columns = column_union(right);
    let mut out = Vec::new();

    match join_type {
        JoinType::Inner => {
            for l in left {
                for r in right {
                    if keys_match(l, r, on) {
                        out.push(merge_rows(l, r));
                    }
                }
            }
        }
        JoinType::Left => {
            for l in left {
                let mut matched = false;
                for r in right {
                    if keys_match(l, r, on) {
                        matched = true;
                        out.push(merge_rows(l, r));
                    }
                }
                if !matched {
                    out.push(pad_right(l, &right_columns));
                }
            }
        }
        JoinType::Right => {
            for r in right {
                let mut matched = false;
                for l in left {
                    if keys_match(l, r, on) {
                        matched = true;
                        out.push(merge_rows(l, r));
                    }
                }
                if !matched {
                    out.push(pad_left(&left_columns, r));
                }
            }
        }
        JoinType::Full => {
            let mut right_matched = vec![false; right.len()];
            for l in left {
                let mut matched = false;
                for (ri, r) in right.iter().enumerate() {
                    if keys_match(l, r, on) {
                        matched = true;
                        right_matched[ri] = true;
                        out.push(merge_rows(l, r));
                    }
                }
                if !matched {
                    out.push(pad_right(l, &right_columns));
                }
            }
            for (ri, r) in right.iter().enumerate() {
                if !right_matched[ri] {
                    out.push(pad_left(&left_columns, r));
                }
            }
        }
    }

    out
}

/// SQL key equality: NULL join keys never match, a missing column never
/// matches.
fn keys_match(left: &Row, right: &Row, on: &JoinCondition) -> bool {
    match (left.get(&on.left_column), right.get(&on.right_column)) {
        (Some(a), Some(b)) => a.join_eq(b),
        _ => false,
    }
}

/// Ordered union of the column names seen across a row set.
fn column_union(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.columns() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

/// Merged row: left fields then right fields, left winning on name
/// collision. Source column sets are expected to be disjoint.
fn merge_rows(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    for (name, value) in right.iter() {
        if !merged.contains_column(name) {
            merged.set(name, value.clone());
        }
    }
    merged
}

fn pad_right(left: &Row, right_columns: &[String]) -> Row {
    let mut merged = left.clone();
    for column in right_columns {
        if !merged.contains_column(column) {
            merged.set(column.clone(), Value::Null);
        }
    }
    merged
}

fn pad_left(left_columns: &[String], right: &Row) -> Row {
    let mut merged = Row::with_capacity(left_columns.len() + right.len());
    for column in left_columns {
        merged.set(column.clone(), Value::Null);
    }
    for (name, value) in right.iter() {
        if !merged.contains_column(name) {
            merged.set(name, value.clone());
        }
    }
    merged
}

/// Partitions rows by the group-by columns and computes the requested
/// aggregates per group. Result fields are named `{function}_{column}`.
pub(crate) fn aggregate_rows(
    rows: &[Row],
    group_by: &[String],
    aggregates: &[AggregateSpec],
) -> EngineResult<Vec<Row>> {
    // Group key is the unit-separated concatenation of the group values;
    // first-seen order keeps output deterministic.
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&Row>> = HashMap::new();

    for row in rows {
        let mut parts = Vec::with_capacity(group_by.len());
        for column in group_by {
            let value = row.get(column).ok_or_else(|| {
                EngineError::execution(format!("GROUP BY references unknown column '{column}'"))
            })?;
            parts.push(value.to_string());
        }
        let key = parts.join("\u{1f}");
        if !groups.contains_key(&key) {
            group_order.push(key.clone());
        }
        groups.entry(key).or_default().push(row);
    }

    let mut out = Vec::with_capacity(group_order.len());
    for key in &group_order {
        let members = &groups[key];
        let first = members[0];

        let mut row = Row::with_capacity(group_by.len() + aggregates.len());
        for column in group_by {
            row.set(column.clone(), first.get(column).cloned().unwrap_or(Value::Null));
        }
        for spec in aggregates {
            let field = format!("{}_{}", spec.function.field_prefix(), spec.column);
            row.set(field, compute_aggregate(members, spec)?);
        }
        out.push(row);
    }
    Ok(out)
}

fn compute_aggregate(members: &[&Row], spec: &AggregateSpec) -> EngineResult<Value> {
    match spec.function {
        AggregateFunction::Count => Ok(Value::Int(members.len() as i64)),
        AggregateFunction::Sum | AggregateFunction::Avg => {
            let mut sum = 0.0;
            let mut all_int = true;
            let mut any = false;
            for row in members {
                match row.get(&spec.column) {
                    None | Some(Value::Null) => {}
                    Some(value) => match value.as_f64() {
                        Some(n) => {
                            any = true;
                            if !matches!(value, Value::Int(_)) {
                                all_int = false;
                            }
                            sum += n;
                        }
                        None => {
                            return Err(EngineError::execution(format!(
                                "cannot aggregate non-numeric values in column '{}'",
                                spec.column
                            )));
                        }
                    },
                }
            }

            if spec.function == AggregateFunction::Sum {
                if !any {
                    return Ok(Value::Null);
                }
                Ok(if all_int { Value::Int(sum as i64) } else { Value::Float(sum) })
            } else {
                // AVG is SUM over the group's row count, floating semantics.
                if members.is_empty() {
                    return Ok(Value::Null);
                }
                Ok(Value::Float(sum / members.len() as f64))
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let mut best: Option<&Value> = None;
            for row in members {
                let Some(value) = row.get(&spec.column) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => value,
                    Some(current) => {
                        let take_new = match spec.function {
                            AggregateFunction::Min => value.compare(current) == Ordering::Less,
                            _ => value.compare(current) == Ordering::Greater,
                        };
                        if take_new {
                            value
                        } else {
                            current
                        }
                    }
                });
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
    }
}

/// Stable multi-key sort: keys apply in listed order, ties at the last key
/// preserve input order.
pub(crate) fn sort_rows(mut rows: Vec<Row>, keys: &[OrderKey]) -> Vec<Row> {
    rows.sort_by(|a, b| {
        for key in keys {
            let av = a.get(&key.column).unwrap_or(&Value::Null);
            let bv = b.get(&key.column).unwrap_or(&Value::Null);
            let ordering = match key.direction {
                SortDirection::Asc => av.compare(bv),
                SortDirection::Desc => av.compare(bv).reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    rows
}

/// Drops `offset` rows from the front, then keeps at most `limit`.
pub(crate) fn apply_limit(rows: Vec<Row>, limit: Option<u64>, offset: u64) -> Vec<Row> {
    rows.into_iter()
        .skip(offset as usize)
        .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
        .collect()
}

// SPDX-License-Identifier: Apache-2.0

//! Types for the federation query pipeline.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tokenizer::Token;

/// One projected expression in the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    /// Expression text as written (a column reference, `*`, or the argument
    /// of an aggregate call).
    pub expression: String,
    /// Aggregate function when the item is `FUNC(expr)`.
    pub aggregate: Option<AggregateFunction>,
    /// `AS` alias, when given.
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Resolves an aggregate function name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }

    /// Prefix of the result field name (`count_total`, `avg_price`, ...).
    pub fn field_prefix(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// A table reference `database.table [AS] alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The name this table answers to in join conditions: its alias when
    /// present, its bare table name otherwise.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "INNER"),
            Self::Left => write!(f, "LEFT"),
            Self::Right => write!(f, "RIGHT"),
            Self::Full => write!(f, "FULL"),
        }
    }
}

/// Equi-join condition binding exactly one column on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left_table: String,
    pub left_column: String,
    pub right_table: String,
    pub right_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub table: TableRef,
    pub join_type: JoinType,
    pub on: JoinCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "ASC"),
            Self::Desc => write!(f, "DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: String,
    pub direction: SortDirection,
}

/// Structured result of parsing one federated SELECT statement.
///
/// Created once per query, consumed by the validator and planner, then
/// discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub select: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<JoinClause>,
    /// Raw token span between WHERE and the next clause keyword. Opaque to
    /// the planner; forwarded to every source fetch untouched so each
    /// database evaluates its own portion of the predicate locally.
    pub where_span: Vec<Token>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ParsedQuery {
    /// Distinct database names referenced across FROM and JOIN clauses.
    pub fn databases(&self) -> BTreeSet<String> {
        self.table_refs().map(|t| t.database.clone()).collect()
    }

    /// All table references, FROM clauses first, then JOINs in query order.
    pub fn table_refs(&self) -> impl Iterator<Item = &TableRef> {
        self.from.iter().chain(self.joins.iter().map(|j| &j.table))
    }

    /// Renders the WHERE span back to SQL text.
    pub fn where_text(&self) -> Option<String> {
        if self.where_span.is_empty() {
            return None;
        }
        Some(
            self.where_span
                .iter()
                .map(|t| t.value.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

/// One aggregate computation requested by the select list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFunction,
    pub column: String,
}

/// Typed payload of one execution step.
///
/// Carrying the operator parameters in the step keeps the executor from
/// re-deriving them out of the parsed query at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    Fetch {
        database: String,
        table: String,
        where_clause: Option<String>,
    },
    Join {
        left: String,
        right: String,
        join_type: JoinType,
        on: JoinCondition,
    },
    Aggregate {
        group_by: Vec<String>,
        aggregates: Vec<AggregateSpec>,
    },
    Sort {
        keys: Vec<OrderKey>,
    },
    Limit {
        limit: Option<u64>,
        offset: u64,
    },
}

impl StepKind {
    /// Step type label as it appears in plan explanations.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Join { .. } => "join",
            Self::Aggregate { .. } => "aggregate",
            Self::Sort { .. } => "sort",
            Self::Limit { .. } => "limit",
        }
    }
}

/// One node in the plan DAG.
///
/// Dependencies are step IDs, not references: the steps form an arena and
/// the executor derives scheduling order by topological sort, which doubles
/// as cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    #[serde(flatten)]
    pub kind: StepKind,
    /// Human-readable description for plan explanations.
    pub operation: String,
    pub dependencies: Vec<String>,
    pub estimated_rows: u64,
    pub estimated_cost: f64,
}

/// Strategy label attached to a plan.
///
/// Explanatory only: the executor runs the same nested-loop join whatever
/// the label says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NestedLoop,
    Broadcast,
    Hash,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NestedLoop => write!(f, "nested-loop"),
            Self::Broadcast => write!(f, "broadcast"),
            Self::Hash => write!(f, "hash"),
        }
    }
}

/// The complete execution plan for one federated query.
///
/// Owned by a single execution; never shared or mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    /// Original SQL, kept for explanations and audit logging.
    pub query: String,
    pub databases: BTreeSet<String>,
    /// Steps in plan order; the last step produces the query result.
    pub steps: Vec<ExecutionStep>,
    pub estimated_cost: f64,
    pub strategy: Strategy,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step whose output is the query result.
    pub fn terminal_step(&self) -> Option<&ExecutionStep> {
        self.steps.last()
    }
}

/// Options for one federated query execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FederationOptions {
    /// Global pipeline timeout in milliseconds (default: 60_000).
    pub timeout_ms: Option<u64>,
    /// Per-source fetch timeout in milliseconds (default: 30_000).
    pub fetch_timeout_ms: Option<u64>,
    /// Per-source row cap; larger fetches are truncated with a warning.
    pub row_limit_per_source: Option<u64>,
    /// Bypass the result cache for this query.
    pub no_cache: bool,
}

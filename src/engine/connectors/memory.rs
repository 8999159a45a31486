// SPDX-License-Identifier: Apache-2.0

//! In-memory connector.
//!
//! Reference driver used by the test suite and demos. Tables are plain row
//! vectors. A federated WHERE span may reference columns from several
//! sources; this connector honors only the conjunctive `column op literal`
//! fragments whose columns it actually holds and ignores the rest, matching
//! how each real driver evaluates its own portion of the predicate locally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::Connector;
use crate::engine::types::{Row, TableSizeEstimate, Value};
use crate::federation::tokenizer::{tokenize, Token, TokenType};

/// Rows sampled when approximating the serialized table size.
const SIZE_SAMPLE_ROWS: usize = 50;

/// Connector holding named tables of rows in memory
pub struct MemoryConnector {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    connected: AtomicBool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Builder-style table registration
    pub fn with_table(self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_table(name, rows);
        self
    }

    pub fn insert_table(&self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().insert(name.into(), rows);
    }

    /// Simulates connection loss/recovery for validator tests
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn driver_id(&self) -> &str {
        "memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn fetch_rows(&self, table: &str, where_span: Option<&str>) -> EngineResult<Vec<Row>> {
        if !self.is_connected() {
            return Err(EngineError::execution(format!(
                "memory connector is disconnected; cannot fetch '{table}'"
            )));
        }
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| EngineError::execution(format!("table '{table}' does not exist")))?;

        let predicates = where_span.map(parse_local_predicates).unwrap_or_default();
        if predicates.is_empty() {
            return Ok(rows.clone());
        }

        Ok(rows
            .iter()
            .filter(|row| predicates.iter().all(|p| p.accepts(row)))
            .cloned()
            .collect())
    }

    async fn estimate_table_size(&self, table: &str) -> EngineResult<TableSizeEstimate> {
        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| EngineError::execution(format!("table '{table}' does not exist")))?;

        let sample = &rows[..rows.len().min(SIZE_SAMPLE_ROWS)];
        let sample_bytes: usize = sample
            .iter()
            .map(|row| serde_json::to_vec(row).map(|v| v.len()).unwrap_or(0))
            .sum();
        let avg = if sample.is_empty() { 0 } else { sample_bytes / sample.len() };

        Ok(TableSizeEstimate {
            row_count: rows.len() as u64,
            size_bytes: (avg * rows.len()) as u64,
        })
    }
}

/// One locally-evaluable predicate: `column op literal`
struct LocalPredicate {
    column: String,
    operator: String,
    literal: Value,
}

impl LocalPredicate {
    fn accepts(&self, row: &Row) -> bool {
        // A column this source does not hold belongs to another source's
        // portion of the predicate; never filter on it.
        let Some(value) = row.get(&self.column) else {
            return true;
        };
        if value.is_null() {
            return false;
        }
        match self.operator.as_str() {
            "=" => value.join_eq(&self.literal),
            "!=" => !value.join_eq(&self.literal),
            "<" => value.compare(&self.literal).is_lt(),
            ">" => value.compare(&self.literal).is_gt(),
            "<=" => value.compare(&self.literal).is_le(),
            ">=" => value.compare(&self.literal).is_ge(),
            _ => true,
        }
    }
}

/// Extracts the conjunctive `column op literal` fragments of a WHERE span.
///
/// Anything this simple shape cannot express (OR branches, column-to-column
/// comparisons, nested parentheses) disables local filtering for the whole
/// span rather than risk dropping rows another source's predicate would keep.
fn parse_local_predicates(where_span: &str) -> Vec<LocalPredicate> {
    let tokens = tokenize(where_span);
    if tokens.iter().any(|t| t.is_keyword("OR")) {
        return Vec::new();
    }

    tokens
        .split(|t| t.is_keyword("AND"))
        .filter_map(parse_fragment)
        .collect()
}

fn parse_fragment(fragment: &[Token]) -> Option<LocalPredicate> {
    // column reference: ident, or ident '.' ident (qualifier dropped)
    let (column, rest) = match fragment {
        [name, op_and_more @ ..] if name.token_type == TokenType::Identifier => {
            match op_and_more {
                [dot, qualified, tail @ ..]
                    if dot.is_punctuation(".") && qualified.token_type == TokenType::Identifier =>
                {
                    (qualified.value.clone(), tail)
                }
                tail => (name.value.clone(), tail),
            }
        }
        _ => return None,
    };

    let [op, literal] = rest else {
        return None;
    };
    if op.token_type != TokenType::Operator || literal.token_type != TokenType::Literal {
        return None;
    }

    Some(LocalPredicate {
        column,
        operator: op.value.clone(),
        literal: parse_literal(&literal.value),
    })
}

fn parse_literal(raw: &str) -> Value {
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Value::Text(raw[1..raw.len() - 1].to_string());
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(n) = raw.parse::<f64>() {
        return Value::Float(n);
    }
    Value::Text(raw.to_string())
}

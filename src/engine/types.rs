//! Universal data types for the federation engine
//!
//! Rows coming back from heterogeneous sources have no fixed schema, so a
//! row is an ordered column-name to value mapping rather than a struct.
//! Iteration order is insertion order, which keeps projection output
//! deterministic across runs.

use std::cmp::Ordering;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Universal value representation across relational and document engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, when it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// SQL equality for join keys: NULL never matches anything, including
    /// another NULL. Int and Float compare numerically.
    pub fn join_eq(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        match (self, other) {
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            _ => self == other,
        }
    }

    /// Total ordering used by the sort operator: NULLs first, then booleans,
    /// numbers (natural order across Int/Float), then text (lexicographic).
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A single result row: an insertion-ordered mapping from column name to value
///
/// Lookup is a linear scan. Federated result sets are bounded in width, and
/// keeping a flat pair list preserves column order through joins and
/// projections where a hash map would not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Sets a column, replacing any existing value under the same name.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of column names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((column, value)) = access.next_entry::<String, Value>()? {
                    row.set(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Approximate size of a source table
///
/// Used only for plan cost estimates, never for execution correctness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TableSizeEstimate {
    pub row_count: u64,
    pub size_bytes: u64,
}

/// Registry-level view of one registered connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Driver type (e.g. "postgres", "mongodb", "memory")
    pub driver: String,
    /// Whether the underlying connection is currently usable
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_never_join_matches() {
        assert!(!Value::Null.join_eq(&Value::Null));
        assert!(!Value::Null.join_eq(&Value::Int(1)));
        assert!(!Value::Int(1).join_eq(&Value::Null));
    }

    #[test]
    fn int_float_join_eq_compares_numerically() {
        assert!(Value::Int(3).join_eq(&Value::Float(3.0)));
        assert!(!Value::Int(3).join_eq(&Value::Float(3.5)));
    }

    #[test]
    fn value_ordering_nulls_first_then_by_type() {
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).compare(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(
            Value::Text("a".into()).compare(&Value::Text("b".into())),
            Ordering::Less
        );
        assert_eq!(Value::Int(1).compare(&Value::Text("a".into())), Ordering::Less);
    }

    #[test]
    fn row_preserves_insertion_order() {
        let mut row = Row::new();
        row.set("z", Value::Int(1));
        row.set("a", Value::Int(2));
        row.set("m", Value::Int(3));
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["z", "a", "m"]);
    }

    #[test]
    fn row_set_replaces_in_place() {
        let mut row = Row::new();
        row.set("a", Value::Int(1));
        row.set("b", Value::Int(2));
        row.set("a", Value::Int(9));
        assert_eq!(row.get("a"), Some(&Value::Int(9)));
        assert_eq!(row.len(), 2);
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, vec!["a", "b"]);
    }

    #[test]
    fn row_round_trips_through_json_in_order() {
        let row: Row = vec![
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::Text("Ada".into())),
            ("active".to_string(), Value::Bool(true)),
            ("score".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"Ada","active":true,"score":null}"#);

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}

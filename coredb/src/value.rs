//! `Value`: the tagged union every row, index key and embedding distance
//! computation in this crate is built from.
//!
//! Cross-type ordering follows a fixed rank: null < bool < int
//! < float < text < embedding. Within a type, values order naturally, except
//! embeddings, whose ordering is undefined (equality-only).

use std::cmp::Ordering;

use serde_derive::{Deserialize, Serialize};

/// A single column value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Embedding(Vec<f32>),
}

impl Value {
    /// Fixed cross-type rank used by `compare` and `Ord`.
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Embedding(_) => 5,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Embedding(_) => "embedding",
        }
    }

    /// Total order across and within variants. Embedding-to-embedding
    /// comparisons of differing content are arbitrarily, but deterministically,
    /// ordered equal-rank-then-by-length-then-lexicographic so that a BTree
    /// can still place them consistently; callers should not rely on this for
    /// anything but index bookkeeping.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Embedding(a), Value::Embedding(b)) => {
                a.len().cmp(&b.len()).then_with(|| {
                    for (x, y) in a.iter().zip(b.iter()) {
                        match x.partial_cmp(y) {
                            Some(Ordering::Equal) | None => continue,
                            Some(ord) => return ord,
                        }
                    }
                    Ordering::Equal
                })
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Index/search equality: null equals null, unlike the
    /// common SQL convention.
    pub fn values_equal(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.values_equal(other)
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
    }
}

//! Rows and row version chains.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::value::Value;

/// A single row: column name → value. Ordered by column name so a row's
/// serialized form and iteration order are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row(pub BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row(BTreeMap::new())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }
}

/// One version in a row's version chain.
/// `next` is a link to the next-older version, newest-first.
#[derive(Clone, Debug)]
pub struct RowVersion {
    pub values: Row,
    pub xmin: u64,
    pub xmax: Option<u64>,
    pub next: Option<Box<RowVersion>>,
}

impl RowVersion {
    pub fn new(values: Row, xmin: u64) -> Self {
        RowVersion { values, xmin, xmax: None, next: None }
    }
}

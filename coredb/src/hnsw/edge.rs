//! Typed graph edges between external node ids.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_derive::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: u64,
    pub dst: u64,
    pub edge_type: String,
    pub weight: f32,
}

/// `(src, dst, hash(edge_type))`.
pub type EdgeKey = (u64, u64, u64);

pub fn hash_edge_type(edge_type: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    edge_type.hash(&mut hasher);
    hasher.finish()
}

pub fn edge_key(src: u64, dst: u64, edge_type: &str) -> EdgeKey {
    (src, dst, hash_edge_type(edge_type))
}

//! HNSW node storage: a point, its per-layer neighbor lists, and optional
//! metadata.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_derive::{Deserialize, Serialize};

/// A typed attribute attached to a node's metadata map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Node metadata: a type tag used for `searchByType` and the type/file_path
/// inverted indexes, an optional content reference, a timestamp, and a free
/// attribute map.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub node_type: String,
    pub content_ref: Option<String>,
    pub timestamp: i64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// One node in the graph's arena. `connections[layer]` holds the internal
/// ids of this node's neighbors at that layer; it carries its own mutex so
/// `connect()` can rewire two nodes' neighbor lists without taking a
/// whole-graph lock.
pub struct HnswNode {
    pub internal_id: usize,
    pub external_id: u64,
    pub level: usize,
    pub point: Vec<f32>,
    pub connections: Mutex<Vec<Vec<usize>>>,
    pub metadata: Mutex<Option<NodeMetadata>>,
}

impl HnswNode {
    pub fn new(internal_id: usize, external_id: u64, level: usize, point: Vec<f32>, metadata: Option<NodeMetadata>) -> Self {
        HnswNode {
            internal_id,
            external_id,
            level,
            point,
            connections: Mutex::new(vec![Vec::new(); level + 1]),
            metadata: Mutex::new(metadata),
        }
    }

    pub fn metadata_snapshot(&self) -> Option<NodeMetadata> {
        self.metadata.lock().expect("hnsw node metadata mutex poisoned").clone()
    }
}

/// Cosine distance, clamped to [0,2]. Zero-vector pairs are defined to be
/// maximally dissimilar.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let cosine_similarity = dot / (norm_a * norm_b);
    (1.0 - cosine_similarity).clamp(0.0, 2.0)
}

/// Draws a level via geometric sampling with p=1/2, capped at 31.
pub fn sample_level(mut next_f64: impl FnMut() -> f64) -> usize {
    let mut level = 0usize;
    while next_f64() < 0.5 && level < 31 {
        level += 1;
    }
    level
}

#[cfg(test)]
mod node_test {
    use super::*;

    #[test]
    fn cosine_distance_is_zero_for_identical_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&a, &a) < 1e-6);
    }

    #[test]
    fn cosine_distance_is_max_for_zero_vectors() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[0.0, 0.0]), 1.0);
    }

    #[test]
    fn cosine_distance_for_opposite_vectors_is_clamped_to_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn sample_level_is_capped_at_31() {
        assert_eq!(sample_level(|| 0.0), 31);
    }

    #[test]
    fn sample_level_is_zero_when_coin_always_fails() {
        assert_eq!(sample_level(|| 1.0), 0);
    }
}

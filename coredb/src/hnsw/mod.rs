//! HNSW vector + graph index.
//!
//! One `HnswGraph` per distinct embedding dimension, each holding an arena
//! of nodes with per-layer neighbor lists plus a typed edge graph layered
//! on top for hybrid vector-then-graph retrieval.

mod edge;
mod graph;
mod node;
mod persist;

pub use edge::{edge_key, hash_edge_type, Edge, EdgeKey};
pub use graph::{HnswGraph, SearchHit, DEFAULT_EF_CONSTRUCTION, DEFAULT_M};
pub use node::{cosine_distance, AttributeValue, NodeMetadata};
pub use persist::{load, save};

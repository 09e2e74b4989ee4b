//! The HNSW graph itself: insert, k-NN search, typed edges, BFS traversal,
//! and the vector-then-graph hybrid query.
//!
//! One `HnswGraph` exists per distinct embedding dimension. Internally it is an arena of
//! `HnswNode`s addressed by dense `internal_id`, exactly like the B+ tree
//! arena, plus an external<->internal id map, a coarse
//! read-write lock over graph-shape mutation, and per-node fine mutexes for
//! connection rewiring.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use rand::Rng;

use crate::error::{CResult, Error};
use crate::hnsw::edge::{edge_key, Edge, EdgeKey};
use crate::hnsw::node::{cosine_distance, sample_level, HnswNode, NodeMetadata};

pub const DEFAULT_M: usize = 16;
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq)]
struct DistOrd(f32);

impl Eq for DistOrd {}
impl PartialOrd for DistOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub external_id: u64,
    pub distance: f32,
}

pub(crate) struct Shape {
    pub(crate) nodes: Vec<HnswNode>,
    pub(crate) external_to_internal: HashMap<u64, usize>,
    pub(crate) entry_point: Option<usize>,
    pub(crate) max_level: usize,
    pub(crate) next_external_id: u64,
    pub(crate) edges: HashMap<EdgeKey, Edge>,
    pub(crate) outgoing: HashMap<u64, Vec<EdgeKey>>,
    pub(crate) incoming: HashMap<u64, Vec<EdgeKey>>,
    pub(crate) type_index: HashMap<String, HashSet<u64>>,
    pub(crate) file_path_index: HashMap<String, HashSet<u64>>,
}

/// Dimension-keyed ANN index with a typed, attribute-rich graph layered on
/// top.
pub struct HnswGraph {
    pub dim: usize,
    pub m: usize,
    pub ef_construction: usize,
    shape: RwLock<Shape>,
}

impl HnswGraph {
    pub fn new(dim: usize, m: usize, ef_construction: usize) -> Self {
        HnswGraph {
            dim,
            m,
            ef_construction,
            shape: RwLock::new(Shape {
                nodes: Vec::new(),
                external_to_internal: HashMap::new(),
                entry_point: None,
                max_level: 0,
                next_external_id: 1,
                edges: HashMap::new(),
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
                type_index: HashMap::new(),
                file_path_index: HashMap::new(),
            }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.shape.read().expect("hnsw shape lock poisoned").nodes.len()
    }

    pub fn get_internal_id(&self, external_id: u64) -> Option<usize> {
        self.shape
            .read()
            .expect("hnsw shape lock poisoned")
            .external_to_internal
            .get(&external_id)
            .copied()
    }

    // ---- insert ---------------------------------------------------------

    /// Inserts `point` under `external_id` (auto-assigned if `None`).
    /// Rejects a duplicate external id.
    pub fn insert(&self, external_id: Option<u64>, point: Vec<f32>, metadata: Option<NodeMetadata>) -> CResult<u64> {
        if point.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, got: point.len() });
        }
        let mut shape = self.shape.write().expect("hnsw shape lock poisoned");

        let ext_id = match external_id {
            Some(id) => {
                if shape.external_to_internal.contains_key(&id) {
                    return Err(Error::DuplicateExternalId(id));
                }
                id
            }
            None => {
                let id = shape.next_external_id;
                shape.next_external_id += 1;
                id
            }
        };
        if shape.next_external_id <= ext_id {
            shape.next_external_id = ext_id + 1;
        }

        let level = sample_level(|| rand::thread_rng().gen::<f64>());
        let internal_id = shape.nodes.len();

        if let Some(meta) = &metadata {
            shape.type_index.entry(meta.node_type.clone()).or_default().insert(ext_id);
            if let Some(path) = &meta.content_ref {
                shape.file_path_index.entry(path.clone()).or_default().insert(ext_id);
            }
        }

        let node = HnswNode::new(internal_id, ext_id, level, point.clone(), metadata);
        shape.nodes.push(node);
        shape.external_to_internal.insert(ext_id, internal_id);

        match shape.entry_point {
            None => {
                shape.entry_point = Some(internal_id);
                shape.max_level = level;
            }
            Some(mut ep) => {
                let ep_level = shape.nodes[ep].level;
                for layer in (level + 1..=ep_level).rev() {
                    ep = Self::greedy_nearest(&shape, ep, &point, layer);
                }
                let top = level.min(ep_level);
                for layer in (0..=top).rev() {
                    ep = Self::greedy_nearest(&shape, ep, &point, layer);
                    Self::connect_mutual(&shape, internal_id, ep, layer, self.m);
                }
                if level > shape.max_level {
                    shape.entry_point = Some(internal_id);
                    shape.max_level = level;
                }
            }
        }
        Ok(ext_id)
    }

    /// Greedy single-step descent: walk to the neighbor of `start` (at
    /// `layer`) closest to `query`, repeating until no neighbor improves on
    /// the current node.
    fn greedy_nearest(shape: &Shape, start: usize, query: &[f32], layer: usize) -> usize {
        let mut current = start;
        loop {
            let current_dist = cosine_distance(&shape.nodes[current].point, query);
            let neighbors = {
                let conns = shape.nodes[current].connections.lock().expect("hnsw node mutex poisoned");
                if layer < conns.len() {
                    conns[layer].clone()
                } else {
                    Vec::new()
                }
            };
            let mut best = current;
            let mut best_dist = current_dist;
            for neighbor in neighbors {
                let dist = cosine_distance(&shape.nodes[neighbor].point, query);
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                }
            }
            if best == current {
                return current;
            }
            current = best;
        }
    }

    /// Connects `a` and `b` at `layer` in both directions, then shrinks
    /// either side back down to `m` nearest neighbors if it grew past that.
    /// Locks the lower internal id first.
    fn connect_mutual(shape: &Shape, a: usize, b: usize, layer: usize, m: usize) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let mut lo_conns = shape.nodes[lo].connections.lock().expect("hnsw node mutex poisoned");
        let mut hi_conns = shape.nodes[hi].connections.lock().expect("hnsw node mutex poisoned");
        Self::push_and_shrink(shape, &mut lo_conns, lo, hi, layer, m);
        Self::push_and_shrink(shape, &mut hi_conns, hi, lo, layer, m);
    }

    fn push_and_shrink(shape: &Shape, conns: &mut [Vec<usize>], owner: usize, other: usize, layer: usize, m: usize) {
        if layer >= conns.len() {
            return;
        }
        if !conns[layer].contains(&other) {
            conns[layer].push(other);
        }
        if conns[layer].len() > m {
            let owner_point = &shape.nodes[owner].point;
            conns[layer].sort_by(|a, b| {
                let da = cosine_distance(owner_point, &shape.nodes[*a].point);
                let db = cosine_distance(owner_point, &shape.nodes[*b].point);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            });
            conns[layer].truncate(m);
        }
    }

    // ---- search -----------------------------------------------------------

    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        self.search_filtered(query, k, |_| true)
    }

    pub fn search_by_type(&self, query: &[f32], k: usize, node_type: &str) -> Vec<SearchHit> {
        self.search_filtered(query, k, |meta| meta.map(|m| m.node_type == node_type).unwrap_or(false))
    }

    /// Best-first search from the entry point. `admit` filters which
    /// visited nodes count toward the `k` results without stopping
    /// traversal through non-matching nodes.
    fn search_filtered(&self, query: &[f32], k: usize, admit: impl Fn(Option<&NodeMetadata>) -> bool) -> Vec<SearchHit> {
        let shape = self.shape.read().expect("hnsw shape lock poisoned");
        let entry = match shape.entry_point {
            Some(ep) => ep,
            None => return Vec::new(),
        };

        let mut visited = HashSet::new();
        let mut heap = BinaryHeap::new();
        let entry_dist = cosine_distance(&shape.nodes[entry].point, query);
        heap.push(std::cmp::Reverse((DistOrd(entry_dist), entry)));
        visited.insert(entry);

        let mut results = Vec::new();
        while let Some(std::cmp::Reverse((DistOrd(dist), id))) = heap.pop() {
            let meta = shape.nodes[id].metadata_snapshot();
            if admit(meta.as_ref()) {
                results.push(SearchHit { external_id: shape.nodes[id].external_id, distance: dist });
                if results.len() >= k {
                    break;
                }
            }
            let neighbors = shape.nodes[id].connections.lock().expect("hnsw node mutex poisoned");
            let layer0 = neighbors.first().cloned().unwrap_or_default();
            drop(neighbors);
            for neighbor in layer0 {
                if visited.insert(neighbor) {
                    let d = cosine_distance(&shape.nodes[neighbor].point, query);
                    heap.push(std::cmp::Reverse((DistOrd(d), neighbor)));
                }
            }
        }
        results.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        results
    }

    // ---- metadata ---------------------------------------------------------

    /// Replaces a node's metadata, removing it from the type/file_path
    /// inverted indexes before inserting under the new values.
    pub fn update_metadata(&self, external_id: u64, metadata: Option<NodeMetadata>) -> CResult<()> {
        let mut shape = self.shape.write().expect("hnsw shape lock poisoned");
        let internal_id = *shape.external_to_internal.get(&external_id).ok_or(Error::NodeNotFound(external_id))?;

        let prior = shape.nodes[internal_id].metadata_snapshot();
        if let Some(prior_meta) = &prior {
            if let Some(set) = shape.type_index.get_mut(&prior_meta.node_type) {
                set.remove(&external_id);
            }
            if let Some(path) = &prior_meta.content_ref {
                if let Some(set) = shape.file_path_index.get_mut(path) {
                    set.remove(&external_id);
                }
            }
        }
        if let Some(new_meta) = &metadata {
            shape.type_index.entry(new_meta.node_type.clone()).or_default().insert(external_id);
            if let Some(path) = &new_meta.content_ref {
                shape.file_path_index.entry(path.clone()).or_default().insert(external_id);
            }
        }
        *shape.nodes[internal_id].metadata.lock().expect("hnsw node metadata mutex poisoned") = metadata;
        Ok(())
    }

    // ---- typed edges --------------------------------------------------------

    pub fn add_edge(&self, src: u64, dst: u64, edge_type: &str, weight: f32) -> CResult<()> {
        let mut shape = self.shape.write().expect("hnsw shape lock poisoned");
        if !shape.external_to_internal.contains_key(&src) {
            return Err(Error::SourceNodeNotFound(src));
        }
        if !shape.external_to_internal.contains_key(&dst) {
            return Err(Error::DestinationNodeNotFound(dst));
        }
        let key = edge_key(src, dst, edge_type);
        let is_new = !shape.edges.contains_key(&key);
        shape.edges.insert(key, Edge { src, dst, edge_type: edge_type.to_string(), weight });
        if is_new {
            shape.outgoing.entry(src).or_default().push(key);
            shape.incoming.entry(dst).or_default().push(key);
        }
        Ok(())
    }

    pub fn remove_edge(&self, src: u64, dst: u64, edge_type: &str) -> CResult<()> {
        let mut shape = self.shape.write().expect("hnsw shape lock poisoned");
        let key = edge_key(src, dst, edge_type);
        if shape.edges.remove(&key).is_none() {
            return Err(Error::EdgeNotFound { src, dst, edge_type: edge_type.to_string() });
        }
        if let Some(v) = shape.outgoing.get_mut(&src) {
            v.retain(|k| *k != key);
        }
        if let Some(v) = shape.incoming.get_mut(&dst) {
            v.retain(|k| *k != key);
        }
        Ok(())
    }

    pub fn get_edges(&self, node: u64, edge_type: Option<&str>) -> Vec<Edge> {
        let shape = self.shape.read().expect("hnsw shape lock poisoned");
        let mut out: Vec<Edge> = Vec::new();
        for key in shape.outgoing.get(&node).into_iter().flatten() {
            if let Some(edge) = shape.edges.get(key) {
                if edge_type.map(|t| t == edge.edge_type).unwrap_or(true) {
                    out.push(edge.clone());
                }
            }
        }
        for key in shape.incoming.get(&node).into_iter().flatten() {
            if let Some(edge) = shape.edges.get(key) {
                if edge_type.map(|t| t == edge.edge_type).unwrap_or(true) {
                    out.push(edge.clone());
                }
            }
        }
        out
    }

    pub fn get_outgoing(&self, node: u64, edge_type: Option<&str>) -> Vec<Edge> {
        let shape = self.shape.read().expect("hnsw shape lock poisoned");
        shape
            .outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|key| shape.edges.get(key))
            .filter(|e| edge_type.map(|t| t == e.edge_type).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn get_incoming(&self, node: u64, edge_type: Option<&str>) -> Vec<Edge> {
        let shape = self.shape.read().expect("hnsw shape lock poisoned");
        shape
            .incoming
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|key| shape.edges.get(key))
            .filter(|e| edge_type.map(|t| t == e.edge_type).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// All neighbors (either direction) matching `edge_type`, deduplicated.
    pub fn get_neighbors(&self, node: u64, edge_type: Option<&str>) -> Vec<u64> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for edge in self.get_edges(node, edge_type) {
            let other = if edge.src == node { edge.dst } else { edge.src };
            if other != node && seen.insert(other) {
                out.push(other);
            }
        }
        out
    }

    // ---- traversal & hybrid retrieval --------------------------------------

    /// Undirected BFS up to `max_depth` hops over edges matching `edge_type`.
    pub fn traverse(&self, start: u64, max_depth: usize, edge_type: Option<&str>) -> Vec<u64> {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier = vec![start];
        for _ in 0..max_depth {
            let mut next_frontier = Vec::new();
            for node in &frontier {
                for neighbor in self.get_neighbors(*node, edge_type) {
                    if visited.insert(neighbor) {
                        next_frontier.push(neighbor);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        let mut out: Vec<u64> = visited.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Union of the top-k vector hits with a BFS expansion from each hit.
    pub fn search_then_traverse(&self, query: &[f32], k: usize, edge_type: Option<&str>, max_depth: usize) -> Vec<u64> {
        let hits = self.search(query, k);
        let mut out = HashSet::new();
        for hit in &hits {
            out.insert(hit.external_id);
            for id in self.traverse(hit.external_id, max_depth, edge_type) {
                out.insert(id);
            }
        }
        let mut out: Vec<u64> = out.into_iter().collect();
        out.sort_unstable();
        out
    }

    pub(crate) fn snapshot_for_save(&self) -> std::sync::RwLockReadGuard<'_, Shape> {
        self.shape.read().expect("hnsw shape lock poisoned")
    }

    /// Exposes the shape for bulk population while loading from disk,
    /// before the graph is shared with any reader.
    pub(crate) fn shape_for_load(&self) -> std::sync::RwLockWriteGuard<'_, Shape> {
        self.shape.write().expect("hnsw shape lock poisoned")
    }
}

#[cfg(test)]
mod graph_test {
    use super::*;

    fn v(x: f32, y: f32) -> Vec<f32> {
        vec![x, y]
    }

    #[test]
    fn insert_then_get_internal_id_and_self_search() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        for i in 1..=20u64 {
            graph.insert(Some(i), v(i as f32, (i * 2) as f32), None).unwrap();
        }
        for i in 1..=20u64 {
            assert!(graph.get_internal_id(i).is_some());
            let hits = graph.search(&v(i as f32, (i * 2) as f32), 1);
            assert_eq!(hits[0].external_id, i);
            assert!(hits[0].distance < 1e-4);
        }
    }

    #[test]
    fn duplicate_external_id_is_rejected() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        graph.insert(Some(1), v(1.0, 1.0), None).unwrap();
        let err = graph.insert(Some(1), v(2.0, 2.0), None).unwrap_err();
        assert!(matches!(err, Error::DuplicateExternalId(1)));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let graph = HnswGraph::new(3, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        let err = graph.insert(None, v(1.0, 1.0), None).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn s6_hnsw_edges_and_traversal() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        graph.insert(Some(1), v(0.0, 0.0), None).unwrap();
        graph.insert(Some(2), v(1.0, 0.0), None).unwrap();
        graph.insert(Some(3), v(2.0, 0.0), None).unwrap();

        graph.add_edge(1, 2, "refs", 0.5).unwrap();
        graph.add_edge(2, 3, "refs", 0.5).unwrap();

        let mut reached = graph.traverse(1, 2, Some("refs"));
        reached.sort_unstable();
        assert_eq!(reached, vec![1, 2, 3]);

        let mut neighbors = graph.get_neighbors(2, Some("refs"));
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 3]);
    }

    #[test]
    fn add_edge_missing_endpoint_errors() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        graph.insert(Some(1), v(0.0, 0.0), None).unwrap();
        let err = graph.add_edge(1, 99, "refs", 0.1).unwrap_err();
        assert!(matches!(err, Error::DestinationNodeNotFound(99)));
    }

    #[test]
    fn remove_missing_edge_errors() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        graph.insert(Some(1), v(0.0, 0.0), None).unwrap();
        graph.insert(Some(2), v(1.0, 0.0), None).unwrap();
        let err = graph.remove_edge(1, 2, "refs").unwrap_err();
        assert!(matches!(err, Error::EdgeNotFound { .. }));
    }

    #[test]
    fn search_by_type_filters_results() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        let doc_meta = NodeMetadata { node_type: "doc".to_string(), ..Default::default() };
        let img_meta = NodeMetadata { node_type: "image".to_string(), ..Default::default() };
        graph.insert(Some(1), v(0.0, 0.0), Some(doc_meta)).unwrap();
        graph.insert(Some(2), v(0.1, 0.0), Some(img_meta)).unwrap();

        let hits = graph.search_by_type(&v(0.0, 0.0), 5, "doc");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].external_id, 1);
    }

    #[test]
    fn hybrid_search_then_traverse_unions_vector_and_graph_hits() {
        let graph = HnswGraph::new(2, DEFAULT_M, DEFAULT_EF_CONSTRUCTION);
        graph.insert(Some(1), v(0.0, 0.0), None).unwrap();
        graph.insert(Some(2), v(0.1, 0.0), None).unwrap();
        graph.insert(Some(3), v(5.0, 5.0), None).unwrap();
        graph.add_edge(2, 3, "refs", 1.0).unwrap();

        let out = graph.search_then_traverse(&v(0.0, 0.0), 1, Some("refs"), 1);
        assert!(out.contains(&1));
    }
}

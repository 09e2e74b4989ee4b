//! HNSW index file persistence.
//!
//! Version-2 layout: header (magic "HNSW", version), configuration (M,
//! ef_construction, max_level, next_external_id), optional entry point,
//! node_count, dim, then per-node records, then edge_count and per-edge
//! records. Version 1 omits metadata and edges entirely; the loader accepts
//! both.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CResult, Error};
use crate::hnsw::edge::Edge;
use crate::hnsw::graph::HnswGraph;
use crate::hnsw::node::{AttributeValue, HnswNode, NodeMetadata};

const MAGIC: &[u8; 4] = b"HNSW";
const VERSION: u32 = 2;

fn write_option_string(buf: &mut Vec<u8>, value: &Option<String>) -> CResult<()> {
    match value {
        Some(s) => {
            buf.write_u8(1)?;
            write_string(buf, s)?;
        }
        None => buf.write_u8(0)?,
    }
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> CResult<()> {
    let bytes = s.as_bytes();
    buf.write_u32::<LittleEndian>(bytes.len() as u32)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> CResult<String> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn read_option_string(cursor: &mut Cursor<&[u8]>) -> CResult<Option<String>> {
    Ok(if cursor.read_u8()? == 1 { Some(read_string(cursor)?) } else { None })
}

fn write_metadata(buf: &mut Vec<u8>, metadata: &Option<NodeMetadata>) -> CResult<()> {
    match metadata {
        None => buf.write_u8(0)?,
        Some(meta) => {
            buf.write_u8(1)?;
            write_string(buf, &meta.node_type)?;
            write_option_string(buf, &meta.content_ref)?;
            buf.write_i64::<LittleEndian>(meta.timestamp)?;
            buf.write_u32::<LittleEndian>(meta.attributes.len() as u32)?;
            for (key, value) in &meta.attributes {
                write_string(buf, key)?;
                match value {
                    AttributeValue::Bool(b) => {
                        buf.write_u8(0)?;
                        buf.write_u8(*b as u8)?;
                    }
                    AttributeValue::Int(i) => {
                        buf.write_u8(1)?;
                        buf.write_i64::<LittleEndian>(*i)?;
                    }
                    AttributeValue::Float(f) => {
                        buf.write_u8(2)?;
                        buf.write_f64::<LittleEndian>(*f)?;
                    }
                    AttributeValue::Text(t) => {
                        buf.write_u8(3)?;
                        write_string(buf, t)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_metadata(cursor: &mut Cursor<&[u8]>) -> CResult<Option<NodeMetadata>> {
    if cursor.read_u8()? == 0 {
        return Ok(None);
    }
    let node_type = read_string(cursor)?;
    let content_ref = read_option_string(cursor)?;
    let timestamp = cursor.read_i64::<LittleEndian>()?;
    let attr_count = cursor.read_u32::<LittleEndian>()?;
    let mut attributes = std::collections::BTreeMap::new();
    for _ in 0..attr_count {
        let key = read_string(cursor)?;
        let tag = cursor.read_u8()?;
        let value = match tag {
            0 => AttributeValue::Bool(cursor.read_u8()? != 0),
            1 => AttributeValue::Int(cursor.read_i64::<LittleEndian>()?),
            2 => AttributeValue::Float(cursor.read_f64::<LittleEndian>()?),
            3 => AttributeValue::Text(read_string(cursor)?),
            other => return Err(Error::Internal(format!("invalid hnsw attribute tag: {other}"))),
        };
        attributes.insert(key, value);
    }
    Ok(Some(NodeMetadata { node_type, content_ref, timestamp, attributes }))
}

pub fn save(graph: &HnswGraph, path: &Path) -> CResult<()> {
    let shape = graph.snapshot_for_save();
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.write_u32::<LittleEndian>(VERSION)?;
    buf.write_u32::<LittleEndian>(graph.m as u32)?;
    buf.write_u32::<LittleEndian>(graph.ef_construction as u32)?;
    buf.write_u32::<LittleEndian>(shape.nodes.iter().map(|n| n.level).max().unwrap_or(0) as u32)?;
    buf.write_u64::<LittleEndian>(shape.next_external_id)?;
    match shape.entry_point {
        Some(ep) => {
            buf.write_u8(1)?;
            buf.write_u64::<LittleEndian>(ep as u64)?;
        }
        None => buf.write_u8(0)?,
    }
    buf.write_u64::<LittleEndian>(shape.nodes.len() as u64)?;
    buf.write_u32::<LittleEndian>(graph.dim as u32)?;

    for node in &shape.nodes {
        buf.write_u64::<LittleEndian>(node.internal_id as u64)?;
        buf.write_u64::<LittleEndian>(node.external_id)?;
        buf.write_u32::<LittleEndian>(node.level as u32)?;
        for component in &node.point {
            buf.write_f32::<LittleEndian>(*component)?;
        }
        let connections = node.connections.lock().expect("hnsw node mutex poisoned");
        buf.write_u32::<LittleEndian>(connections.len() as u32)?;
        for layer in connections.iter() {
            buf.write_u32::<LittleEndian>(layer.len() as u32)?;
            for id in layer {
                buf.write_u64::<LittleEndian>(*id as u64)?;
            }
        }
        drop(connections);
        write_metadata(&mut buf, &node.metadata_snapshot())?;
    }

    buf.write_u64::<LittleEndian>(shape.edges.len() as u64)?;
    for edge in shape.edges.values() {
        let edge: &Edge = edge;
        buf.write_u64::<LittleEndian>(edge.src)?;
        buf.write_u64::<LittleEndian>(edge.dst)?;
        write_string(&mut buf, &edge.edge_type)?;
        buf.write_f32::<LittleEndian>(edge.weight)?;
    }

    let mut file = std::fs::File::create(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;
    Ok(())
}

struct LoadedNode {
    internal_id: usize,
    external_id: u64,
    level: usize,
    point: Vec<f32>,
    connections: Vec<Vec<usize>>,
    metadata: Option<NodeMetadata>,
}

/// Loads a v1 or v2 HNSW file into a fresh graph. v1 has no metadata or
/// edge sections.
pub fn load(path: &Path) -> CResult<HnswGraph> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    let mut cursor = Cursor::new(bytes.as_slice());

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::InvalidWalMagic);
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != 1 && version != 2 {
        return Err(Error::UnsupportedWalVersion(version));
    }

    let m = cursor.read_u32::<LittleEndian>()? as usize;
    let ef_construction = cursor.read_u32::<LittleEndian>()? as usize;
    let _max_level = cursor.read_u32::<LittleEndian>()?;
    let next_external_id = cursor.read_u64::<LittleEndian>()?;
    let entry_point = if cursor.read_u8()? == 1 { Some(cursor.read_u64::<LittleEndian>()? as usize) } else { None };
    let node_count = cursor.read_u64::<LittleEndian>()?;
    let dim = cursor.read_u32::<LittleEndian>()? as usize;

    let mut loaded_nodes = Vec::with_capacity(node_count as usize);
    for _ in 0..node_count {
        let internal_id = cursor.read_u64::<LittleEndian>()? as usize;
        let external_id = cursor.read_u64::<LittleEndian>()?;
        let level = cursor.read_u32::<LittleEndian>()? as usize;
        let mut point = Vec::with_capacity(dim);
        for _ in 0..dim {
            point.push(cursor.read_f32::<LittleEndian>()?);
        }
        let layer_count = cursor.read_u32::<LittleEndian>()?;
        let mut connections = Vec::with_capacity(layer_count as usize);
        for _ in 0..layer_count {
            let neighbor_count = cursor.read_u32::<LittleEndian>()?;
            let mut layer = Vec::with_capacity(neighbor_count as usize);
            for _ in 0..neighbor_count {
                layer.push(cursor.read_u64::<LittleEndian>()? as usize);
            }
            connections.push(layer);
        }
        let metadata = if version >= 2 { read_metadata(&mut cursor)? } else { None };
        loaded_nodes.push(LoadedNode { internal_id, external_id, level, point, connections, metadata });
    }

    let mut edges = HashMap::new();
    if version >= 2 {
        let edge_count = cursor.read_u64::<LittleEndian>()?;
        for _ in 0..edge_count {
            let src = cursor.read_u64::<LittleEndian>()?;
            let dst = cursor.read_u64::<LittleEndian>()?;
            let edge_type = read_string(&mut cursor)?;
            let weight = cursor.read_f32::<LittleEndian>()?;
            let key = crate::hnsw::edge::edge_key(src, dst, &edge_type);
            edges.insert(key, Edge { src, dst, edge_type, weight });
        }
    }

    let graph = HnswGraph::new(dim, m, ef_construction);
    {
        let mut shape = graph.shape_for_load();
        for loaded in loaded_nodes {
            let node = HnswNode::new(loaded.internal_id, loaded.external_id, loaded.level, loaded.point, loaded.metadata.clone());
            *node.connections.lock().expect("hnsw node mutex poisoned") = loaded.connections;
            shape.external_to_internal.insert(loaded.external_id, loaded.internal_id);
            if let Some(meta) = &loaded.metadata {
                shape.type_index.entry(meta.node_type.clone()).or_default().insert(loaded.external_id);
                if let Some(path) = &meta.content_ref {
                    shape.file_path_index.entry(path.clone()).or_default().insert(loaded.external_id);
                }
            }
            shape.nodes.push(node);
        }
        shape.entry_point = entry_point;
        shape.next_external_id = next_external_id;
        for (key, edge) in edges {
            shape.outgoing.entry(edge.src).or_default().push(key);
            shape.incoming.entry(edge.dst).or_default().push(key);
            shape.edges.insert(key, edge);
        }
    }
    Ok(graph)
}

//! Arena-addressed B+ tree index, used for both primary row storage order
//! and secondary indexes.

mod node;
mod tree;

pub use node::{InternalNode, LeafNode, Node, NodeId, MAX_KEYS, MIN_KEYS, ORDER};
pub use tree::BTree;

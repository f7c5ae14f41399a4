// Path: crates/state/src/tree/avl/node.rs

use isaac_types::app::Hash;

/// Arena index of a node.
pub(crate) type NodeId = usize;

/// A mutable AVL node. Children are arena indices.
#[derive(Debug, Clone)]
pub(crate) struct AvlNode {
    pub(crate) key: Vec<u8>,
    pub(crate) value_hash: Hash,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) height: i32,
    /// Cached node hash; `None` after any structural change below this node.
    pub(crate) hash: Option<Hash>,
}

impl AvlNode {
    pub(crate) fn new_leaf(key: Vec<u8>, value_hash: Hash) -> Self {
        Self {
            key,
            value_hash,
            left: None,
            right: None,
            height: 0,
            hash: None,
        }
    }
}

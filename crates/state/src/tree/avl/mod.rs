// Path: crates/state/src/tree/avl/mod.rs

//! The mutable, arena-backed AVL-hashable tree.
//!
//! Nodes live in a `Vec` and reference their children by index, so rotations
//! never need parent pointers: insertion recurses top-down and every level
//! returns the (possibly rotated) root of its subtree. A node hash is
//! `SHA-256(value_hash ‖ left.hash ‖ right.hash)` and is cached until the
//! node or anything below it changes.
//!
//! [`AvlTreeBuilder::build`] freezes the tree into a [`FixedTree`]. When keys
//! were inserted out of order the builder first rebuilds from the sorted
//! entries, so the root hash depends only on the key set.

mod node;

use isaac_types::app::{FixedTree, FixedTreeNode, Hash};
use isaac_types::error::BlockError;
use node::{AvlNode, NodeId};
use std::cmp::{max, Ordering};

/// Builds an AVL-hashable tree.
#[derive(Debug, Clone, Default)]
pub struct AvlTreeBuilder {
    nodes: Vec<AvlNode>,
    root: Option<NodeId>,
    last_key: Option<Vec<u8>>,
    in_order: bool,
}

impl AvlTreeBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            in_order: true,
            ..Self::default()
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no key was inserted.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts `key`, replacing the value hash of an existing key.
    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value_hash: Hash) -> Result<(), BlockError> {
        let key = key.into();
        if let Some(last) = &self.last_key {
            if key <= *last {
                self.in_order = false;
            }
        }
        if self.last_key.as_ref().map_or(true, |last| key > *last) {
            self.last_key = Some(key.clone());
        }
        self.root = Some(self.insert_at(self.root, key, value_hash)?);
        Ok(())
    }

    /// The value hash stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Hash> {
        let mut cursor = self.root;
        while let Some(node) = cursor.and_then(|i| self.nodes.get(i)) {
            cursor = match key.cmp(node.key.as_slice()) {
                Ordering::Equal => return Some(&node.value_hash),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    fn node(&self, id: NodeId) -> Result<&AvlNode, BlockError> {
        self.nodes
            .get(id)
            .ok_or_else(|| BlockError::Invalid(format!("avl node {id} out of range")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut AvlNode, BlockError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| BlockError::Invalid(format!("avl node {id} out of range")))
    }

    fn height_of(&self, id: Option<NodeId>) -> i32 {
        id.and_then(|i| self.nodes.get(i)).map_or(-1, |n| n.height)
    }

    fn update(&mut self, id: NodeId) -> Result<(), BlockError> {
        let (l, r) = {
            let n = self.node(id)?;
            (n.left, n.right)
        };
        let height = max(self.height_of(l), self.height_of(r)) + 1;
        let n = self.node_mut(id)?;
        n.height = height;
        n.hash = None;
        Ok(())
    }

    fn balance(&self, id: NodeId) -> Result<i32, BlockError> {
        let n = self.node(id)?;
        Ok(self.height_of(n.left) - self.height_of(n.right))
    }

    fn rotate_right(&mut self, id: NodeId) -> Result<NodeId, BlockError> {
        let pivot = self
            .node(id)?
            .left
            .ok_or_else(|| BlockError::Invalid("rotate right without left child".into()))?;
        let moved = self.node(pivot)?.right;
        self.node_mut(id)?.left = moved;
        self.node_mut(pivot)?.right = Some(id);
        self.update(id)?;
        self.update(pivot)?;
        Ok(pivot)
    }

    fn rotate_left(&mut self, id: NodeId) -> Result<NodeId, BlockError> {
        let pivot = self
            .node(id)?
            .right
            .ok_or_else(|| BlockError::Invalid("rotate left without right child".into()))?;
        let moved = self.node(pivot)?.left;
        self.node_mut(id)?.right = moved;
        self.node_mut(pivot)?.left = Some(id);
        self.update(id)?;
        self.update(pivot)?;
        Ok(pivot)
    }

    fn insert_at(
        &mut self,
        at: Option<NodeId>,
        key: Vec<u8>,
        value_hash: Hash,
    ) -> Result<NodeId, BlockError> {
        let Some(id) = at else {
            self.nodes.push(AvlNode::new_leaf(key, value_hash));
            return Ok(self.nodes.len() - 1);
        };
        match key.as_slice().cmp(self.node(id)?.key.as_slice()) {
            Ordering::Equal => {
                let n = self.node_mut(id)?;
                n.value_hash = value_hash;
                n.hash = None;
                return Ok(id);
            }
            Ordering::Less => {
                let left = self.node(id)?.left;
                let child = self.insert_at(left, key.clone(), value_hash)?;
                self.node_mut(id)?.left = Some(child);
            }
            Ordering::Greater => {
                let right = self.node(id)?.right;
                let child = self.insert_at(right, key.clone(), value_hash)?;
                self.node_mut(id)?.right = Some(child);
            }
        }
        self.update(id)?;
        self.rebalance(id, &key)
    }

    fn rebalance(&mut self, id: NodeId, key: &[u8]) -> Result<NodeId, BlockError> {
        let balance = self.balance(id)?;
        if balance > 1 {
            let left = self
                .node(id)?
                .left
                .ok_or_else(|| BlockError::Invalid("left-heavy node without left".into()))?;
            if key > self.node(left)?.key.as_slice() {
                // left-right
                let rotated = self.rotate_left(left)?;
                self.node_mut(id)?.left = Some(rotated);
            }
            return self.rotate_right(id);
        }
        if balance < -1 {
            let right = self
                .node(id)?
                .right
                .ok_or_else(|| BlockError::Invalid("right-heavy node without right".into()))?;
            if key < self.node(right)?.key.as_slice() {
                // right-left
                let rotated = self.rotate_right(right)?;
                self.node_mut(id)?.right = Some(rotated);
            }
            return self.rotate_left(id);
        }
        Ok(id)
    }

    fn hash_of(&mut self, id: NodeId) -> Result<Hash, BlockError> {
        if let Some(h) = &self.node(id)?.hash {
            return Ok(h.clone());
        }
        let (left, right) = {
            let n = self.node(id)?;
            (n.left, n.right)
        };
        let left = left.map(|l| self.hash_of(l)).transpose()?;
        let right = right.map(|r| self.hash_of(r)).transpose()?;
        let n = self.node_mut(id)?;
        let hash = FixedTree::node_hash(&n.value_hash, left.as_ref(), right.as_ref());
        n.hash = Some(hash.clone());
        Ok(hash)
    }

    /// The root hash, `None` when empty.
    pub fn root_hash(&mut self) -> Result<Option<Hash>, BlockError> {
        self.canonicalize()?;
        self.root.map(|r| self.hash_of(r)).transpose()
    }

    fn sorted_entries(&self) -> Vec<(Vec<u8>, Hash)> {
        let mut entries: Vec<(Vec<u8>, Hash)> = self
            .nodes
            .iter()
            .map(|n| (n.key.clone(), n.value_hash.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn canonicalize(&mut self) -> Result<(), BlockError> {
        if self.in_order {
            return Ok(());
        }
        let mut rebuilt = AvlTreeBuilder::new();
        for (key, value_hash) in self.sorted_entries() {
            rebuilt.insert(key, value_hash)?;
        }
        *self = rebuilt;
        Ok(())
    }

    /// Freezes the tree.
    pub fn build(mut self) -> Result<FixedTree, BlockError> {
        self.canonicalize()?;
        if let Some(root) = self.root {
            self.hash_of(root)?;
        }
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| {
                let hash = n
                    .hash
                    .ok_or_else(|| BlockError::Invalid("unreachable avl node".into()))?;
                Ok(FixedTreeNode {
                    key: n.key,
                    value_hash: n.value_hash,
                    hash,
                    left: n.left,
                    right: n.right,
                })
            })
            .collect::<Result<Vec<_>, BlockError>>()?;
        Ok(FixedTree::new(nodes, self.root))
    }

    /// Height of the tree; `-1` when empty.
    pub fn height(&self) -> i32 {
        self.height_of(self.root)
    }
}

#[cfg(test)]
mod tests;

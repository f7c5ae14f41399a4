// Path: crates/types/src/app/tree.rs
//! The immutable, serialized form of an AVL-hashable tree.

use crate::app::Hash;
use crate::error::BlockError;
use crate::hint::{hints, Hint, Hinter};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One node of a [`FixedTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedTreeNode {
    /// The node key.
    #[serde(with = "isaac_crypto::encoding::base58_bytes")]
    pub key: Vec<u8>,
    /// Hash of the stored value.
    pub value_hash: Hash,
    /// `SHA-256(value_hash ‖ left.hash ‖ right.hash)`.
    pub hash: Hash,
    /// Index of the left child.
    pub left: Option<usize>,
    /// Index of the right child.
    pub right: Option<usize>,
}

/// A balanced search tree whose root hash authenticates every node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixedTree {
    nodes: Vec<FixedTreeNode>,
    root: Option<usize>,
}

impl FixedTree {
    /// Wraps already hashed nodes. Use [`FixedTree::verify`] on untrusted input.
    pub fn new(nodes: Vec<FixedTreeNode>, root: Option<usize>) -> Self {
        Self { nodes, root }
    }

    /// The node hash rule.
    pub fn node_hash(value_hash: &Hash, left: Option<&Hash>, right: Option<&Hash>) -> Hash {
        Hash::sha256_concat([
            value_hash.as_bytes(),
            left.map(Hash::as_bytes).unwrap_or_default(),
            right.map(Hash::as_bytes).unwrap_or_default(),
        ])
    }

    /// Every node, in arena order.
    pub fn nodes(&self) -> &[FixedTreeNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The root hash, `None` for an empty tree.
    pub fn root_hash(&self) -> Option<&Hash> {
        self.root
            .and_then(|i| self.nodes.get(i))
            .map(|n| &n.hash)
    }

    /// Looks up `key`.
    pub fn get(&self, key: &[u8]) -> Option<&FixedTreeNode> {
        let mut cursor = self.root;
        while let Some(node) = cursor.and_then(|i| self.nodes.get(i)) {
            cursor = match key.cmp(node.key.as_slice()) {
                Ordering::Equal => return Some(node),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<&[u8]> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.in_order(self.root, &mut |n| out.push(n.key.as_slice()));
        out
    }

    fn in_order<'a>(&'a self, at: Option<usize>, f: &mut impl FnMut(&'a FixedTreeNode)) {
        if let Some(node) = at.and_then(|i| self.nodes.get(i)) {
            self.in_order(node.left, f);
            f(node);
            self.in_order(node.right, f);
        }
    }

    /// Checks that every node is reachable once, keys are ordered and every
    /// hash follows the node hash rule.
    pub fn verify(&self) -> Result<(), BlockError> {
        if self.root.is_none() {
            return if self.nodes.is_empty() {
                Ok(())
            } else {
                Err(BlockError::Invalid("tree nodes without root".into()))
            };
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];
        while let Some(next) = stack.pop() {
            let Some(i) = next else { continue };
            let node = self
                .nodes
                .get(i)
                .ok_or_else(|| BlockError::Invalid(format!("tree index {i} out of range")))?;
            match visited.get_mut(i) {
                Some(seen) if !*seen => *seen = true,
                _ => return Err(BlockError::Invalid(format!("tree node {i} visited twice"))),
            }
            let child_hash = |c: Option<usize>| -> Result<Option<&Hash>, BlockError> {
                match c {
                    None => Ok(None),
                    Some(j) => self
                        .nodes
                        .get(j)
                        .map(|n| Some(&n.hash))
                        .ok_or_else(|| BlockError::Invalid(format!("tree index {j} out of range"))),
                }
            };
            let expected = Self::node_hash(&node.value_hash, child_hash(node.left)?, child_hash(node.right)?);
            if expected != node.hash {
                return Err(BlockError::Invalid(format!("tree node {i} hash mismatch")));
            }
            stack.push(node.left);
            stack.push(node.right);
        }
        if visited.iter().any(|v| !v) {
            return Err(BlockError::Invalid("unreachable tree nodes".into()));
        }
        let keys = self.keys();
        if keys.windows(2).any(|w| matches!(w, [a, b] if a >= b)) {
            return Err(BlockError::Invalid("tree keys out of order".into()));
        }
        Ok(())
    }
}

impl Hinter for FixedTree {
    fn hint(&self) -> Hint {
        hints::FIXED_TREE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: &[u8]) -> FixedTreeNode {
        let value_hash = Hash::sha256(key);
        FixedTreeNode {
            key: key.to_vec(),
            hash: FixedTree::node_hash(&value_hash, None, None),
            value_hash,
            left: None,
            right: None,
        }
    }

    fn three() -> FixedTree {
        let a = leaf(b"a");
        let c = leaf(b"c");
        let value_hash = Hash::sha256(b"b");
        let b = FixedTreeNode {
            key: b"b".to_vec(),
            hash: FixedTree::node_hash(&value_hash, Some(&a.hash), Some(&c.hash)),
            value_hash,
            left: Some(1),
            right: Some(2),
        };
        FixedTree::new(vec![b, a, c], Some(0))
    }

    #[test]
    fn test_verify_and_lookup() {
        let tree = three();
        assert!(tree.verify().is_ok());
        assert_eq!(tree.keys(), vec![b"a".as_slice(), b"b", b"c"]);
        assert!(tree.get(b"c").is_some());
        assert!(tree.get(b"d").is_none());
        assert!(FixedTree::default().verify().is_ok());
        assert!(FixedTree::default().root_hash().is_none());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut tree = three();
        if let Some(n) = tree.nodes.get_mut(2) {
            n.value_hash = Hash::sha256(b"x");
        }
        assert!(tree.verify().is_err());

        let mut tree = three();
        tree.nodes.swap(1, 2);
        assert!(tree.verify().is_err());
    }
}

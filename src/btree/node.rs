//! B+ tree nodes and their arena.
//!
//! Nodes reference children and siblings by arena index, never by
//! pointer. The arena is push-only and hands out `Arc` clones under a
//! short shared lock, so growing it can never invalidate a reference
//! another thread is still using. Nodes are allocated by splits and never
//! freed.

use std::sync::Arc;

use parking_lot::{lock_api, RawRwLock, RwLock};

/// Stable identity of a node within its tree.
pub(crate) type NodeId = usize;

/// Owned lock guards: they keep their node's `Arc` alive, which lets a
/// descent carry locks across loop iterations (hand-over-hand) without
/// borrowing from a local.
pub(crate) type NodeReadGuard = lock_api::ArcRwLockReadGuard<RawRwLock, NodeData>;
pub(crate) type NodeWriteGuard = lock_api::ArcRwLockWriteGuard<RawRwLock, NodeData>;

pub(crate) type Node = RwLock<NodeData>;

pub(crate) enum NodeData {
    Internal(Internal),
    Leaf(Leaf),
}

/// `children[i]` holds keys strictly below `keys[i]`; `children[i + 1]`
/// holds keys at or above it.
pub(crate) struct Internal {
    pub keys: Vec<u64>,
    pub children: Vec<NodeId>,
}

impl Internal {
    /// Index of the child responsible for `key`. Equal keys go right.
    pub fn child_slot(&self, key: u64) -> usize {
        self.keys.partition_point(|&k| key >= k)
    }
}

/// Records sorted by strictly increasing key; `next` links the leaves
/// into a singly linked list in key order.
pub(crate) struct Leaf {
    pub keys: Vec<u64>,
    pub values: Vec<Vec<u8>>,
    pub next: Option<NodeId>,
}

impl Leaf {
    pub fn get(&self, key: u64) -> Option<Vec<u8>> {
        self.keys
            .binary_search(&key)
            .ok()
            .map(|i| self.values[i].clone())
    }
}

/// Push-only node storage.
pub(crate) struct NodeArena {
    nodes: RwLock<Vec<Arc<Node>>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn alloc(&self, data: NodeData) -> NodeId {
        let mut nodes = self.nodes.write();
        nodes.push(Arc::new(RwLock::new(data)));
        nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes.read()[id])
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }
}

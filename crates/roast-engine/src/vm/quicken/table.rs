//! Quick-node arena and the `SLIM_QUICK` offset index
//!
//! Nodes are appended to one arena; a `QUICK` site embeds its arena index in
//! the two bytes after the tag, a `SLIM_QUICK` site (1-byte array opcodes) is
//! found through a sparse `bci -> index` map. Entries are `Arc`s so a reader
//! keeps its node alive while a generification swaps the slot.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::vm::defaults::MAX_QUICK_NODES;
use crate::vm::quicken::QuickNode;

/// Quick nodes of one method version
#[derive(Default)]
pub struct QuickTable {
    arena: RwLock<Vec<Arc<QuickNode>>>,
    slim: RwLock<FxHashMap<u32, usize>>,
}

impl QuickTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Node at arena `index`
    #[inline]
    pub fn get(&self, index: usize) -> Option<Arc<QuickNode>> {
        self.arena.read().get(index).cloned()
    }

    /// Arena index of the `SLIM_QUICK` site at `bci`
    #[inline]
    pub fn slim_index(&self, bci: u32) -> Option<usize> {
        self.slim.read().get(&bci).copied()
    }

    /// Node of the `SLIM_QUICK` site at `bci`
    #[inline]
    pub fn get_slim(&self, bci: u32) -> Option<Arc<QuickNode>> {
        self.get(self.slim_index(bci)?)
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    /// Whether no node was ever installed
    pub fn is_empty(&self) -> bool {
        self.arena.read().is_empty()
    }

    /// Append a node; `None` when the arena is full
    ///
    /// Callers hold the section lock.
    pub(crate) fn push(&self, node: Arc<QuickNode>) -> Option<usize> {
        let mut arena = self.arena.write();
        if arena.len() >= MAX_QUICK_NODES {
            return None;
        }
        arena.push(node);
        Some(arena.len() - 1)
    }

    /// Map a `SLIM_QUICK` site to its arena index
    ///
    /// Callers hold the section lock.
    pub(crate) fn index_slim(&self, bci: u32, index: usize) {
        self.slim.write().insert(bci, index);
    }

    /// Swap the node at `index`
    ///
    /// Callers hold the section lock.
    pub(crate) fn replace(&self, index: usize, node: Arc<QuickNode>) {
        if let Some(slot) = self.arena.write().get_mut(index) {
            *slot = node;
        }
    }
}

impl std::fmt::Debug for QuickTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickTable")
            .field("nodes", &self.len())
            .field("slim_sites", &self.slim.read().len())
            .finish()
    }
}

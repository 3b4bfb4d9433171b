//! Per-level SSTable collections.
//!
//! Level 0 holds runs in flush order (id ascending) and its tables may
//! overlap in key range. Levels 1 and deeper are kept sorted by
//! `(min_key, id)` and are pairwise non-overlapping by construction,
//! which lets the read path stop a level scan as soon as a table starts
//! past the probe key.

use std::sync::Arc;

use super::sstable::SSTable;

pub struct Level {
    pub level_num: usize,
    pub sstables: Vec<Arc<SSTable>>,
}

impl Level {
    pub fn new(level_num: usize) -> Self {
        Self {
            level_num,
            sstables: Vec::new(),
        }
    }

    /// Total entries across the level's tables, the quantity level
    /// capacities are expressed in.
    pub fn entry_count(&self) -> usize {
        self.sstables.iter().map(|t| t.entry_count()).sum()
    }

    pub fn table_count(&self) -> usize {
        self.sstables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sstables.is_empty()
    }

    pub fn add_sstable(&mut self, sstable: Arc<SSTable>) {
        self.sstables.push(sstable);
    }

    /// L0 order: flush order, oldest first.
    pub fn sort_by_id(&mut self) {
        self.sstables.sort_by_key(|t| t.id);
    }

    /// L1+ order: ascending min key, id as tie-break.
    pub fn sort_by_min_key(&mut self) {
        self.sstables.sort_by_key(|t| (t.min_key, t.id));
    }

    /// Tables whose key range intersects `[min_key, max_key]`.
    pub fn overlapping(&self, min_key: u64, max_key: u64) -> Vec<Arc<SSTable>> {
        self.sstables
            .iter()
            .filter(|t| t.min_key <= max_key && t.max_key >= min_key)
            .cloned()
            .collect()
    }
}

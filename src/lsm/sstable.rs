//! Immutable sorted runs.
//!
//! An SSTable is built once, from a memtable snapshot or a compaction
//! merge, and never mutated afterwards, so it is shared by `Arc` and read
//! without locks. Point lookups run a filter pipeline before the data:
//! key-range check, optional learned-index prediction, then the Bloom
//! filter. Neither filter may produce a false negative.

use super::bloom::BlockedBloomFilter;
use super::learned::LearnedIndex;
use crate::config::LsmConfig;
use crate::lsm::memtable::Memtable;

pub struct SSTable {
    /// Monotonically increasing across the tree; larger means younger.
    pub id: u64,
    pub min_key: u64,
    pub max_key: u64,
    /// Sorted by key; `None` values are tombstones carried down until a
    /// bottom-level compaction erases them.
    entries: Vec<(u64, Option<Vec<u8>>)>,
    bloom: BlockedBloomFilter,
    learned: Option<LearnedIndex>,
    aggressive_filtering: bool,
}

impl SSTable {
    /// Builds a table from entries already sorted by key. Returns `None`
    /// for an empty input: an empty run has no key range and is never
    /// installed.
    pub fn from_sorted_entries(
        id: u64,
        entries: Vec<(u64, Option<Vec<u8>>)>,
        config: &LsmConfig,
    ) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));

        let min_key = entries[0].0;
        let max_key = entries[entries.len() - 1].0;

        let bloom = BlockedBloomFilter::default();
        for (key, _) in &entries {
            bloom.insert(*key);
        }

        let learned = if config.learned_index {
            let keys: Vec<u64> = entries.iter().map(|e| e.0).collect();
            LearnedIndex::train(&keys)
        } else {
            None
        };

        Some(Self {
            id,
            min_key,
            max_key,
            entries,
            bloom,
            learned,
            aggressive_filtering: config.aggressive_filtering,
        })
    }

    /// Builds an L0 table from a rotated memtable.
    pub fn from_memtable(id: u64, memtable: &Memtable, config: &LsmConfig) -> Option<Self> {
        Self::from_sorted_entries(id, memtable.sorted_entries(), config)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// All entries in key order, tombstones included. Compaction reads
    /// tables through this.
    pub fn entries(&self) -> &[(u64, Option<Vec<u8>>)] {
        &self.entries
    }

    /// Tri-state point lookup: `None` = not in this table, `Some(None)` =
    /// deleted here, `Some(Some(v))` = stored here.
    pub fn find_key(&self, key: u64) -> Option<Option<Vec<u8>>> {
        if key < self.min_key || key > self.max_key {
            return None;
        }

        // The learned index narrows the search window when it can; an
        // empty prediction proves absence only under aggressive filtering,
        // otherwise we fall through and let the Bloom filter decide.
        let mut window = 0..self.entries.len();
        if let Some(learned) = &self.learned {
            if key >= learned.min_key() && key <= learned.max_key() {
                let range = learned.predict(key);
                if range.is_empty() {
                    if self.aggressive_filtering {
                        return None;
                    }
                } else {
                    window = range.min..range.max + 1;
                }
            }
        }

        if !self.bloom.query(key) {
            return None;
        }

        self.entries[window.clone()]
            .binary_search_by_key(&key, |e| e.0)
            .ok()
            .map(|i| self.entries[window.start + i].1.clone())
    }
}

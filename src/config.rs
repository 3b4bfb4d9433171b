use crate::errconfig;
use crate::error::Result;

/// Configuration for the LSM engine.
#[derive(Debug, Clone)]
pub struct LsmConfig {
    /// Entry count at which the active memtable is rotated (default: 1000)
    pub memtable_max_entries: usize,

    /// L0 SSTable count that triggers compaction (default: 4)
    pub max_l0_sstables: usize,

    /// Number of levels, L0 included (default: 4)
    pub max_levels: usize,

    /// Capacity growth factor between adjacent levels (default: 10)
    pub level_multiplier: usize,

    /// Target entries per SSTable produced by compaction (default: 256)
    pub sstable_target_entries: usize,

    /// Train a learned index per SSTable (default: false)
    pub learned_index: bool,

    /// Treat an empty learned-index prediction as a definite miss
    /// (default: false)
    pub aggressive_filtering: bool,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            memtable_max_entries: 1000,
            max_l0_sstables: 4,
            max_levels: 4,
            level_multiplier: 10,
            sstable_target_entries: 256,
            learned_index: false,
            aggressive_filtering: false,
        }
    }
}

impl LsmConfig {
    /// Set the memtable rotation threshold
    pub fn memtable_max_entries(mut self, entries: usize) -> Self {
        self.memtable_max_entries = entries;
        self
    }

    /// Set the L0 SSTable count threshold
    pub fn max_l0_sstables(mut self, count: usize) -> Self {
        self.max_l0_sstables = count;
        self
    }

    /// Set the number of levels
    pub fn max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    /// Set the per-level capacity multiplier
    pub fn level_multiplier(mut self, multiplier: usize) -> Self {
        self.level_multiplier = multiplier;
        self
    }

    /// Set the target SSTable entry count
    pub fn sstable_target_entries(mut self, entries: usize) -> Self {
        self.sstable_target_entries = entries;
        self
    }

    /// Enable the per-SSTable learned index
    pub fn learned_index(mut self, enabled: bool) -> Self {
        self.learned_index = enabled;
        self
    }

    /// Enable aggressive learned-index filtering
    pub fn aggressive_filtering(mut self, enabled: bool) -> Self {
        self.aggressive_filtering = enabled;
        self
    }

    /// Maximum entry count for a level before it overflows into the next.
    ///
    /// `cap(0) = max_l0_sstables * sstable_target_entries`, then each level
    /// multiplies the previous one's capacity.
    pub fn level_capacity(&self, level: usize) -> usize {
        let mut capacity = self.max_l0_sstables * self.sstable_target_entries;
        for _ in 0..level {
            capacity *= self.level_multiplier;
        }
        capacity
    }

    pub fn validate(&self) -> Result<()> {
        if self.memtable_max_entries == 0 {
            return Err(errconfig!("memtable_max_entries must be at least 1"));
        }
        if self.max_l0_sstables == 0 {
            return Err(errconfig!("max_l0_sstables must be at least 1"));
        }
        if self.max_levels == 0 {
            return Err(errconfig!("max_levels must be at least 1"));
        }
        if self.level_multiplier == 0 {
            return Err(errconfig!("level_multiplier must be at least 1"));
        }
        if self.sstable_target_entries == 0 {
            return Err(errconfig!("sstable_target_entries must be at least 1"));
        }
        Ok(())
    }
}

/// Configuration for the B+ tree engine.
#[derive(Debug, Clone)]
pub struct BTreeConfig {
    /// Maximum keys per internal node (default: 120)
    pub keys_per_internal: usize,

    /// Maximum records per leaf node (default: 30)
    pub keys_per_leaf: usize,

    /// Hard cap on records returned by a range scan (default: 1000)
    pub max_range_results: usize,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self {
            keys_per_internal: 120,
            keys_per_leaf: 30,
            max_range_results: 1000,
        }
    }
}

impl BTreeConfig {
    /// Set the internal-node fan-out
    pub fn keys_per_internal(mut self, keys: usize) -> Self {
        self.keys_per_internal = keys;
        self
    }

    /// Set the leaf-node record capacity
    pub fn keys_per_leaf(mut self, keys: usize) -> Self {
        self.keys_per_leaf = keys;
        self
    }

    /// Set the range-scan result cap
    pub fn max_range_results(mut self, results: usize) -> Self {
        self.max_range_results = results;
        self
    }

    pub fn validate(&self) -> Result<()> {
        // A split of keys_per_internal + 1 keys must leave at least one key
        // on each side of the promoted middle.
        if self.keys_per_internal < 2 {
            return Err(errconfig!("keys_per_internal must be at least 2"));
        }
        if self.keys_per_leaf < 2 {
            return Err(errconfig!("keys_per_leaf must be at least 2"));
        }
        if self.max_range_results == 0 {
            return Err(errconfig!("max_range_results must be at least 1"));
        }
        Ok(())
    }
}

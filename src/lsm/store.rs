//! The LSM tree: write path, read path and worker lifecycle.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::LsmConfig;
use crate::engine::{KvEngine, MAX_VALUE_LEN};
use crate::error::Result;

use super::memtable::Memtable;
use super::state::{LsmState, LsmStats};
use super::{compaction, flush};

/// Concurrent in-memory LSM tree.
///
/// Writes land in the active memtable and migrate through the immutable
/// queue into L0 and deeper levels, driven by the two background workers
/// spawned at construction. Dropping the tree shuts the workers down and
/// drains every buffered entry into L0.
pub struct LsmTree {
    config: LsmConfig,
    state: Arc<LsmState>,
    flush_worker: Option<JoinHandle<()>>,
    compaction_worker: Option<JoinHandle<()>>,
}

impl LsmTree {
    /// Creates a tree with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(LsmConfig::default())
    }

    pub fn with_config(config: LsmConfig) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(LsmState::new(config.max_levels));

        let flush_worker = {
            let state = Arc::clone(&state);
            let config = config.clone();
            std::thread::Builder::new()
                .name("lsm-flush".into())
                .spawn(move || flush::worker_loop(state, config))?
        };
        let compaction_worker = {
            let state = Arc::clone(&state);
            let config = config.clone();
            std::thread::Builder::new()
                .name("lsm-compaction".into())
                .spawn(move || compaction::worker_loop(state, config))?
        };

        Ok(Self {
            config,
            state,
            flush_worker: Some(flush_worker),
            compaction_worker: Some(compaction_worker),
        })
    }

    /// Inserts or updates a key.
    pub fn put(&self, key: u64, value: &[u8]) {
        debug_assert!(value.len() <= MAX_VALUE_LEN);
        self.write(key, Some(value.to_vec()));
    }

    /// Deletes a key by writing a tombstone over it.
    pub fn delete(&self, key: u64) {
        self.write(key, None);
    }

    fn write(&self, key: u64, value: Option<Vec<u8>>) {
        let full = {
            let active = self.state.active.read();
            active.put(key, value);
            active.len() >= self.config.memtable_max_entries
        };
        if full {
            self.rotate_if_full();
        }
    }

    /// Point lookup walking active memtable, immutable queue (newest
    /// first), L0 (newest first) and the deeper levels in min-key order.
    /// A tombstone anywhere along the way hides everything older.
    pub fn get(&self, key: u64) -> Option<Vec<u8>> {
        let active = self.state.active.read().clone();
        if let Some(outcome) = active.get(key) {
            return outcome;
        }

        let immutables: Vec<Arc<Memtable>> = {
            let queue = self.state.immutables.lock();
            queue.iter().rev().cloned().collect()
        };
        for memtable in immutables {
            if let Some(outcome) = memtable.get(key) {
                return outcome;
            }
        }

        // One shared acquisition covers L0 and the deeper levels, so a
        // compaction commit can never be observed halfway.
        let levels = self.state.levels.read();
        if let Some(level0) = levels.first() {
            for table in level0.sstables.iter().rev() {
                if let Some(outcome) = table.find_key(key) {
                    return outcome;
                }
            }
        }
        for level in levels.iter().skip(1) {
            for table in &level.sstables {
                if key < table.min_key {
                    // Non-overlapping and sorted by min key: the key
                    // cannot be in any later table of this level.
                    break;
                }
                if let Some(outcome) = table.find_key(key) {
                    return outcome;
                }
            }
        }
        None
    }

    /// Swaps in a fresh active memtable if the current one still exceeds
    /// the threshold by the time the exclusive lock is held.
    fn rotate_if_full(&self) {
        let rotated = {
            let mut active = self.state.active.write();
            if active.len() < self.config.memtable_max_entries {
                return;
            }
            std::mem::replace(&mut *active, Arc::new(Memtable::new()))
        };
        self.enqueue_immutable(rotated);
    }

    /// Unconditionally rotates a non-empty active memtable into the
    /// immutable queue. Exposed for tests and used by the shutdown drain.
    pub fn rotate_active_memtable(&self) {
        let rotated = {
            let mut active = self.state.active.write();
            if active.is_empty() {
                return;
            }
            std::mem::replace(&mut *active, Arc::new(Memtable::new()))
        };
        self.enqueue_immutable(rotated);
    }

    fn enqueue_immutable(&self, memtable: Arc<Memtable>) {
        let mut queue = self.state.immutables.lock();
        queue.push_back(memtable);
        self.state.immutable_cv.notify_one();
    }

    /// Flushes the oldest queued memtable, bypassing the worker. Returns
    /// false when the queue is empty.
    pub fn flush_memtable(&self) -> bool {
        let flushed = flush::flush_one(&self.state, &self.config);
        if flushed {
            self.state.signal_compaction();
        }
        flushed
    }

    /// Runs one compaction check, bypassing the worker.
    pub fn compact(&self) {
        compaction::compact(&self.state, &self.config);
    }

    pub fn stats(&self) -> LsmStats {
        self.state.stats()
    }
}

impl Drop for LsmTree {
    fn drop(&mut self) {
        self.state.request_shutdown();
        // Take each worker's mutex before notifying so the wakeup cannot
        // slip between a predicate check and the wait.
        drop(self.state.immutables.lock());
        self.state.immutable_cv.notify_all();
        drop(self.state.compaction_signal.lock());
        self.state.compaction_cv.notify_all();

        if let Some(worker) = self.flush_worker.take() {
            let _ = worker.join();
        }
        if let Some(worker) = self.compaction_worker.take() {
            let _ = worker.join();
        }

        // Drain whatever is still buffered straight into L0. No
        // compaction at shutdown.
        let active = {
            let mut active = self.state.active.write();
            std::mem::replace(&mut *active, Arc::new(Memtable::new()))
        };
        if !active.is_empty() {
            self.state.immutables.lock().push_back(active);
        }
        while flush::flush_one(&self.state, &self.config) {}

        let stats = self.state.stats();
        tracing::debug!(
            sstables = stats.total_sstable_count(),
            "lsm tree shut down"
        );
    }
}

impl KvEngine for LsmTree {
    fn put(&self, key: u64, value: &[u8]) {
        LsmTree::put(self, key, value);
    }

    fn get(&self, key: u64) -> Option<Vec<u8>> {
        LsmTree::get(self, key)
    }
}

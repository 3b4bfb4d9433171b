//! In-memory write buffer backed by a concurrent skip list.
//!
//! The skip list gives lock-free concurrent reads, ordered iteration for
//! flushing, and safe iteration concurrent with inserts. A memtable is
//! either *active* (the one writers insert into) or queued immutable for
//! flush; the rotation swap guarantees a queued memtable is never written
//! again, so no freeze flag is needed.
//!
//! Deletions are tombstones: the value slot holds `Option<Vec<u8>>` and
//! `None` marks a deleted key. Lookups are tri-state so callers can tell
//! "deleted here" from "not present here".

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct Memtable {
    data: SkipMap<u64, Option<Vec<u8>>>,
    /// Entry count kept alongside the map; approximate under racing
    /// overwrites of the same key, which only ever delays rotation by a
    /// few entries.
    entries: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            entries: AtomicUsize::new(0),
        }
    }

    /// Inserts or updates a key. A `None` value records a tombstone.
    pub fn put(&self, key: u64, value: Option<Vec<u8>>) {
        let fresh = !self.data.contains_key(&key);
        self.data.insert(key, value);
        if fresh {
            self.entries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Marks a key deleted.
    pub fn delete(&self, key: u64) {
        self.put(key, None);
    }

    /// Tri-state lookup: `None` = key not present here, `Some(None)` =
    /// tombstone, `Some(Some(v))` = live value.
    pub fn get(&self, key: u64) -> Option<Option<Vec<u8>>> {
        self.data.get(&key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries in ascending key order, tombstones
    /// included. Safe to call while other threads still insert; the flush
    /// path only calls it once the memtable has left the active slot.
    pub fn sorted_entries(&self) -> Vec<(u64, Option<Vec<u8>>)> {
        self.data
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

//! Shared mutable state for the LSM tree with fine-grained locking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use super::level::Level;
use super::memtable::Memtable;

/// All mutable state shared between the writers, the readers and the two
/// background workers.
///
/// Lock roles:
/// - `active`: rwlock; shared for inserts, exclusive only for rotation.
/// - `immutables` + `immutable_cv`: the flush worker's queue.
/// - `levels`: rwlock over the level metadata; every compaction or flush
///   commit is a single exclusive-section transition, so a reader holding
///   the shared lock sees one consistent snapshot.
/// - `compaction_signal` + `compaction_cv`: wakes the compaction worker.
pub struct LsmState {
    pub active: RwLock<Arc<Memtable>>,
    pub immutables: Mutex<VecDeque<Arc<Memtable>>>,
    pub immutable_cv: Condvar,

    pub levels: RwLock<Vec<Level>>,

    /// Serializes flushers (the worker, manual flushes, the shutdown
    /// drain) so no two of them can consume the same queue head.
    pub flush_serial: Mutex<()>,

    pub compaction_signal: Mutex<()>,
    pub compaction_cv: Condvar,

    next_sstable_id: AtomicU64,
    shutdown: AtomicBool,
}

impl LsmState {
    pub fn new(max_levels: usize) -> Self {
        Self {
            active: RwLock::new(Arc::new(Memtable::new())),
            immutables: Mutex::new(VecDeque::new()),
            immutable_cv: Condvar::new(),
            levels: RwLock::new((0..max_levels).map(Level::new).collect()),
            flush_serial: Mutex::new(()),
            compaction_signal: Mutex::new(()),
            compaction_cv: Condvar::new(),
            next_sstable_id: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Claims the next SSTable id; larger ids are younger tables.
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wakes the compaction worker to re-evaluate its trigger predicate.
    pub fn signal_compaction(&self) {
        // Touch the worker's mutex so the notify cannot race between its
        // predicate check and its wait.
        drop(self.compaction_signal.lock());
        self.compaction_cv.notify_one();
    }

    /// Occupancy snapshot for tests, logging and the stats API.
    pub fn stats(&self) -> LsmStats {
        let active_entries = self.active.read().len();
        let immutable_count = self.immutables.lock().len();
        let levels = self.levels.read();
        LsmStats {
            active_entries,
            immutable_count,
            level_tables: levels.iter().map(|l| l.table_count()).collect(),
            level_entries: levels.iter().map(|l| l.entry_count()).collect(),
            next_sstable_id: self.next_sstable_id.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time occupancy of the tree.
#[derive(Debug, Clone)]
pub struct LsmStats {
    pub active_entries: usize,
    pub immutable_count: usize,
    pub level_tables: Vec<usize>,
    pub level_entries: Vec<usize>,
    pub next_sstable_id: u64,
}

impl LsmStats {
    pub fn total_sstable_count(&self) -> usize {
        self.level_tables.iter().sum()
    }
}

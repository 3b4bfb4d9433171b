//! Flush worker: converts queued immutable memtables into L0 SSTables.

use std::sync::Arc;

use crate::config::LsmConfig;

use super::memtable::Memtable;
use super::sstable::SSTable;
use super::state::LsmState;

/// Background loop driven by the immutable-queue condition variable.
/// On shutdown the loop keeps flushing until the queue is empty.
pub(crate) fn worker_loop(state: Arc<LsmState>, config: LsmConfig) {
    tracing::debug!("flush worker started");
    loop {
        {
            let mut queue = state.immutables.lock();
            while queue.is_empty() && !state.is_shutdown() {
                state.immutable_cv.wait(&mut queue);
            }
            if queue.is_empty() {
                break;
            }
        }
        if flush_one(&state, &config) {
            state.signal_compaction();
        }
    }
    tracing::debug!("flush worker stopped");
}

/// Flushes the oldest queued memtable, if any, without blocking on the
/// condition variable. Used by the worker, the shutdown drain and tests
/// that want deterministic flushes.
///
/// The queue entry is only popped after its SSTable is installed in L0,
/// so a reader always finds in-flight data in either the queue or the
/// levels (briefly both, which is harmless: the copies are identical and
/// the queue is consulted first). `flush_serial` keeps two flushers from
/// consuming the same queue head.
pub(crate) fn flush_one(state: &LsmState, config: &LsmConfig) -> bool {
    let _serial = state.flush_serial.lock();
    let memtable = match state.immutables.lock().front() {
        Some(memtable) => Arc::clone(memtable),
        None => return false,
    };
    flush_to_l0(state, config, &memtable);
    state.immutables.lock().pop_front();
    true
}

fn flush_to_l0(state: &LsmState, config: &LsmConfig, memtable: &Memtable) {
    if memtable.is_empty() {
        return;
    }
    let id = state.next_sstable_id();
    let Some(table) = SSTable::from_memtable(id, memtable, config) else {
        return;
    };
    let entries = table.entry_count();

    let mut levels = state.levels.write();
    levels[0].add_sstable(Arc::new(table));
    levels[0].sort_by_id();
    drop(levels);

    tracing::debug!(table_id = id, entries, "flushed memtable to L0");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_memtable(state: &LsmState, entries: &[(u64, Option<Vec<u8>>)]) {
        let memtable = Memtable::new();
        for (key, value) in entries {
            memtable.put(*key, value.clone());
        }
        state.immutables.lock().push_back(Arc::new(memtable));
    }

    #[test]
    fn test_flush_one_installs_into_l0() {
        let config = LsmConfig::default();
        let state = LsmState::new(config.max_levels);
        queued_memtable(&state, &[(1, Some(b"a".to_vec())), (2, Some(b"b".to_vec()))]);

        assert!(flush_one(&state, &config));

        let stats = state.stats();
        assert_eq!(stats.immutable_count, 0);
        assert_eq!(stats.level_tables[0], 1);
        assert_eq!(stats.level_entries[0], 2);
    }

    #[test]
    fn test_flush_one_empty_queue() {
        let config = LsmConfig::default();
        let state = LsmState::new(config.max_levels);
        assert!(!flush_one(&state, &config));
    }

    #[test]
    fn test_flush_preserves_queue_order() {
        let config = LsmConfig::default();
        let state = LsmState::new(config.max_levels);
        queued_memtable(&state, &[(1, Some(b"old".to_vec()))]);
        queued_memtable(&state, &[(1, Some(b"new".to_vec()))]);

        assert!(flush_one(&state, &config));
        assert!(flush_one(&state, &config));

        // Oldest memtable flushed first, so the younger table carries the
        // newer value and the larger id.
        let levels = state.levels.read();
        assert_eq!(levels[0].table_count(), 2);
        let ids: Vec<u64> = levels[0].sstables.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(
            levels[0].sstables[1].find_key(1),
            Some(Some(b"new".to_vec()))
        );
    }

    #[test]
    fn test_empty_memtable_flushes_no_table() {
        let config = LsmConfig::default();
        let state = LsmState::new(config.max_levels);
        state
            .immutables
            .lock()
            .push_back(Arc::new(Memtable::new()));

        assert!(flush_one(&state, &config));
        assert_eq!(state.stats().level_tables[0], 0);
    }
}

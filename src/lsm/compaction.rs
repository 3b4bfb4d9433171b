//! Compaction worker: merges an overflowing level into the next one.
//!
//! The policy is deliberately coarse (the whole source level plus the
//! overlapping slice of the target level), which keeps the commit a
//! single swap: remove inputs, insert outputs, re-sort the target.
//! Two ordering rules are load-bearing:
//! - inputs are merged oldest-first (target level, then source tables by
//!   ascending id) so last-writer-wins survives overlapping L0 runs;
//! - tombstones are erased only when the target is the bottom level,
//!   since a shallower erase could resurrect older versions that live
//!   below the levels taking part in this compaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::config::LsmConfig;

use super::sstable::SSTable;
use super::state::LsmState;

/// Background loop driven by the compaction condition variable.
pub(crate) fn worker_loop(state: Arc<LsmState>, config: LsmConfig) {
    tracing::debug!("compaction worker started");
    loop {
        {
            let mut signal = state.compaction_signal.lock();
            while !state.is_shutdown() && find_compaction_source(&state, &config).is_none() {
                state.compaction_cv.wait(&mut signal);
            }
        }
        if state.is_shutdown() {
            break;
        }
        compact(&state, &config);
    }
    tracing::debug!("compaction worker stopped");
}

/// Picks the level to compact, or `None` when nothing overflows.
///
/// L0 overflows by table count, every non-bottom level by total entries
/// against `LsmConfig::level_capacity`. The bottom level never cascades.
pub(crate) fn find_compaction_source(state: &LsmState, config: &LsmConfig) -> Option<usize> {
    if config.max_levels < 2 {
        return None;
    }
    let levels = state.levels.read();
    if levels[0].table_count() > config.max_l0_sstables {
        return Some(0);
    }
    (0..config.max_levels - 1).find(|&i| levels[i].entry_count() > config.level_capacity(i))
}

/// Runs one compaction if a level overflows.
pub(crate) fn compact(state: &LsmState, config: &LsmConfig) {
    let Some(source_level) = find_compaction_source(state, config) else {
        return;
    };
    let target_level = source_level + 1;

    // Snapshot the inputs under the shared lock; the merge below runs
    // without any lock held. Tables flushed into the source level in the
    // meantime are untouched by the commit, which removes by id.
    let (source_tables, target_tables) = {
        let levels = state.levels.read();
        let mut source = levels[source_level].sstables.clone();
        if source.is_empty() {
            return;
        }
        source.sort_by_key(|t| t.id);
        let (min_key, max_key) = source
            .iter()
            .fold((u64::MAX, u64::MIN), |(lo, hi), table| {
                (lo.min(table.min_key), hi.max(table.max_key))
            });
        (source, levels[target_level].overlapping(min_key, max_key))
    };

    let source_ids: Vec<u64> = source_tables.iter().map(|t| t.id).collect();
    let target_ids: Vec<u64> = target_tables.iter().map(|t| t.id).collect();

    tracing::info!(
        source_level,
        target_level,
        source_tables = source_ids.len(),
        overlapping_tables = target_ids.len(),
        "starting compaction"
    );

    // Oldest data first: target level, then source tables young-id last.
    let mut merged: BTreeMap<u64, Option<Vec<u8>>> = BTreeMap::new();
    for table in target_tables.iter().chain(source_tables.iter()) {
        for (key, value) in table.entries() {
            merged.insert(*key, value.clone());
        }
    }

    let bottom_level = target_level == config.max_levels - 1;
    if bottom_level {
        merged.retain(|_, value| value.is_some());
    }
    let entries_merged = merged.len();

    // Partition in key order into target-size runs; sorted chunking is
    // what keeps deeper levels pairwise non-overlapping.
    let mut new_tables = Vec::new();
    for chunk in &merged.into_iter().chunks(config.sstable_target_entries) {
        let entries: Vec<_> = chunk.collect();
        let id = state.next_sstable_id();
        if let Some(table) = SSTable::from_sorted_entries(id, entries, config) {
            new_tables.push(Arc::new(table));
        }
    }

    // Commit as one exclusive transition over the level metadata.
    {
        let mut levels = state.levels.write();
        levels[source_level]
            .sstables
            .retain(|t| !source_ids.contains(&t.id));
        levels[target_level]
            .sstables
            .retain(|t| !target_ids.contains(&t.id));
        for table in &new_tables {
            levels[target_level].add_sstable(Arc::clone(table));
        }
        levels[target_level].sort_by_min_key();
    }

    tracing::info!(
        source_level,
        target_level,
        entries = entries_merged,
        new_tables = new_tables.len(),
        "compaction committed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_table(
        state: &LsmState,
        config: &LsmConfig,
        level: usize,
        entries: Vec<(u64, Option<Vec<u8>>)>,
    ) {
        let id = state.next_sstable_id();
        let table = SSTable::from_sorted_entries(id, entries, config).unwrap();
        let mut levels = state.levels.write();
        levels[level].add_sstable(Arc::new(table));
        if level == 0 {
            levels[level].sort_by_id();
        } else {
            levels[level].sort_by_min_key();
        }
    }

    fn value(s: &str) -> Option<Vec<u8>> {
        Some(s.as_bytes().to_vec())
    }

    // Newest-first, which matters only for overlapping L0 tables.
    fn level_lookup(state: &LsmState, level: usize, key: u64) -> Option<Option<Vec<u8>>> {
        let levels = state.levels.read();
        levels[level]
            .sstables
            .iter()
            .rev()
            .find_map(|t| t.find_key(key))
    }

    #[test]
    fn test_no_overflow_no_compaction() {
        let config = LsmConfig::default();
        let state = LsmState::new(config.max_levels);
        install_table(&state, &config, 0, vec![(1, value("a"))]);

        assert_eq!(find_compaction_source(&state, &config), None);
        compact(&state, &config);
        assert_eq!(state.stats().level_tables[0], 1);
    }

    #[test]
    fn test_newer_l0_table_wins_merge() {
        let config = LsmConfig::default().max_l0_sstables(1);
        let state = LsmState::new(config.max_levels);
        install_table(&state, &config, 0, vec![(5, value("old")), (6, value("x"))]);
        install_table(&state, &config, 0, vec![(5, value("new"))]);

        assert_eq!(find_compaction_source(&state, &config), Some(0));
        compact(&state, &config);

        let stats = state.stats();
        assert_eq!(stats.level_tables[0], 0);
        assert!(stats.level_tables[1] > 0);
        assert_eq!(level_lookup(&state, 1, 5), Some(value("new")));
        assert_eq!(level_lookup(&state, 1, 6), Some(value("x")));
    }

    #[test]
    fn test_tombstone_carried_into_intermediate_level() {
        let config = LsmConfig::default().max_l0_sstables(1).max_levels(3);
        let state = LsmState::new(config.max_levels);
        install_table(&state, &config, 0, vec![(1, value("a"))]);
        install_table(&state, &config, 0, vec![(1, None), (2, value("b"))]);

        compact(&state, &config);

        // L1 is not the bottom level here, so the deletion marker must
        // survive the merge.
        assert_eq!(level_lookup(&state, 1, 1), Some(None));
        assert_eq!(level_lookup(&state, 1, 2), Some(value("b")));
    }

    #[test]
    fn test_tombstone_stripped_at_bottom_level() {
        let config = LsmConfig::default().max_l0_sstables(1).max_levels(2);
        let state = LsmState::new(config.max_levels);
        install_table(&state, &config, 0, vec![(1, value("a"))]);
        install_table(&state, &config, 0, vec![(1, None), (2, value("b"))]);

        compact(&state, &config);

        assert_eq!(level_lookup(&state, 1, 1), None);
        assert_eq!(level_lookup(&state, 1, 2), Some(value("b")));
    }

    #[test]
    fn test_overlapping_target_tables_replaced() {
        let config = LsmConfig::default().max_l0_sstables(1).max_levels(3);
        let state = LsmState::new(config.max_levels);
        // Target level: one overlapping and one disjoint table.
        install_table(
            &state,
            &config,
            1,
            vec![(10, value("l1-old")), (11, value("keep"))],
        );
        install_table(&state, &config, 1, vec![(500, value("far"))]);
        // Source: two L0 tables overwriting key 10.
        install_table(&state, &config, 0, vec![(10, value("mid"))]);
        install_table(&state, &config, 0, vec![(10, value("new"))]);

        compact(&state, &config);

        assert_eq!(level_lookup(&state, 1, 10), Some(value("new")));
        assert_eq!(level_lookup(&state, 1, 11), Some(value("keep")));
        assert_eq!(level_lookup(&state, 1, 500), Some(value("far")));
    }

    #[test]
    fn test_partitioned_output_is_non_overlapping_and_sorted() {
        let config = LsmConfig::default()
            .max_l0_sstables(1)
            .sstable_target_entries(4)
            .max_levels(2);
        let state = LsmState::new(config.max_levels);
        let spread: Vec<_> = (0..10).map(|i| (i * 7, value("v"))).collect();
        install_table(&state, &config, 0, spread);
        install_table(&state, &config, 0, vec![(3, value("w"))]);

        compact(&state, &config);

        let levels = state.levels.read();
        let tables = &levels[1].sstables;
        assert!(tables.len() > 1, "expected a partitioned output");
        for pair in tables.windows(2) {
            assert!(
                pair[0].max_key < pair[1].min_key,
                "L1 tables overlap: [{},{}] then [{},{}]",
                pair[0].min_key,
                pair[0].max_key,
                pair[1].min_key,
                pair[1].max_key
            );
        }
    }

    #[test]
    fn test_visible_values_unchanged_by_compaction() {
        let config = LsmConfig::default()
            .max_l0_sstables(1)
            .sstable_target_entries(8)
            .max_levels(3);
        let state = LsmState::new(config.max_levels);
        install_table(
            &state,
            &config,
            0,
            (0..20).map(|i| (i, value(&format!("v{i}")))).collect(),
        );
        install_table(&state, &config, 0, vec![(3, None), (21, value("v21"))]);

        let before: Vec<_> = (0..22).map(|k| level_lookup(&state, 0, k)).collect();
        compact(&state, &config);
        let after: Vec<_> = (0..22)
            .map(|k| level_lookup(&state, 0, k).or_else(|| level_lookup(&state, 1, k)))
            .collect();

        assert_eq!(before, after);
    }
}

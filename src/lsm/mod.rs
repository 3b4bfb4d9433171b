//! Log-structured merge tree engine.
//!
//! The tree organizes data by age across a hierarchy of in-memory
//! structures:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐
//! │ Active Memtable │───►│ Immutable Queue  │
//! │   (SkipMap)     │    │   (SkipMaps)     │
//! └─────────────────┘    └────────┬─────────┘
//!                                 │ flush worker
//!                                 ▼
//!                          ┌─────────────┐
//!                          │  Level 0    │  overlapping, id order
//!                          └──────┬──────┘
//!                                 │ compaction worker
//!                                 ▼
//!                          ┌─────────────┐
//!                          │  Level 1..N │  non-overlapping, min-key order
//!                          └─────────────┘
//! ```
//!
//! # Write path
//! 1. Writers insert into the active memtable under a shared lock.
//! 2. At the entry threshold the active memtable is rotated into the
//!    immutable queue and the flush worker is signaled.
//! 3. The flush worker converts queued memtables into L0 SSTables.
//! 4. The compaction worker merges overflowing levels downward.
//!
//! # Read path
//! Active memtable, then the immutable queue newest-first, then L0
//! newest-first, then each deeper level in min-key order. The first
//! value or tombstone encountered decides the lookup: a tombstone hides
//! everything older.
//!
//! Deletions are tombstones carried down until a compaction into the
//! bottom level erases them.

pub mod bloom;
pub(crate) mod compaction;
pub(crate) mod flush;
pub mod learned;
pub mod level;
pub mod memtable;
pub mod sstable;
pub mod state;
pub mod store;

pub use bloom::BlockedBloomFilter;
pub use learned::{IndexRange, LearnedIndex};
pub use level::Level;
pub use memtable::Memtable;
pub use sstable::SSTable;
pub use state::{LsmState, LsmStats};
pub use store::LsmTree;

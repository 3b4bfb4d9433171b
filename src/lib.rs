//! # TandemKV
//!
//! An in-memory key-value storage workbench: two concurrent index
//! engines behind one point-access interface, built to be driven side by
//! side under skewed multi-threaded load.
//!
//! - [`btree::BPlusTree`]: a paged B+ tree with per-node reader/writer
//!   locks, split-on-overflow and sibling-linked leaves for range scans.
//! - [`lsm::LsmTree`]: a tiered LSM tree with a mutable memtable, an
//!   immutable flush queue and background flush/compaction workers; each
//!   SSTable carries a register-blocked Bloom filter and, optionally, a
//!   piecewise-linear learned index.
//! - [`workload::ZipfianWorkload`]: the YCSB-style request source that
//!   feeds both engines through the [`engine::KvEngine`] seam.
//!
//! Keys are `u64`, values short byte strings. Everything lives in
//! memory: there is no durability, recovery or transaction layer.

pub mod btree;
pub mod config;
pub mod engine;
pub mod error;
mod hasher;
pub mod lsm;
pub mod workload;

pub use btree::{BPlusTree, BTreeStats};
pub use config::{BTreeConfig, LsmConfig};
pub use engine::KvEngine;
pub use error::{Error, Result};
pub use lsm::{LsmStats, LsmTree};
pub use workload::{Op, WorkloadConfig, ZipfianWorkload};

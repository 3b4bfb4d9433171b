//! The point-access seam shared by both engines.

/// Upper bound on value length. The workbench models short fixed-ish
/// payloads; the reference workload uses 8 bytes.
pub const MAX_VALUE_LEN: usize = 64;

/// Common point-access interface over 64-bit keys.
///
/// Both engines implement this so the workload driver and benchmarks can
/// treat them interchangeably. `delete` stays on the LSM tree and `range`
/// on the B+ tree as inherent methods: neither is part of the shared
/// surface.
pub trait KvEngine: Send + Sync {
    /// Inserts or updates a key-value pair.
    fn put(&self, key: u64, value: &[u8]);

    /// Retrieves the value for a given key.
    fn get(&self, key: u64) -> Option<Vec<u8>>;
}

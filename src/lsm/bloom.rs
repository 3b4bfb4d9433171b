//! Register-blocked Bloom filter.
//!
//! All hash bits for a key land in a single 64-bit block, so a query
//! touches one word. Inserts OR the mask in with an atomic, queries are
//! plain loads: readers never block and never see false negatives.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::hasher::fnv_hash64;

/// Default number of 64-bit blocks per filter.
pub const BLOOM_NUM_BLOCKS: usize = 512;
/// Default number of hash functions (one selects the block, the rest set
/// bits within it).
pub const BLOOM_NUM_HASHES: usize = 7;

/// Salted rehash used to derive the block index (salt 0) and the in-block
/// bit positions (salts 1..num_hashes).
fn salted_hash(base: u64, salt: u64) -> u64 {
    fnv_hash64(base ^ salt.wrapping_mul(0x9e37_79b9))
}

pub struct BlockedBloomFilter {
    blocks: Vec<AtomicU64>,
    num_hashes: usize,
}

impl BlockedBloomFilter {
    pub fn new(num_blocks: usize, num_hashes: usize) -> Self {
        let blocks = (0..num_blocks.max(1)).map(|_| AtomicU64::new(0)).collect();
        Self { blocks, num_hashes }
    }

    pub fn insert(&self, key: u64) {
        let base = fnv_hash64(key);
        let idx = self.block_index(base);
        let mask = self.construct_mask(base);
        self.blocks[idx].fetch_or(mask, Ordering::Relaxed);
    }

    /// Returns false only if the key was definitely never inserted.
    pub fn query(&self, key: u64) -> bool {
        let base = fnv_hash64(key);
        let block = self.blocks[self.block_index(base)].load(Ordering::Relaxed);
        let mask = self.construct_mask(base);
        (block & mask) == mask
    }

    fn block_index(&self, base: u64) -> usize {
        (salted_hash(base, 0) % self.blocks.len() as u64) as usize
    }

    fn construct_mask(&self, base: u64) -> u64 {
        let mut mask = 0u64;
        for salt in 1..self.num_hashes as u64 {
            mask |= 1u64 << (salted_hash(base, salt) % 64);
        }
        mask
    }
}

impl Default for BlockedBloomFilter {
    fn default() -> Self {
        Self::new(BLOOM_NUM_BLOCKS, BLOOM_NUM_HASHES)
    }
}

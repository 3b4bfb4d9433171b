//! Synthetic workload generation.
//!
//! YCSB-style Zipfian key sampling over a fixed key space, mixed with
//! update and insert operations at configurable ratios. The engines treat
//! this as an opaque source of `(key, op)` pairs; anything honoring the
//! `next`/`next_op` contract can stand in for it.
//!
//! The key-space size never changes after construction, so the zeta
//! normalization constants are computed once and sampling is lock-free
//! with a thread-local RNG.

use rand::Rng;

use crate::errconfig;
use crate::error::Result;
use crate::hasher::fnv_hash64;

/// Operation kinds emitted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Update,
    Insert,
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Size of the key space; keys are drawn from `[0, num_keys)`
    pub num_keys: u64,

    /// Zipfian skew constant (default: 0.99)
    pub theta: f64,

    /// Fraction of operations that are updates (default: 0.0)
    pub write_ratio: f64,

    /// Fraction of operations that are inserts (default: 0.0)
    pub insert_ratio: f64,

    /// Scramble the skewed keys across the key space with an FNV hash,
    /// so popularity is not correlated with key order (default: false)
    pub scramble: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            num_keys: 1 << 20,
            theta: 0.99,
            write_ratio: 0.0,
            insert_ratio: 0.0,
            scramble: false,
        }
    }
}

impl WorkloadConfig {
    pub fn num_keys(mut self, num_keys: u64) -> Self {
        self.num_keys = num_keys;
        self
    }

    pub fn theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    pub fn write_ratio(mut self, ratio: f64) -> Self {
        self.write_ratio = ratio;
        self
    }

    pub fn insert_ratio(mut self, ratio: f64) -> Self {
        self.insert_ratio = ratio;
        self
    }

    pub fn scramble(mut self, scramble: bool) -> Self {
        self.scramble = scramble;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_keys < 2 {
            return Err(errconfig!("workload needs at least 2 keys"));
        }
        if self.theta <= 0.0 || (self.theta - 1.0).abs() < f64::EPSILON {
            return Err(errconfig!("theta must be positive and not 1.0"));
        }
        let ratio_ok = |r: f64| (0.0..=1.0).contains(&r);
        if !ratio_ok(self.write_ratio)
            || !ratio_ok(self.insert_ratio)
            || self.write_ratio + self.insert_ratio > 1.0
        {
            return Err(errconfig!("operation ratios must stay within [0, 1]"));
        }
        Ok(())
    }
}

/// Zipfian-distributed `(key, op)` source.
pub struct ZipfianWorkload {
    items: u64,
    theta: f64,
    zeta_n: f64,
    eta: f64,
    alpha: f64,
    write_ratio: f64,
    insert_ratio: f64,
    scramble: bool,
}

impl ZipfianWorkload {
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        config.validate()?;
        let zeta_n = zeta(config.num_keys, config.theta);
        let zeta_2 = zeta(2, config.theta);
        let eta = (1.0 - (2.0 / config.num_keys as f64).powf(1.0 - config.theta))
            / (1.0 - zeta_2 / zeta_n);
        Ok(Self {
            items: config.num_keys,
            theta: config.theta,
            zeta_n,
            eta,
            alpha: 1.0 / (1.0 - config.theta),
            write_ratio: config.write_ratio,
            insert_ratio: config.insert_ratio,
            scramble: config.scramble,
        })
    }

    /// Draws the next key in `[0, num_keys)`. Low keys are the popular
    /// ones unless scrambling is on.
    pub fn next(&self) -> u64 {
        let u: f64 = rand::thread_rng().gen();
        let uz = u * self.zeta_n;

        let rank = if uz < 1.0 {
            0
        } else if uz < 1.0 + 0.5f64.powf(self.theta) {
            1
        } else {
            (self.items as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64
        };
        let rank = rank.min(self.items - 1);

        if self.scramble {
            fnv_hash64(rank) % self.items
        } else {
            rank
        }
    }

    /// Draws the operation kind for the next request.
    pub fn next_op(&self) -> Op {
        let roll: f64 = rand::thread_rng().gen();
        if roll < self.write_ratio {
            Op::Update
        } else if roll < self.write_ratio + self.insert_ratio {
            Op::Insert
        } else {
            Op::Read
        }
    }
}

fn zeta(n: u64, theta: f64) -> f64 {
    (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
}

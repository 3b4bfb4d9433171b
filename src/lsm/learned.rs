//! Piecewise-linear learned index over a sorted key array.
//!
//! Keys are partitioned into segments and each segment gets a
//! least-squares line mapping key -> global sorted index, together with
//! the maximum absolute residual observed during training. A prediction
//! is therefore a *range* of candidate indices that is guaranteed to
//! contain the key's true position if the key was in the training set.

/// Target keys per segment.
pub const TARGET_KEYS_PER_SEGMENT: usize = 256;
/// Below this many keys the index stays single-segment.
pub const MIN_KEYS_FOR_MULTISEGMENT: usize = TARGET_KEYS_PER_SEGMENT * 2;
/// Segments with fewer keys than this skip the regression and use a
/// constant model at the mean index.
pub const MIN_KEYS_PER_SEGMENT_TRAINING: usize = 5;

/// Slope denominators below this are treated as degenerate.
const DEGENERATE_DENOMINATOR: f64 = 1e-12;

#[derive(Debug, Clone)]
struct Segment {
    /// First key this segment is responsible for (inclusive).
    first_key: u64,
    slope: f64,
    intercept: f64,
    /// Max absolute error of the model over its training keys.
    max_abs_error: f64,
}

/// Inclusive candidate range of sorted indices; empty when `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRange {
    pub min: usize,
    pub max: usize,
}

impl IndexRange {
    /// The canonical empty range.
    pub const EMPTY: IndexRange = IndexRange { min: 1, max: 0 };

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

#[derive(Debug, Clone)]
pub struct LearnedIndex {
    segments: Vec<Segment>,
    min_key: u64,
    max_key: u64,
    total_keys: usize,
}

impl LearnedIndex {
    /// Trains on a sorted, deduplicated key array. Returns `None` for an
    /// empty input.
    pub fn train(sorted_keys: &[u64]) -> Option<Self> {
        if sorted_keys.is_empty() {
            return None;
        }

        let total_keys = sorted_keys.len();
        let num_segments = if total_keys < MIN_KEYS_FOR_MULTISEGMENT {
            1
        } else {
            total_keys.div_ceil(TARGET_KEYS_PER_SEGMENT)
        };

        let mut segments = Vec::with_capacity(num_segments);
        for i in 0..num_segments {
            let start = i * total_keys / num_segments;
            let end = if i == num_segments - 1 {
                total_keys
            } else {
                (i + 1) * total_keys / num_segments
            };
            if start == end {
                continue;
            }
            segments.push(fit_segment(&sorted_keys[start..end], start));
        }

        Some(Self {
            segments,
            min_key: sorted_keys[0],
            max_key: sorted_keys[total_keys - 1],
            total_keys,
        })
    }

    /// Predicts the candidate index range for `key`.
    ///
    /// Keys outside the trained key range yield the empty range: under the
    /// aggressive-filtering policy the caller may then conclude the key is
    /// absent without touching the data.
    pub fn predict(&self, key: u64) -> IndexRange {
        if key < self.min_key || key > self.max_key {
            return IndexRange::EMPTY;
        }

        // First segment whose first_key exceeds the key is one past the
        // responsible segment; a key before all segments maps to the first.
        let after = self.segments.partition_point(|s| s.first_key <= key);
        let segment = &self.segments[after.saturating_sub(1)];

        let predicted = segment.slope * key as f64 + segment.intercept;
        let lo = (predicted - segment.max_abs_error).max(0.0).ceil();
        let hi = (predicted + segment.max_abs_error).min((self.total_keys - 1) as f64);
        if hi < lo {
            return IndexRange::EMPTY;
        }
        IndexRange {
            min: lo as usize,
            max: hi.floor() as usize,
        }
    }

    pub fn min_key(&self) -> u64 {
        self.min_key
    }

    pub fn max_key(&self) -> u64 {
        self.max_key
    }

    pub fn total_keys(&self) -> usize {
        self.total_keys
    }
}

/// Least-squares fit of global index over key for one segment.
fn fit_segment(keys: &[u64], start_index: usize) -> Segment {
    let n = keys.len();
    let first_key = keys[0];
    let last_key = keys[n - 1];

    // Too few keys for a meaningful regression, or no key spread at all:
    // constant model at the mean index.
    if n < MIN_KEYS_PER_SEGMENT_TRAINING || first_key == last_key {
        let mean_index =
            (0..n).map(|i| (start_index + i) as f64).sum::<f64>() / n as f64;
        return with_residual(keys, start_index, 0.0, mean_index);
    }

    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_xy = 0.0f64;
    let mut sum_x_sq = 0.0f64;
    for (i, &key) in keys.iter().enumerate() {
        let x = key as f64;
        let y = (start_index + i) as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x_sq += x * x;
    }

    let n_f = n as f64;
    let denominator = n_f * sum_x_sq - sum_x * sum_x;
    let (slope, intercept) = if denominator.abs() < DEGENERATE_DENOMINATOR {
        (0.0, sum_y / n_f)
    } else {
        let slope = (n_f * sum_xy - sum_x * sum_y) / denominator;
        (slope, (sum_y - slope * sum_x) / n_f)
    };

    with_residual(keys, start_index, slope, intercept)
}

fn with_residual(keys: &[u64], start_index: usize, slope: f64, intercept: f64) -> Segment {
    let mut max_abs_error = 0.0f64;
    for (i, &key) in keys.iter().enumerate() {
        let predicted = slope * key as f64 + intercept;
        let residual = (predicted - (start_index + i) as f64).abs();
        max_abs_error = max_abs_error.max(residual);
    }
    Segment {
        first_key: keys[0],
        slope,
        intercept,
        max_abs_error,
    }
}

use serde::{Deserialize, Serialize};

use crate::enums::LockStrategy;

/// Config for a ring filter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RingConfig {
    /// Number of distinct elements the filter is sized for. Going past this number
    /// still works, but the false positive rate climbs above the target.
    /// Default: 1_000_000
    pub expected_elements: i64,

    /// Target false positive rate, exclusive range (0, 1).
    /// Default: 0.0001
    pub false_positive_rate: f64,

    /// Locking scheme for concurrent access.
    /// Default: Single
    pub lock_strategy: LockStrategy,

    /// Only used with `LockStrategy::Sharded`. Each of the four digest sub-words is
    /// reduced modulo this value, so the lock grid has `shard_dimension^4` cells.
    /// Must be in 1..=16.
    /// Default: 4 (256 cells)
    pub shard_dimension: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            expected_elements: 1_000_000,
            false_positive_rate: 0.0001,
            lock_strategy: LockStrategy::Single,
            shard_dimension: 4,
        }
    }
}

impl RingConfig {
    pub fn new(expected_elements: i64, false_positive_rate: f64) -> Self {
        Self {
            expected_elements,
            false_positive_rate,
            ..Default::default()
        }
    }

    pub fn sharded(mut self, shard_dimension: usize) -> Self {
        self.lock_strategy = LockStrategy::Sharded;
        self.shard_dimension = shard_dimension;
        self
    }

    /// Small filter for unit tests.
    pub fn default_test_config() -> Self {
        Self::new(1000, 0.01)
    }
}

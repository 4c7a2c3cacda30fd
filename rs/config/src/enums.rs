use serde::{Deserialize, Serialize};

/// How a ring filter coordinates concurrent access to its bit array.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum LockStrategy {
    /// One reader/writer lock over the whole filter. Adds are serialized.
    #[default]
    Single,
    /// A grid of per-shard locks selected from the key digest, plus an outer lock
    /// for structural operations (reset, merge, decode).
    Sharded,
}

impl From<i32> for LockStrategy {
    fn from(value: i32) -> Self {
        match value {
            0 => LockStrategy::Single,
            1 => LockStrategy::Sharded,
            _ => LockStrategy::Single, // Default to Single for unknown values
        }
    }
}

use std::ops::Deref;

use config::enums::LockStrategy;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, RingError};
use crate::hash::MultiHash;

pub const MAX_SHARD_DIMENSION: usize = 16;

/// Grid of `dimension^4` locks. A key's cell is picked by reducing each of its four
/// digest sub-words modulo `dimension`.
pub struct ShardGrid {
    dimension: usize,
    cells: Box<[RwLock<()>]>,
}

impl ShardGrid {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 || dimension > MAX_SHARD_DIMENSION {
            return Err(RingError::InvalidArgument(format!(
                "shard_dimension must be in 1..={MAX_SHARD_DIMENSION}, got {dimension}"
            )));
        }
        let cells = (0..dimension.pow(4)).map(|_| RwLock::new(())).collect();
        Ok(Self { dimension, cells })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Row-major position of the `(w0 % d, w1 % d, w2 % d, w3 % d)` cell.
    pub fn cell_index(&self, hash: &MultiHash) -> usize {
        hash.words()
            .iter()
            .fold(0, |acc, &w| acc * self.dimension + w as usize % self.dimension)
    }

    fn replicate(&self) -> Self {
        Self {
            dimension: self.dimension,
            cells: (0..self.cells.len()).map(|_| RwLock::new(())).collect(),
        }
    }

    fn cell(&self, hash: &MultiHash) -> &RwLock<()> {
        &self.cells[self.cell_index(hash)]
    }
}

/// Access to the guarded state. Holds every lock the operation needs and releases
/// them on drop, shard cell first.
pub enum Access<'a, T> {
    Exclusive(RwLockWriteGuard<'a, T>),
    Shared(RwLockReadGuard<'a, T>),
    ShardRead {
        _cell: RwLockReadGuard<'a, ()>,
        outer: RwLockReadGuard<'a, T>,
    },
    ShardWrite {
        _cell: RwLockWriteGuard<'a, ()>,
        outer: RwLockReadGuard<'a, T>,
    },
}

impl<T> Deref for Access<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self {
            Access::Exclusive(guard) => guard,
            Access::Shared(guard) => guard,
            Access::ShardRead { outer, .. } => outer,
            Access::ShardWrite { outer, .. } => outer,
        }
    }
}

/// Coordinates concurrent access to `T`.
///
/// Lock order: the outer state lock is always taken before a shard cell, never
/// after. Structural operations take only the outer lock, exclusively, which waits
/// out every in-flight keyed operation.
pub struct Guard<T> {
    state: RwLock<T>,
    shards: Option<ShardGrid>,
}

impl<T> Guard<T> {
    pub fn single(state: T) -> Self {
        Self {
            state: RwLock::new(state),
            shards: None,
        }
    }

    pub fn sharded(state: T, dimension: usize) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(state),
            shards: Some(ShardGrid::new(dimension)?),
        })
    }

    pub fn new(state: T, strategy: LockStrategy, dimension: usize) -> Result<Self> {
        match strategy {
            LockStrategy::Single => Ok(Self::single(state)),
            LockStrategy::Sharded => Self::sharded(state, dimension),
        }
    }

    /// A new guard over `state` with the same strategy and grid size as this one.
    pub fn replicate(&self, state: T) -> Self {
        Self {
            state: RwLock::new(state),
            shards: self.shards.as_ref().map(ShardGrid::replicate),
        }
    }

    pub fn strategy(&self) -> LockStrategy {
        match self.shards {
            None => LockStrategy::Single,
            Some(_) => LockStrategy::Sharded,
        }
    }

    pub fn shard_dimension(&self) -> Option<usize> {
        self.shards.as_ref().map(ShardGrid::dimension)
    }

    /// Access for writing the bits of one key.
    pub fn write_key(&self, hash: &MultiHash) -> Access<'_, T> {
        match &self.shards {
            None => Access::Exclusive(self.state.write()),
            Some(grid) => {
                let outer = self.state.read();
                let cell = grid.cell(hash).write();
                Access::ShardWrite { _cell: cell, outer }
            }
        }
    }

    /// Access for reading the bits of one key.
    pub fn read_key(&self, hash: &MultiHash) -> Access<'_, T> {
        match &self.shards {
            None => Access::Shared(self.state.read()),
            Some(grid) => {
                let outer = self.state.read();
                let cell = grid.cell(hash).read();
                Access::ShardRead { _cell: cell, outer }
            }
        }
    }

    /// Access that sees no concurrent writer at all, for point-in-time copies. With
    /// the single lock a shared read already excludes writers; with shards, keyed
    /// writers hold the outer lock shared, so this has to take it exclusively.
    pub fn snapshot(&self) -> Access<'_, T> {
        match &self.shards {
            None => Access::Shared(self.state.read()),
            Some(_) => Access::Exclusive(self.state.write()),
        }
    }

    /// Shared access to the whole state. Keyed writers may still run alongside it
    /// in sharded mode.
    pub fn read_all(&self) -> RwLockReadGuard<'_, T> {
        self.state.read()
    }

    /// Exclusive access for structural operations.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, T> {
        self.state.write()
    }

    /// Locks `target` exclusively and `source` shared. The two locks are always taken
    /// in address order, so two threads merging a pair of filters into each other
    /// cannot deadlock. `target` and `source` must be different guards.
    pub fn lock_pair<'a>(
        target: &'a Guard<T>,
        source: &'a Guard<T>,
    ) -> (RwLockWriteGuard<'a, T>, RwLockReadGuard<'a, T>) {
        debug_assert!(!std::ptr::eq(target, source));
        if (target as *const Guard<T>) < (source as *const Guard<T>) {
            let write = target.state.write();
            let read = source.state.read();
            (write, read)
        } else {
            let read = source.state.read();
            let write = target.state.write();
            (write, read)
        }
    }
}

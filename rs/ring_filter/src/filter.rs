use std::io::{Read, Write};

use config::enums::LockStrategy;
use config::ring::RingConfig;
use log::{debug, info, warn};

use crate::bits::BitStore;
use crate::codec::{buffer, stream, DecodedRing, Header};
use crate::error::{Result, RingError};
use crate::guard::Guard;
use crate::hash::MultiHash;
use crate::params::FilterParams;

pub const DEFAULT_SHARD_DIMENSION: usize = 4;

#[derive(Clone)]
struct RingState {
    round_count: u64,
    expected_elements: i64,
    false_positive_rate: f64,
    bits: BitStore,
}

impl RingState {
    fn params(&self) -> FilterParams {
        FilterParams {
            bit_count: self.bits.bit_count(),
            round_count: self.round_count,
        }
    }

    fn header(&self) -> Header {
        Header {
            params: self.params(),
            expected_elements: self.expected_elements,
            false_positive_rate: self.false_positive_rate,
        }
    }

    fn from_decoded(decoded: DecodedRing) -> Self {
        Self {
            round_count: decoded.header.params.round_count,
            expected_elements: decoded.header.expected_elements,
            false_positive_rate: decoded.header.false_positive_rate,
            bits: decoded.bits,
        }
    }

    /// Replaces dimensions and bits. Legacy images carry no hints, so the current
    /// ones are kept.
    fn install(&mut self, decoded: DecodedRing) {
        if decoded.has_hints() {
            self.expected_elements = decoded.header.expected_elements;
            self.false_positive_rate = decoded.header.false_positive_rate;
        }
        self.round_count = decoded.header.params.round_count;
        self.bits = decoded.bits;
    }
}

/// A thread-safe Bloom filter.
///
/// All operations take `&self`; share it across threads with an `Arc`. `add` and
/// `test` hash the key once and touch `round_count` bits. `reset`, `merge` and the
/// in-place decoders are structural: they wait for every in-flight operation and
/// block new ones until they are done.
pub struct RingFilter {
    guard: Guard<RingState>,
}

impl RingFilter {
    /// Creates a filter sized for `expected_elements` at `false_positive_rate`, with
    /// a single reader/writer lock.
    pub fn new(expected_elements: i64, false_positive_rate: f64) -> Result<Self> {
        Self::with_strategy(expected_elements, false_positive_rate, LockStrategy::Single)
    }

    pub fn with_strategy(
        expected_elements: i64,
        false_positive_rate: f64,
        strategy: LockStrategy,
    ) -> Result<Self> {
        let config = RingConfig {
            expected_elements,
            false_positive_rate,
            lock_strategy: strategy,
            shard_dimension: DEFAULT_SHARD_DIMENSION,
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &RingConfig) -> Result<Self> {
        let params =
            FilterParams::calculate(config.expected_elements, config.false_positive_rate)?;
        let state = RingState {
            round_count: params.round_count,
            expected_elements: config.expected_elements,
            false_positive_rate: config.false_positive_rate,
            bits: BitStore::new(params.bit_count),
        };
        let guard = Guard::new(state, config.lock_strategy, config.shard_dimension)?;
        debug!(
            "Created ring filter with {} bits and {} rounds ({:?} locking)",
            params.bit_count, params.round_count, config.lock_strategy
        );
        Ok(Self { guard })
    }

    /// Adds `data`. Returns true if at least one of its bits was not set before.
    ///
    /// The return value is only a hint: a key that was never added can find all of
    /// its bits already set by other keys and report false.
    pub fn add(&self, data: &[u8]) -> bool {
        let hash = MultiHash::new(data);
        let state = self.guard.write_key(&hash);
        let mut new = false;
        for round in 0..state.round_count {
            if state.bits.set_bit(hash.round_index(round)) {
                new = true;
            }
        }
        new
    }

    /// Returns false if `data` was definitely never added, true if it may have been.
    pub fn test(&self, data: &[u8]) -> bool {
        let hash = MultiHash::new(data);
        let state = self.guard.read_key(&hash);
        (0..state.round_count).all(|round| state.bits.test_bit(hash.round_index(round)))
    }

    /// Clears every bit. Dimensions and hints are kept.
    pub fn reset(&self) {
        let mut state = self.guard.exclusive();
        state.bits.clear_all();
        debug!("Reset ring filter with {} bits", state.bits.bit_count());
    }

    /// ORs `other` into this filter. Both must have the same bit and round counts.
    /// On error this filter is left untouched. `other` is only read.
    pub fn merge(&self, other: &RingFilter) -> Result<()> {
        if std::ptr::eq(self, other) {
            // Union with itself; nothing to do.
            return Ok(());
        }
        let (target, source) = Guard::lock_pair(&self.guard, &other.guard);
        let (expected, actual) = (target.params(), source.params());
        if expected != actual {
            warn!(
                "Refusing to merge a {}/{} ring filter into a {}/{} one",
                actual.bit_count, actual.round_count, expected.bit_count, expected.round_count
            );
            return Err(RingError::DimensionMismatch {
                expected_bits: expected.bit_count,
                expected_rounds: expected.round_count,
                actual_bits: actual.bit_count,
                actual_rounds: actual.round_count,
            });
        }
        target.bits.union(&source.bits)
    }

    pub fn expected_elements(&self) -> i64 {
        self.guard.read_all().expected_elements
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.guard.read_all().false_positive_rate
    }

    pub fn params(&self) -> FilterParams {
        self.guard.read_all().params()
    }

    pub fn bit_count(&self) -> u64 {
        self.params().bit_count
    }

    pub fn round_count(&self) -> u64 {
        self.params().round_count
    }

    pub fn strategy(&self) -> LockStrategy {
        self.guard.strategy()
    }

    /// Side length of the lock grid, `None` with the single lock.
    pub fn shard_dimension(&self) -> Option<usize> {
        self.guard.shard_dimension()
    }

    pub fn bits_set(&self) -> u64 {
        self.guard.read_all().bits.count_ones()
    }

    /// Fraction of the `bit_count` bits that are set.
    pub fn fill_ratio(&self) -> f64 {
        let state = self.guard.read_all();
        state.bits.count_ones() as f64 / state.bits.bit_count() as f64
    }

    /// False positive rate implied by the current fill: `fill_ratio ^ round_count`.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        let state = self.guard.read_all();
        let fill = state.bits.count_ones() as f64 / state.bits.bit_count() as f64;
        fill.powf(state.round_count as f64)
    }

    /// Deep copy taken at a single point in time. The copy uses the same locking
    /// strategy and can be encoded without holding up the original.
    pub fn snapshot(&self) -> RingFilter {
        let state = RingState::clone(&self.guard.snapshot());
        RingFilter {
            guard: self.guard.replicate(state),
        }
    }

    fn copy_out(&self) -> (Header, Vec<u8>) {
        let state = self.guard.snapshot();
        (state.header(), state.bits.to_bytes())
    }

    fn install(&self, decoded: DecodedRing) {
        let params = decoded.header.params;
        self.guard.exclusive().install(decoded);
        info!(
            "Loaded ring filter with {} bits and {} rounds",
            params.bit_count, params.round_count
        );
    }

    fn from_decoded(decoded: DecodedRing, strategy: LockStrategy, shard_dimension: usize) -> Result<Self> {
        Ok(Self {
            guard: Guard::new(RingState::from_decoded(decoded), strategy, shard_dimension)?,
        })
    }

    /// Encodes into the version 2 buffer layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (header, bits) = self.copy_out();
        buffer::encode(&header, &bits)
    }

    /// Decodes a version 1 or 2 buffer into a new single-lock filter.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_decoded(buffer::decode(data)?, LockStrategy::Single, DEFAULT_SHARD_DIMENSION)
    }

    /// Replaces this filter's state with a decoded version 1 or 2 buffer. The buffer
    /// is fully validated before anything is replaced.
    pub fn load_bytes(&self, data: &[u8]) -> Result<()> {
        self.install(buffer::decode(data)?);
        Ok(())
    }

    /// Writes the checksummed version 3 encoding. Returns the number of bytes
    /// written. The bits are copied out under the lock; the writer is driven after
    /// the lock is released, so a slow writer does not stall the filter.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<u64> {
        let (header, bits) = self.copy_out();
        stream::write(writer, &header, &bits)
    }

    /// Replaces this filter's state with a version 3 encoding read from `reader`.
    /// Returns the number of bytes read. Nothing is replaced unless the checksum
    /// matches.
    pub fn read_from<R: Read>(&self, reader: R) -> Result<u64> {
        let (decoded, bytes_read) = stream::read(reader)?;
        self.install(decoded);
        Ok(bytes_read)
    }

    /// Reads a version 3 encoding into a new single-lock filter.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_reader_with(reader, LockStrategy::Single, DEFAULT_SHARD_DIMENSION)
    }

    pub fn from_reader_with<R: Read>(
        reader: R,
        strategy: LockStrategy,
        shard_dimension: usize,
    ) -> Result<Self> {
        let (decoded, _) = stream::read(reader)?;
        Self::from_decoded(decoded, strategy, shard_dimension)
    }
}

impl Clone for RingFilter {
    fn clone(&self) -> Self {
        self.snapshot()
    }
}

impl std::fmt::Debug for RingFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.guard.read_all();
        f.debug_struct("RingFilter")
            .field("strategy", &self.guard.strategy())
            .field("bit_count", &state.bits.bit_count())
            .field("round_count", &state.round_count)
            .field("expected_elements", &state.expected_elements)
            .field("false_positive_rate", &state.false_positive_rate)
            .finish()
    }
}

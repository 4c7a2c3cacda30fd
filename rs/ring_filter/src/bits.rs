use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Result, RingError};

/// Packed bit array backing a ring filter.
///
/// Bytes are atomic so that two writers holding different shard locks can set
/// neighbouring bits of the same byte without losing either update. Whole-buffer
/// operations (`clear_all`, installing decoded bytes) take `&mut self`, which the
/// filter only hands out under its exclusive lock.
pub struct BitStore {
    bit_count: u64,
    bytes: Box<[AtomicU8]>,
}

impl BitStore {
    pub fn new(bit_count: u64) -> Self {
        Self {
            bit_count,
            bytes: Self::zeroed(bit_count),
        }
    }

    /// Builds a store from raw bytes. `bytes` must hold exactly `bit_count / 8 + 1`
    /// bytes.
    pub fn from_bytes(bit_count: u64, bytes: &[u8]) -> Result<Self> {
        let expected = Self::byte_len_for(bit_count);
        if bytes.len() != expected {
            return Err(RingError::TruncatedInput(format!(
                "bit buffer for {bit_count} bits needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            bit_count,
            bytes: bytes.iter().map(|&b| AtomicU8::new(b)).collect(),
        })
    }

    pub fn byte_len_for(bit_count: u64) -> usize {
        (bit_count / 8 + 1) as usize
    }

    fn zeroed(bit_count: u64) -> Box<[AtomicU8]> {
        (0..Self::byte_len_for(bit_count))
            .map(|_| AtomicU8::new(0))
            .collect()
    }

    #[inline]
    fn locate(&self, index: u64) -> (usize, u8) {
        let index = index % self.bit_count;
        ((index / 8) as usize, 1 << (index % 8))
    }

    /// Sets bit `index % bit_count`. Returns true if the bit was previously unset.
    #[inline]
    pub fn set_bit(&self, index: u64) -> bool {
        let (byte, mask) = self.locate(index);
        self.bytes[byte].fetch_or(mask, Ordering::AcqRel) & mask == 0
    }

    #[inline]
    pub fn test_bit(&self, index: u64) -> bool {
        let (byte, mask) = self.locate(index);
        self.bytes[byte].load(Ordering::Acquire) & mask != 0
    }

    /// Replaces the buffer with a zeroed one of the same size.
    pub fn clear_all(&mut self) {
        self.bytes = Self::zeroed(self.bit_count);
    }

    /// ORs every byte of `other` into this store.
    pub fn union(&self, other: &BitStore) -> Result<()> {
        if self.bit_count != other.bit_count || self.bytes.len() != other.bytes.len() {
            return Err(RingError::InvalidArgument(format!(
                "cannot union a {}-bit store into a {}-bit store",
                other.bit_count, self.bit_count
            )));
        }
        for (dst, src) in self.bytes.iter().zip(other.bytes.iter()) {
            let byte = src.load(Ordering::Acquire);
            if byte != 0 {
                dst.fetch_or(byte, Ordering::AcqRel);
            }
        }
        Ok(())
    }

    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn count_ones(&self) -> u64 {
        self.bytes
            .iter()
            .map(|b| u64::from(b.load(Ordering::Relaxed).count_ones()))
            .sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes
            .iter()
            .map(|b| b.load(Ordering::Acquire))
            .collect()
    }
}

impl Clone for BitStore {
    fn clone(&self) -> Self {
        Self {
            bit_count: self.bit_count,
            bytes: self
                .bytes
                .iter()
                .map(|b| AtomicU8::new(b.load(Ordering::Acquire)))
                .collect(),
        }
    }
}

impl std::fmt::Debug for BitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitStore")
            .field("bit_count", &self.bit_count)
            .field("byte_len", &self.bytes.len())
            .field("bits_set", &self.count_ones())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_set_and_test_bit() {
        let store = BitStore::new(100);
        assert_eq!(store.byte_len(), 13);
        assert!(!store.test_bit(42));
        assert!(store.set_bit(42));
        assert!(store.test_bit(42));
        // Second set reports no transition.
        assert!(!store.set_bit(42));
        assert!(!store.test_bit(41));
        assert!(!store.test_bit(43));
        assert_eq!(store.count_ones(), 1);
    }

    #[test]
    fn test_index_is_reduced() {
        let store = BitStore::new(100);
        assert!(store.set_bit(105));
        assert!(store.test_bit(5));
        assert!(!store.set_bit(5));
    }

    #[test]
    fn test_clear_all() {
        let mut store = BitStore::new(64);
        for i in 0..64 {
            store.set_bit(i);
        }
        assert_eq!(store.count_ones(), 64);
        store.clear_all();
        assert_eq!(store.count_ones(), 0);
        assert_eq!(store.byte_len(), 9);
    }

    #[test]
    fn test_union() {
        let a = BitStore::new(50);
        let b = BitStore::new(50);
        a.set_bit(1);
        b.set_bit(2);
        b.set_bit(49);
        a.union(&b).unwrap();
        assert!(a.test_bit(1));
        assert!(a.test_bit(2));
        assert!(a.test_bit(49));
        assert_eq!(a.count_ones(), 3);
        // Source is untouched.
        assert_eq!(b.count_ones(), 2);

        let c = BitStore::new(51);
        assert!(a.union(&c).is_err());
    }

    #[test]
    fn test_bytes_round_trip() {
        let store = BitStore::new(20);
        store.set_bit(0);
        store.set_bit(9);
        store.set_bit(19);
        let bytes = store.to_bytes();
        assert_eq!(bytes, vec![0b0000_0001, 0b0000_0010, 0b0000_1000]);

        let copy = BitStore::from_bytes(20, &bytes).unwrap();
        assert!(copy.test_bit(0));
        assert!(copy.test_bit(9));
        assert!(copy.test_bit(19));
        assert_eq!(copy.count_ones(), 3);

        assert!(matches!(
            BitStore::from_bytes(20, &bytes[..2]),
            Err(RingError::TruncatedInput(_))
        ));
    }

    #[test]
    fn test_concurrent_neighbour_bits() {
        // Eight threads each own one bit of every byte.
        let store = Arc::new(BitStore::new(8 * 1024));
        let handles: Vec<_> = (0..8u64)
            .map(|offset| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for byte in 0..1024u64 {
                        assert!(store.set_bit(byte * 8 + offset));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.count_ones(), 8 * 1024);
    }
}

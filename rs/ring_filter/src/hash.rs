use xxhash_rust::xxh3::xxh3_128;

/// One 128-bit digest of a key, split into four 32-bit sub-words.
///
/// Every round index of an add/test is derived from this single value, and the
/// sharded lock grid picks its cell from the same sub-words, so a key is hashed
/// exactly once per operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MultiHash {
    // w0 is the lowest 32 bits of the XXH3-128 digest, w3 the highest.
    words: [u32; 4],
}

impl MultiHash {
    pub fn new(data: &[u8]) -> Self {
        Self::from_digest(xxh3_128(data))
    }

    pub fn from_digest(digest: u128) -> Self {
        Self {
            words: [
                digest as u32,
                (digest >> 32) as u32,
                (digest >> 64) as u32,
                (digest >> 96) as u32,
            ],
        }
    }

    pub fn words(&self) -> [u32; 4] {
        self.words
    }

    /// Raw (unreduced) bit index for `round`, using enhanced double hashing:
    ///
    /// `h1 + i * h2 + (i^3 - i) / 6`
    ///
    /// where `h1 = w1:w0` and `h2 = w3:w2`. The cubic term breaks the cycles plain
    /// double hashing falls into when `h2` shares factors with the bit count. The
    /// caller reduces the result modulo the bit count.
    #[inline]
    pub fn round_index(&self, round: u64) -> u64 {
        let [w0, w1, w2, w3] = self.words;
        let h1 = (u64::from(w1) << 32) | u64::from(w0);
        let h2 = (u64::from(w3) << 32) | u64::from(w2);

        // (i^3 - i) / 6 == (i - 1) * i * (i + 1) / 6. Exact for any realistic round
        // count; wraps deterministically beyond 2^42 rounds.
        let tetra = if round == 0 {
            0
        } else {
            let i = u128::from(round);
            ((i - 1).wrapping_mul(i).wrapping_mul(i + 1) / 6) as u64
        };

        h1.wrapping_add(round.wrapping_mul(h2)).wrapping_add(tetra)
    }
}

pub mod buffer;
pub mod stream;

use byteorder::{BigEndian, ByteOrder};

use crate::bits::BitStore;
use crate::error::{Result, RingError};
use crate::params::FilterParams;

/// Header layout shared by every version (all integers big-endian):
///
/// | version | bit_count | round_count | expected_elements | false_positive_rate |
/// | 1 byte  | 8 bytes   | 8 bytes     | 8 bytes (v2, v3)  | 8 bytes (v2, v3)    |
///
/// The bit buffer (`bit_count / 8 + 1` bytes) follows the header. Version 3 adds a
/// 16-byte MD5 digest of header and bits at the end.
pub const LEGACY_HEADER_SIZE: usize = 17;
pub const HEADER_SIZE: usize = 33;
pub const CHECKSUM_SIZE: usize = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Buffer format without metadata hints.
    Legacy = 1,
    /// Buffer format with metadata hints. What `to_bytes` writes.
    Current = 2,
    /// Stream format with a trailing checksum.
    Streaming = 3,
}

impl FormatVersion {
    pub fn header_size(self) -> usize {
        match self {
            FormatVersion::Legacy => LEGACY_HEADER_SIZE,
            FormatVersion::Current | FormatVersion::Streaming => HEADER_SIZE,
        }
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = RingError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(FormatVersion::Legacy),
            2 => Ok(FormatVersion::Current),
            3 => Ok(FormatVersion::Streaming),
            other => Err(RingError::UnsupportedVersion(other)),
        }
    }
}

/// Everything a ring filter persists besides its bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub params: FilterParams,
    pub expected_elements: i64,
    pub false_positive_rate: f64,
}

impl Header {
    /// Writes the full 33-byte header for `version`. Legacy headers only use the
    /// first 17 bytes.
    pub fn encode(&self, version: FormatVersion) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = version as u8;
        BigEndian::write_u64(&mut buf[1..9], self.params.bit_count);
        BigEndian::write_u64(&mut buf[9..17], self.params.round_count);
        if version != FormatVersion::Legacy {
            BigEndian::write_i64(&mut buf[17..25], self.expected_elements);
            BigEndian::write_f64(&mut buf[25..33], self.false_positive_rate);
        }
        buf
    }

    /// Parses the header following the version byte. `buf` must hold
    /// `version.header_size()` bytes, version byte included.
    pub fn decode(version: FormatVersion, buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= version.header_size());
        let params = FilterParams {
            bit_count: BigEndian::read_u64(&buf[1..9]),
            round_count: BigEndian::read_u64(&buf[9..17]),
        };
        match version {
            FormatVersion::Legacy => Self {
                params,
                expected_elements: 0,
                false_positive_rate: 0.0,
            },
            FormatVersion::Current | FormatVersion::Streaming => Self {
                params,
                expected_elements: BigEndian::read_i64(&buf[17..25]),
                false_positive_rate: BigEndian::read_f64(&buf[25..33]),
            },
        }
    }
}

/// A fully validated filter image, ready to be installed.
pub struct DecodedRing {
    pub version: FormatVersion,
    pub header: Header,
    pub bits: BitStore,
}

impl DecodedRing {
    /// Legacy images carry no metadata hints.
    pub fn has_hints(&self) -> bool {
        self.version != FormatVersion::Legacy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header {
            params: FilterParams {
                bit_count: 0x0102_0304_0506_0708,
                round_count: 13,
            },
            expected_elements: -1,
            false_positive_rate: 0.25,
        }
    }

    #[test]
    fn test_version_tags() {
        assert_eq!(FormatVersion::try_from(1u8).unwrap(), FormatVersion::Legacy);
        assert_eq!(FormatVersion::try_from(2u8).unwrap(), FormatVersion::Current);
        assert_eq!(FormatVersion::try_from(3u8).unwrap(), FormatVersion::Streaming);
        for tag in [0u8, 4, 255] {
            assert!(matches!(
                FormatVersion::try_from(tag),
                Err(RingError::UnsupportedVersion(t)) if t == tag
            ));
        }
    }

    #[test]
    fn test_header_layout() {
        let buf = header().encode(FormatVersion::Current);
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..9], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buf[9..17], &[0, 0, 0, 0, 0, 0, 0, 13]);
        assert_eq!(&buf[17..25], &[0xff; 8]);
        assert_eq!(&buf[25..33], &0.25f64.to_bits().to_be_bytes());
        assert_eq!(Header::decode(FormatVersion::Current, &buf), header());
    }

    #[test]
    fn test_legacy_header_drops_hints() {
        let buf = header().encode(FormatVersion::Legacy);
        assert_eq!(buf[0], 1);
        assert_eq!(&buf[17..], &[0u8; 16]);
        let decoded = Header::decode(FormatVersion::Legacy, &buf[..LEGACY_HEADER_SIZE]);
        assert_eq!(decoded.params, header().params);
        assert_eq!(decoded.expected_elements, 0);
        assert_eq!(decoded.false_positive_rate, 0.0);
    }
}

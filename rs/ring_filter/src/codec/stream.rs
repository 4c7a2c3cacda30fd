//! Stream encoding (version 3): header, bits, then an MD5 digest of both.

use std::io::{self, Read, Write};

use log::warn;
use md5::{Digest, Md5};

use crate::bits::BitStore;
use crate::codec::{DecodedRing, FormatVersion, Header, CHECKSUM_SIZE, HEADER_SIZE};
use crate::error::{Result, RingError};

/// Upper bound on what is reserved up front for the bit buffer. The declared size
/// comes from the stream and is not trusted until the checksum matches.
const MAX_PREALLOCATED_BITS: usize = 1 << 20;

/// Counts every byte that reaches the inner writer.
pub struct CountingWriter<W> {
    inner: W,
    bytes_written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Counts every byte pulled from the inner reader.
pub struct CountingReader<R> {
    inner: R,
    bytes_read: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Writes `header` and `bits` followed by their MD5 digest. Returns the number of
/// bytes written, trailer included.
pub fn write<W: Write>(writer: W, header: &Header, bits: &[u8]) -> Result<u64> {
    let mut writer = CountingWriter::new(writer);
    let mut hasher = Md5::new();

    let head = header.encode(FormatVersion::Streaming);
    hasher.update(head);
    writer.write_all(&head)?;

    hasher.update(bits);
    writer.write_all(bits)?;

    let checksum: [u8; CHECKSUM_SIZE] = hasher.finalize().into();
    writer.write_all(&checksum)?;
    writer.flush()?;

    Ok(writer.bytes_written())
}

/// Reads one version 3 image. Returns it with the number of bytes consumed,
/// trailer included. Nothing is handed back unless the digest matches.
pub fn read<R: Read>(reader: R) -> Result<(DecodedRing, u64)> {
    let mut reader = CountingReader::new(reader);
    let mut hasher = Md5::new();

    let mut head = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut head[..1])
        .map_err(|e| RingError::from_read(e, "version"))?;
    let version = FormatVersion::try_from(head[0])?;
    if version != FormatVersion::Streaming {
        return Err(RingError::UnsupportedVersion(head[0]));
    }
    reader
        .read_exact(&mut head[1..])
        .map_err(|e| RingError::from_read(e, "header"))?;
    hasher.update(head);
    let header = Header::decode(version, &head);

    let byte_len = header.params.bit_count / 8 + 1;
    let mut bits = Vec::with_capacity((byte_len as usize).min(MAX_PREALLOCATED_BITS));
    (&mut reader)
        .take(byte_len)
        .read_to_end(&mut bits)
        .map_err(|e| RingError::from_read(e, "bit buffer"))?;
    if (bits.len() as u64) < byte_len {
        return Err(RingError::TruncatedInput(format!(
            "stream ended after {} of {byte_len} bit buffer bytes",
            bits.len()
        )));
    }
    hasher.update(&bits);

    let mut trailer = [0u8; CHECKSUM_SIZE];
    reader
        .read_exact(&mut trailer)
        .map_err(|e| RingError::from_read(e, "checksum"))?;
    let checksum: [u8; CHECKSUM_SIZE] = hasher.finalize().into();
    if checksum != trailer {
        warn!(
            "Ring filter checksum mismatch after {} bytes",
            reader.bytes_read()
        );
        return Err(RingError::ChecksumMismatch);
    }

    header.params.validate()?;
    let bits = BitStore::from_bytes(header.params.bit_count, &bits)?;
    Ok((
        DecodedRing {
            version,
            header,
            bits,
        },
        reader.bytes_read(),
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::params::FilterParams;

    fn sample() -> (Header, Vec<u8>) {
        let header = Header {
            params: FilterParams {
                bit_count: 40,
                round_count: 4,
            },
            expected_elements: 10,
            false_positive_rate: 0.05,
        };
        (header, vec![1, 2, 3, 4, 5, 0x80])
    }

    fn encoded() -> Vec<u8> {
        let (header, bits) = sample();
        let mut out = vec![];
        write(&mut out, &header, &bits).unwrap();
        out
    }

    /// Fails every read once `budget` bytes have been served.
    struct FailingReader {
        inner: Cursor<Vec<u8>>,
        budget: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
            }
            let len = buf.len().min(self.budget);
            let n = self.inner.read(&mut buf[..len])?;
            self.budget -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_write_layout() {
        let (header, bits) = sample();
        let mut out = vec![];
        let written = write(&mut out, &header, &bits).unwrap();
        assert_eq!(written as usize, HEADER_SIZE + bits.len() + CHECKSUM_SIZE);
        assert_eq!(out.len() as u64, written);
        assert_eq!(out[0], 3);
        assert_eq!(&out[HEADER_SIZE..HEADER_SIZE + bits.len()], bits.as_slice());

        let expected: [u8; CHECKSUM_SIZE] = Md5::digest(&out[..HEADER_SIZE + bits.len()]).into();
        assert_eq!(&out[HEADER_SIZE + bits.len()..], &expected);
    }

    #[test]
    fn test_read_back() {
        let (header, bits) = sample();
        let data = encoded();
        let (decoded, read) = super::read(Cursor::new(&data)).unwrap();
        assert_eq!(read, data.len() as u64);
        assert_eq!(decoded.version, FormatVersion::Streaming);
        assert_eq!(decoded.header, header);
        assert_eq!(decoded.bits.to_bytes(), bits);
    }

    #[test]
    fn test_read_stops_at_trailer() {
        let mut data = encoded();
        let len = data.len();
        data.extend_from_slice(b"next frame");
        let mut cursor = Cursor::new(&data);
        let (_, read) = super::read(&mut cursor).unwrap();
        assert_eq!(read, len as u64);
        assert_eq!(cursor.position(), len as u64);
    }

    #[test]
    fn test_read_truncated() {
        let data = encoded();
        for len in 0..data.len() {
            assert!(
                matches!(
                    super::read(Cursor::new(&data[..len])),
                    Err(RingError::TruncatedInput(_))
                ),
                "length {len} should be truncated"
            );
        }
    }

    #[test]
    fn test_read_rejects_other_versions() {
        for tag in [1u8, 2, 4, 0] {
            let mut data = encoded();
            data[0] = tag;
            assert!(matches!(
                super::read(Cursor::new(&data)),
                Err(RingError::UnsupportedVersion(t)) if t == tag
            ));
        }
    }

    #[test]
    fn test_every_bit_flip_is_caught() {
        let data = encoded();
        for byte in 1..data.len() {
            for bit in 0..8 {
                let mut corrupted = data.clone();
                corrupted[byte] ^= 1 << bit;
                let result = super::read(Cursor::new(&corrupted));
                assert!(
                    matches!(
                        result,
                        Err(RingError::ChecksumMismatch) | Err(RingError::TruncatedInput(_))
                    ),
                    "flip of bit {bit} in byte {byte} was not caught"
                );
            }
        }
    }

    #[test]
    fn test_io_error_is_wrapped() {
        let data = encoded();
        let reader = FailingReader {
            inner: Cursor::new(data),
            budget: HEADER_SIZE + 2,
        };
        match super::read(reader) {
            Err(RingError::CorruptedData(err)) => {
                assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("expected CorruptedData, got {:?}", other.err()),
        }
    }
}

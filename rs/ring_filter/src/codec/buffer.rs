//! In-memory encoding: header followed by the raw bit buffer, no checksum.

use crate::bits::BitStore;
use crate::codec::{DecodedRing, FormatVersion, Header};
use crate::error::{Result, RingError};

/// Encodes in the current (version 2) layout.
pub fn encode(header: &Header, bits: &[u8]) -> Vec<u8> {
    encode_version(FormatVersion::Current, header, bits)
}

/// Encodes in the version 1 layout, which has no room for the metadata hints.
pub fn encode_legacy(header: &Header, bits: &[u8]) -> Vec<u8> {
    encode_version(FormatVersion::Legacy, header, bits)
}

fn encode_version(version: FormatVersion, header: &Header, bits: &[u8]) -> Vec<u8> {
    let header_size = version.header_size();
    let mut out = Vec::with_capacity(header_size + bits.len());
    out.extend_from_slice(&header.encode(version)[..header_size]);
    out.extend_from_slice(bits);
    out
}

/// Decodes a version 1 or version 2 buffer. The input must hold the whole header
/// and the whole declared bit buffer; trailing bytes are ignored. Nothing is
/// allocated for the bits before the length has been checked.
pub fn decode(data: &[u8]) -> Result<DecodedRing> {
    let tag = *data
        .first()
        .ok_or_else(|| RingError::TruncatedInput("empty buffer".to_string()))?;
    let version = match FormatVersion::try_from(tag)? {
        FormatVersion::Streaming => return Err(RingError::UnsupportedVersion(tag)),
        version => version,
    };

    let header_size = version.header_size();
    if data.len() < header_size {
        return Err(RingError::TruncatedInput(format!(
            "version {tag} header needs {header_size} bytes, got {}",
            data.len()
        )));
    }
    let header = Header::decode(version, &data[..header_size]);
    header.params.validate()?;

    let byte_len = header.params.byte_len();
    let end = header_size.saturating_add(byte_len);
    if data.len() < end {
        return Err(RingError::TruncatedInput(format!(
            "{} bits need {byte_len} bytes after the header, got {}",
            header.params.bit_count,
            data.len() - header_size
        )));
    }

    let bits = BitStore::from_bytes(header.params.bit_count, &data[header_size..end])?;
    Ok(DecodedRing {
        version,
        header,
        bits,
    })
}

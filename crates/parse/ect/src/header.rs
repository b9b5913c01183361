//! ECT top-level header.
//!
//! The blob starts with a fixed 16-byte header followed by a table of
//! `(block name, offset)` pairs, offsets relative to the blob base.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// The signature every ECT blob starts with.
pub const ECT_SIGNATURE: [u8; 4] = *b"PARA";

/// Size of the fixed part of the header.
pub const FIXED_HEADER_SIZE: usize = 16;

/// One entry of the top-level block table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Block name as stored in the blob (e.g. `"DVFS"`, `"ASV"`).
    pub name: String,
    /// Absolute offset of the block body.
    pub offset: usize,
}

/// The parsed top-level header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EctHeader {
    /// ASCII version tag, e.g. `b"1.00"`.
    pub version: [u8; 4],
    /// Declared total size of the blob in bytes.
    pub total_size: u32,
    /// Block table in blob order.
    pub blocks: Vec<BlockEntry>,
}

impl EctHeader {
    /// Parses the header and block table.
    ///
    /// Returns the header and the usable length of the blob, which is the
    /// declared total size clamped to the slice length.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::BadSignature`] if the signature is not `"PARA"`,
    /// and [`EctError::Truncated`] or [`EctError::BadOffset`] if the header
    /// or block table does not fit.
    pub fn parse(blob: &[u8]) -> Result<(Self, usize), EctError> {
        let mut r = Reader::new(blob);
        let sign = r.read_tag()?;
        if sign != ECT_SIGNATURE {
            return Err(EctError::BadSignature);
        }
        let version = r.read_tag()?;
        let total_size = r.read_u32()?;

        let limit = (total_size as usize).min(blob.len());
        if limit < FIXED_HEADER_SIZE {
            return Err(EctError::Truncated);
        }

        let mut r = Reader::at(&blob[..limit], r.position())?;
        let blocks = r
            .read_name_table(0)?
            .into_iter()
            .map(|(name, offset)| BlockEntry { name, offset })
            .collect();

        Ok((
            Self {
                version,
                total_size,
                blocks,
            },
            limit,
        ))
    }

    /// Returns `true` if the version tag marks a test build of the table.
    ///
    /// Release tags look like `"1.00"` or `"2010"`: a dot in the second
    /// position or a zero in the last one.
    #[must_use]
    pub fn is_test_version(&self) -> bool {
        self.version[1] != b'.' && self.version[3] != b'0'
    }

    /// Returns the version tag as text, replacing non-ASCII bytes.
    #[must_use]
    pub fn version_str(&self) -> String {
        version_string(&self.version)
    }
}

/// Renders a 4-byte version tag for logs.
#[must_use]
pub fn version_string(tag: &[u8; 4]) -> String {
    tag.iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(sign: &[u8; 4], version: &[u8; 4], total: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(sign);
        v.extend_from_slice(version);
        v.extend_from_slice(&total.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v
    }

    #[test]
    fn parse_empty_table() {
        let blob = header_bytes(b"PARA", b"1.00", 16);
        let (hdr, limit) = EctHeader::parse(&blob).unwrap();
        assert_eq!(hdr.version, *b"1.00");
        assert!(hdr.blocks.is_empty());
        assert_eq!(limit, 16);
    }

    #[test]
    fn parse_bad_signature() {
        let blob = header_bytes(b"ARAP", b"1.00", 16);
        assert_eq!(EctHeader::parse(&blob), Err(EctError::BadSignature));
    }

    #[test]
    fn parse_truncated() {
        assert_eq!(EctHeader::parse(b"PARA1.0"), Err(EctError::Truncated));
        let blob = header_bytes(b"PARA", b"1.00", 8);
        assert_eq!(EctHeader::parse(&blob), Err(EctError::Truncated));
    }

    #[test]
    fn total_size_is_clamped_to_slice() {
        let blob = header_bytes(b"PARA", b"1.00", 0x10_0000);
        let (_, limit) = EctHeader::parse(&blob).unwrap();
        assert_eq!(limit, blob.len());
    }

    #[test]
    fn test_version_detection() {
        let mk = |tag: &[u8; 4]| EctHeader {
            version: *tag,
            total_size: 0,
            blocks: Vec::new(),
        };
        assert!(!mk(b"1.00").is_test_version());
        assert!(!mk(b"1.23").is_test_version());
        assert!(!mk(b"2010").is_test_version());
        assert!(mk(b"2011").is_test_version());
    }
}

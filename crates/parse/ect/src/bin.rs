//! `BIN` block: named opaque payloads.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// A named binary payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    /// Payload name.
    pub name: String,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl Binary {
    /// Returns the shift-xor checksum used by the table dump.
    ///
    /// Each byte is shifted left by its index modulo 32 and xored in.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        self.data
            .iter()
            .enumerate()
            .fold(0u32, |crc, (i, &b)| crc ^ (u32::from(b) << (i & 31)))
    }
}

/// The parsed `BIN` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Payloads in blob order.
    pub binaries: Vec<Binary>,
}

impl BinHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let binaries = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| -> Result<Binary, EctError> {
                let mut r = Reader::at(blob, pos)?;
                let size = r.read_count(1)?;
                Ok(Binary {
                    name,
                    data: r.read_u8_array(size)?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            binaries,
        })
    }

    /// Looks up a payload by exact name.
    #[must_use]
    pub fn binary(&self, name: &str) -> Option<&Binary> {
        self.binaries.iter().find(|b| b.name == name)
    }
}

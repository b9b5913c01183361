//! `MINLOCK` block: per-domain frequency pairs locking a sub-domain's floor.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// One minlock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinlockFrequency {
    /// Main domain frequency in kHz.
    pub main_frequencies: u32,
    /// Minimum sub-domain frequency in kHz.
    pub sub_frequencies: u32,
}

/// A minlock domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinlockDomain {
    /// Domain name.
    pub name: String,
    /// Levels in blob order.
    pub levels: Vec<MinlockFrequency>,
}

/// The parsed `MINLOCK` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinlockHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Domains in blob order.
    pub domains: Vec<MinlockDomain>,
}

impl MinlockHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let domains = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| -> Result<MinlockDomain, EctError> {
                let mut r = Reader::at(blob, pos)?;
                let count = r.read_count(8)?;
                let levels = r
                    .read_u32_array(count * 2)?
                    .chunks_exact(2)
                    .map(|c| MinlockFrequency {
                        main_frequencies: c[0],
                        sub_frequencies: c[1],
                    })
                    .collect();
                Ok(MinlockDomain { name, levels })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            domains,
        })
    }

    /// Looks up a domain by exact name.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&MinlockDomain> {
        self.domains.iter().find(|d| d.name == name)
    }
}

//! `MARGIN` block: per-domain voltage offsets added on top of ASV tables.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;
use crate::values::{GroupValues, PMIC_VOLTAGE_STEP};

/// A margin domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginDomain {
    /// Domain name.
    pub name: String,
    /// Number of ASV groups.
    pub num_of_group: u32,
    /// Number of levels.
    pub num_of_level: u32,
    /// `levels x groups` offsets in microvolts (or volt steps).
    pub offsets: GroupValues,
}

impl MarginDomain {
    fn parse(r: &mut Reader<'_>, parser_version: u32, name: String) -> Result<Self, EctError> {
        let num_of_group = r.read_u32()?;
        let num_of_level = r.read_u32()?;
        let count = (num_of_group as usize)
            .checked_mul(num_of_level as usize)
            .ok_or(EctError::TooLarge)?;
        let offsets = GroupValues::read(r, parser_version >= 2, count, PMIC_VOLTAGE_STEP)?;
        Ok(Self {
            name,
            num_of_group,
            num_of_level,
            offsets,
        })
    }

    /// Returns the offset in microvolts for `group` at `level`.
    #[must_use]
    pub fn offset(&self, level: usize, group: usize) -> Option<i64> {
        self.offsets.at(level, group, self.num_of_group as usize)
    }
}

/// The parsed `MARGIN` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarginHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Domains in table order.
    pub domains: Vec<MarginDomain>,
}

impl MarginHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let domains = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| {
                MarginDomain::parse(&mut Reader::at(blob, pos)?, parser_version, name)
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
    pub fn domain(&self, name: &str) -> Option<&MarginDomain> {
        self.domains.iter().find(|d| d.name == name)
    }
}

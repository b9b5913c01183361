//! `RCC` block. Same domain layout as ASV, one value array per table.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;
use crate::values::GroupValues;

/// One RCC table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RccTable {
    /// Table version this table applies to.
    pub table_version: u32,
    /// `levels x groups` values; compact bytes are unscaled.
    pub values: GroupValues,
}

/// An RCC domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RccDomain {
    /// Domain name.
    pub name: String,
    /// Number of ASV groups.
    pub num_of_group: u32,
    /// Level frequencies in MHz.
    pub level_list: Vec<i32>,
    /// One table per table version.
    pub tables: Vec<RccTable>,
}

impl RccDomain {
    fn parse(r: &mut Reader<'_>, parser_version: u32, name: String) -> Result<Self, EctError> {
        let num_of_group = r.read_u32()?;
        let num_of_level = r.read_count(4)?;
        let num_of_table = r.read_count(4)?;
        let level_list = r.read_i32_array(num_of_level)?;
        let count = (num_of_group as usize)
            .checked_mul(num_of_level)
            .ok_or(EctError::TooLarge)?;
        let tables = (0..num_of_table)
            .map(|_| -> Result<RccTable, EctError> {
                let table_version = r.read_u32()?;
                let values = GroupValues::read(r, parser_version >= 2, count, 1)?;
                Ok(RccTable {
                    table_version,
                    values,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            name,
            num_of_group,
            level_list,
            tables,
        })
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn num_of_level(&self) -> usize {
        self.level_list.len()
    }
}

/// The parsed `RCC` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RccHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Domains in table order.
    pub domains: Vec<RccDomain>,
}

impl RccHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let domains = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| RccDomain::parse(&mut Reader::at(blob, pos)?, parser_version, name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            domains,
        })
    }

    /// Looks up a domain by exact name.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&RccDomain> {
        self.domains.iter().find(|d| d.name == name)
    }
}

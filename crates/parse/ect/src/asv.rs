//! `ASV` block: per-domain voltage tables indexed by level and ASV group.

use alloc::string::String;
use alloc::vec::Vec;

use crate::domain::DomainKind;
use crate::error::EctError;
use crate::reader::Reader;
use crate::values::{GroupValues, PMIC_VOLTAGE_STEP};

/// One ASV voltage table (one per fused table version).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoltageTable {
    /// Table version this table applies to.
    pub table_version: u32,
    /// Boot level index, or -1.
    pub boot_level_idx: i32,
    /// Resume level index, or -1.
    pub resume_level_idx: i32,
    /// Per-level enable words, absent before parser version 2.
    pub level_en: Option<Vec<i32>>,
    /// `levels x groups` voltages in microvolts (or volt steps).
    pub voltages: GroupValues,
}

impl VoltageTable {
    fn parse(
        r: &mut Reader<'_>,
        parser_version: u32,
        levels: usize,
        count: usize,
    ) -> Result<Self, EctError> {
        let table_version = r.read_u32()?;
        let (boot_level_idx, resume_level_idx, level_en) = if parser_version >= 2 {
            let boot = r.read_i32()?;
            let resume = r.read_i32()?;
            (boot, resume, Some(r.read_i32_array(levels)?))
        } else {
            (-1, -1, None)
        };
        let voltages = GroupValues::read(r, parser_version >= 3, count, PMIC_VOLTAGE_STEP)?;
        Ok(Self {
            table_version,
            boot_level_idx,
            resume_level_idx,
            level_en,
            voltages,
        })
    }

    /// Returns `true` if level `lv` is enabled; tables without enable words
    /// treat every level as enabled.
    #[must_use]
    pub fn level_enabled(&self, lv: usize) -> bool {
        self.level_en
            .as_ref()
            .is_none_or(|en| en.get(lv).is_some_and(|&e| e != 0))
    }
}

/// An ASV voltage domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoltageDomain {
    /// Domain name.
    pub name: String,
    /// Kind resolved from the name.
    pub kind: DomainKind,
    /// Number of ASV groups.
    pub num_of_group: u32,
    /// Level frequencies in MHz.
    pub level_list: Vec<i32>,
    /// One table per table version.
    pub tables: Vec<VoltageTable>,
}

impl VoltageDomain {
    fn parse(r: &mut Reader<'_>, parser_version: u32, name: String) -> Result<Self, EctError> {
        let num_of_group = r.read_u32()?;
        let num_of_level = r.read_count(4)?;
        let num_of_table = r.read_count(4)?;
        let level_list = r.read_i32_array(num_of_level)?;
        let count = (num_of_group as usize)
            .checked_mul(num_of_level)
            .ok_or(EctError::TooLarge)?;
        let tables = (0..num_of_table)
            .map(|_| VoltageTable::parse(r, parser_version, num_of_level, count))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            kind: DomainKind::from_name(&name),
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

    /// Returns the voltage in microvolts of `group` at `level` in table `table`.
    #[must_use]
    pub fn voltage(&self, table: usize, level: usize, group: usize) -> Option<i64> {
        self.tables
            .get(table)?
            .voltages
            .at(level, group, self.num_of_group as usize)
    }

    /// Picks the table for `version`.
    ///
    /// An exact match is preferred. Otherwise the last table is used and the
    /// highest available version is returned as the replacement global
    /// table version.
    #[must_use]
    pub fn select_table(&self, version: u32) -> Option<TableSelection> {
        if let Some(index) = self.tables.iter().position(|t| t.table_version == version) {
            return Some(TableSelection {
                index,
                fallback_version: None,
            });
        }
        let max = self.tables.iter().map(|t| t.table_version).max()?;
        Some(TableSelection {
            index: self.tables.len() - 1,
            fallback_version: Some(max),
        })
    }
}

/// Result of [`VoltageDomain::select_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSelection {
    /// Index into [`VoltageDomain::tables`].
    pub index: usize,
    /// Set when no table matched exactly: the version to adopt globally.
    pub fallback_version: Option<u32>,
}

/// The parsed `ASV` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsvHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Domains in table order.
    pub domains: Vec<VoltageDomain>,
}

impl AsvHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let domains = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| {
                VoltageDomain::parse(&mut Reader::at(blob, pos)?, parser_version, name)
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
    pub fn domain(&self, name: &str) -> Option<&VoltageDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Looks up a domain by exact name for modification.
    pub fn domain_mut(&mut self, name: &str) -> Option<&mut VoltageDomain> {
        self.domains.iter_mut().find(|d| d.name == name)
    }

    /// Returns the first domain of the given kind.
    #[must_use]
    pub fn domain_by_kind(&self, kind: DomainKind) -> Option<&VoltageDomain> {
        self.domains.iter().find(|d| d.kind == kind)
    }

    /// Returns the first domain of the given kind for modification.
    pub fn domain_by_kind_mut(&mut self, kind: DomainKind) -> Option<&mut VoltageDomain> {
        self.domains.iter_mut().find(|d| d.kind == kind)
    }
}

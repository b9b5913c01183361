//! `DVFS` block: per-domain level tables of clock member values.

use alloc::string::String;
use alloc::vec::Vec;

use crate::domain::DomainKind;
use crate::error::EctError;
use crate::reader::Reader;

/// How a domain identifies its clock members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MemberMode {
    /// Members are clock names.
    ClockName = 0,
    /// Members are SFR addresses.
    SfrAddress = 1,
}

impl MemberMode {
    fn from_raw(raw: u32) -> Self {
        if raw == Self::SfrAddress as u32 {
            Self::SfrAddress
        } else {
            Self::ClockName
        }
    }
}

/// A clock member of a DVFS domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Member {
    /// Identified by clock name.
    Name(String),
    /// Identified by SFR address.
    Sfr(u32),
}

/// One DVFS level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvfsLevel {
    /// Level frequency in kHz.
    pub level: u32,
    /// Raw enable word; nonzero means the level is usable.
    pub level_en: i32,
}

impl DvfsLevel {
    /// Returns `true` if the level is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.level_en != 0
    }
}

/// A DVFS domain: `levels x members` clock values, level-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvfsDomain {
    /// Domain name, e.g. `"dvfs_g3d"`.
    pub name: String,
    /// Kind resolved from the name.
    pub kind: DomainKind,
    /// Highest frequency in kHz.
    pub max_frequency: u32,
    /// Lowest frequency in kHz.
    pub min_frequency: u32,
    /// Boot level index, or -1.
    pub boot_level_idx: i32,
    /// Resume level index, or -1.
    pub resume_level_idx: i32,
    /// Member identification mode.
    pub mode: MemberMode,
    /// Clock members.
    pub members: Vec<Member>,
    /// Levels, in table order.
    pub levels: Vec<DvfsLevel>,
    /// `levels.len() * members.len()` values.
    pub values: Vec<u32>,
}

impl DvfsDomain {
    fn parse(r: &mut Reader<'_>, parser_version: u32, name: String) -> Result<Self, EctError> {
        let max_frequency = r.read_u32()?;
        let min_frequency = r.read_u32()?;
        let (boot_level_idx, resume_level_idx) = if parser_version >= 2 {
            (r.read_i32()?, r.read_i32()?)
        } else {
            (-1, -1)
        };
        let mode = if parser_version >= 3 {
            MemberMode::from_raw(r.read_u32()?)
        } else {
            MemberMode::ClockName
        };

        let num_of_clock = r.read_count(4)?;
        let num_of_level = r.read_count(8)?;

        let members = match mode {
            MemberMode::SfrAddress => r
                .read_u32_array(num_of_clock)?
                .into_iter()
                .map(Member::Sfr)
                .collect(),
            MemberMode::ClockName => (0..num_of_clock)
                .map(|_| r.read_string_aligned().map(Member::Name))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let levels = r
            .read_i32_array(num_of_level * 2)?
            .chunks_exact(2)
            .map(|c| DvfsLevel {
                level: c[0] as u32,
                level_en: c[1],
            })
            .collect();

        let count = num_of_level
            .checked_mul(num_of_clock)
            .ok_or(EctError::TooLarge)?;
        let values = r.read_u32_array(count)?;

        Ok(Self {
            kind: DomainKind::from_name(&name),
            name,
            max_frequency,
            min_frequency,
            boot_level_idx,
            resume_level_idx,
            mode,
            members,
            levels,
            values,
        })
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn num_of_level(&self) -> usize {
        self.levels.len()
    }

    /// Returns the number of clock members.
    #[must_use]
    pub fn num_of_clock(&self) -> usize {
        self.members.len()
    }

    /// Returns the member values of level `lv`.
    #[must_use]
    pub fn row(&self, lv: usize) -> Option<&[u32]> {
        if lv >= self.num_of_level() {
            return None;
        }
        let m = self.num_of_clock();
        let start = lv.checked_mul(m)?;
        self.values.get(start..start.checked_add(m)?)
    }

    /// Returns the value of member `clock` at level `lv`.
    #[must_use]
    pub fn value(&self, lv: usize, clock: usize) -> Option<u32> {
        self.row(lv)?.get(clock).copied()
    }

    /// Returns `true` if the value table holds exactly `levels x members` entries.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.num_of_level() * self.num_of_clock()
    }
}

/// The parsed `DVFS` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvfsHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Domains in table order.
    pub domains: Vec<DvfsDomain>,
}

impl DvfsHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let domains = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| DvfsDomain::parse(&mut Reader::at(blob, pos)?, parser_version, name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            domains,
        })
    }

    /// Looks up a domain by exact name.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&DvfsDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// Looks up a domain by exact name for modification.
    pub fn domain_mut(&mut self, name: &str) -> Option<&mut DvfsDomain> {
        self.domains.iter_mut().find(|d| d.name == name)
    }

    /// Returns the first domain of the given kind.
    #[must_use]
    pub fn domain_by_kind(&self, kind: DomainKind) -> Option<&DvfsDomain> {
        self.domains.iter().find(|d| d.kind == kind)
    }

    /// Returns the first domain of the given kind for modification.
    pub fn domain_by_kind_mut(&mut self, kind: DomainKind) -> Option<&mut DvfsDomain> {
        self.domains.iter_mut().find(|d| d.kind == kind)
    }
}

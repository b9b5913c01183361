//! `TIMING` and `NEWTIMING` blocks: DRAM timing parameter sets.
//!
//! Both blocks index their bodies by numeric key instead of by name.

use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::{MAX_ENTRIES, Reader};

/// Reads a keyed table: a count followed by `(key, offset)` pairs.
///
/// Keys are 64-bit (low word first) when `wide` is set, 32-bit otherwise.
/// Returns `(key, absolute body position)` pairs.
fn read_key_table(
    r: &mut Reader<'_>,
    base: usize,
    wide: bool,
) -> Result<Vec<(u64, usize)>, EctError> {
    let entry_size = if wide { 12 } else { 8 };
    let count = r.read_count(entry_size)?;
    if count > MAX_ENTRIES {
        return Err(EctError::TooLarge);
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let key = if wide {
            r.read_u64()?
        } else {
            u64::from(r.read_u32()?)
        };
        let offset = r.read_u32()? as usize;
        let pos = base.checked_add(offset).ok_or(EctError::BadOffset)?;
        entries.push((key, pos));
    }

    r.check_bodies(entries.iter().map(|&(_, pos)| pos))?;
    Ok(entries)
}

// ---------------------------------------------------------------------------
// TIMING
// ---------------------------------------------------------------------------

/// One timing parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingParamSize {
    /// 64-bit parameter key (equal to `memory_size` before parser version 3).
    pub parameter_key: u64,
    /// DRAM size this set applies to.
    pub memory_size: u32,
    /// Parameters per level.
    pub num_of_timing_param: u32,
    /// Number of levels.
    pub num_of_level: u32,
    /// `levels x params` values.
    pub timing_parameter: Vec<u32>,
}

/// The parsed `TIMING` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingParamHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Parameter sets in blob order.
    pub sizes: Vec<TimingParamSize>,
}

impl TimingParamHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let sizes = read_key_table(&mut r, base, parser_version >= 3)?
            .into_iter()
            .map(|(key, pos)| -> Result<TimingParamSize, EctError> {
                let mut r = Reader::at(blob, pos)?;
                let num_of_timing_param = r.read_u32()?;
                let num_of_level = r.read_u32()?;
                let count = (num_of_timing_param as usize)
                    .checked_mul(num_of_level as usize)
                    .ok_or(EctError::TooLarge)?;
                Ok(TimingParamSize {
                    parameter_key: key,
                    memory_size: key as u32,
                    num_of_timing_param,
                    num_of_level,
                    timing_parameter: r.read_u32_array(count)?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            sizes,
        })
    }

    /// Returns the parameter set for a DRAM size.
    #[must_use]
    pub fn size(&self, memory_size: u32) -> Option<&TimingParamSize> {
        self.sizes.iter().find(|s| s.memory_size == memory_size)
    }

    /// Returns the parameter set for a 64-bit key.
    #[must_use]
    pub fn key(&self, parameter_key: u64) -> Option<&TimingParamSize> {
        self.sizes.iter().find(|s| s.parameter_key == parameter_key)
    }
}

// ---------------------------------------------------------------------------
// NEWTIMING
// ---------------------------------------------------------------------------

/// Value width of a `NEWTIMING` parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewTimingMode {
    /// 32-bit values.
    Normal,
    /// 64-bit values, low word first.
    Extend,
}

/// Values of a `NEWTIMING` parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewTimingValues {
    /// 32-bit values.
    Normal(Vec<u32>),
    /// 64-bit values.
    Extend(Vec<u64>),
}

impl NewTimingValues {
    /// Returns value `idx`, widened to 64 bits.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<u64> {
        match self {
            Self::Normal(v) => v.get(idx).map(|&x| u64::from(x)),
            Self::Extend(v) => v.get(idx).copied(),
        }
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Normal(v) => v.len(),
            Self::Extend(v) => v.len(),
        }
    }

    /// Returns `true` if there are no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One `NEWTIMING` parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimingParamSize {
    /// 64-bit parameter key.
    pub parameter_key: u64,
    /// Value width.
    pub mode: NewTimingMode,
    /// Parameters per level.
    pub num_of_timing_param: u32,
    /// Number of levels.
    pub num_of_level: u32,
    /// `levels x params` values.
    pub timing_parameter: NewTimingValues,
}

/// The parsed `NEWTIMING` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimingParamHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Parameter sets in blob order.
    pub sizes: Vec<NewTimingParamSize>,
}

impl NewTimingParamHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let sizes = read_key_table(&mut r, base, true)?
            .into_iter()
            .map(|(key, pos)| -> Result<NewTimingParamSize, EctError> {
                let mut r = Reader::at(blob, pos)?;
                let mode = if r.read_u32()? == 1 {
                    NewTimingMode::Extend
                } else {
                    NewTimingMode::Normal
                };
                let num_of_timing_param = r.read_u32()?;
                let num_of_level = r.read_u32()?;
                let count = (num_of_timing_param as usize)
                    .checked_mul(num_of_level as usize)
                    .ok_or(EctError::TooLarge)?;
                let timing_parameter = match mode {
                    NewTimingMode::Normal => NewTimingValues::Normal(r.read_u32_array(count)?),
                    NewTimingMode::Extend => NewTimingValues::Extend(r.read_u64_array(count)?),
                };
                Ok(NewTimingParamSize {
                    parameter_key: key,
                    mode,
                    num_of_timing_param,
                    num_of_level,
                    timing_parameter,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            sizes,
        })
    }

    /// Returns the parameter set for a 64-bit key.
    #[must_use]
    pub fn key(&self, parameter_key: u64) -> Option<&NewTimingParamSize> {
        self.sizes.iter().find(|s| s.parameter_key == parameter_key)
    }
}

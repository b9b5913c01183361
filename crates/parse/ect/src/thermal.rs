//! `THERMAL_AP` and `THERMAL_IF` blocks.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

// ---------------------------------------------------------------------------
// AP thermal
// ---------------------------------------------------------------------------

/// One temperature range of an AP thermal function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApThermalRange {
    /// Lower bound in degrees Celsius.
    pub lower_bound_temperature: u32,
    /// Upper bound in degrees Celsius.
    pub upper_bound_temperature: u32,
    /// Frequency cap in kHz.
    pub max_frequency: u32,
    /// Software trip flag.
    pub sw_trip: u32,
    /// Vendor flag word.
    pub flag: u32,
}

/// A named AP thermal function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApThermalFunction {
    /// Function name.
    pub name: String,
    /// Ranges in table order.
    pub ranges: Vec<ApThermalRange>,
}

/// The parsed `THERMAL_AP` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApThermalHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Functions in blob order.
    pub functions: Vec<ApThermalFunction>,
}

impl ApThermalHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let functions = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| -> Result<ApThermalFunction, EctError> {
                let mut r = Reader::at(blob, pos)?;
                let count = r.read_count(20)?;
                let ranges = r
                    .read_u32_array(count * 5)?
                    .chunks_exact(5)
                    .map(|c| ApThermalRange {
                        lower_bound_temperature: c[0],
                        upper_bound_temperature: c[1],
                        max_frequency: c[2],
                        sw_trip: c[3],
                        flag: c[4],
                    })
                    .collect();
                Ok(ApThermalFunction { name, ranges })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            functions,
        })
    }

    /// Looks up a function by exact name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&ApThermalFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

// ---------------------------------------------------------------------------
// MIF thermal
// ---------------------------------------------------------------------------

/// One MIF thermal level, keyed by the DRAM MR4 temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MifThermalLevel {
    /// MR4 temperature level.
    pub mr4_level: i32,
    /// Frequency cap in kHz.
    pub max_frequency: u32,
    /// Frequency floor in kHz.
    pub min_frequency: u32,
    /// Refresh rate register value.
    pub refresh_rate_value: u32,
    /// MR4 polling period in ms.
    pub polling_period: u32,
    /// Software trip flag.
    pub sw_trip: u32,
}

/// The parsed `THERMAL_IF` block. Levels are stored inline, without names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MifThermalHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Levels in blob order.
    pub levels: Vec<MifThermalLevel>,
}

impl MifThermalHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let count = r.read_count(24)?;
        let levels = r
            .read_u32_array(count * 6)?
            .chunks_exact(6)
            .map(|c| MifThermalLevel {
                mr4_level: c[0] as i32,
                max_frequency: c[1],
                min_frequency: c[2],
                refresh_rate_value: c[3],
                polling_period: c[4],
                sw_trip: c[5],
            })
            .collect();
        Ok(Self {
            parser_version,
            version,
            levels,
        })
    }

    /// Returns the level for MR4 reading `mr4_level`.
    #[must_use]
    pub fn level(&self, mr4_level: i32) -> Option<&MifThermalLevel> {
        self.levels.iter().find(|l| l.mr4_level == mr4_level)
    }
}

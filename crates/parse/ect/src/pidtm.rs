//! `PIDTM` block: PID thermal manager tuning blocks.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// A PID thermal tuning block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidtmBlock {
    /// Block name.
    pub name: String,
    /// Trigger temperatures.
    pub temperatures: Vec<i32>,
    /// Parameter names, aligned with `param_values`.
    pub param_names: Vec<String>,
    /// Parameter values.
    pub param_values: Vec<i32>,
}

impl PidtmBlock {
    fn parse(r: &mut Reader<'_>, name: String) -> Result<Self, EctError> {
        let num_of_temperature = r.read_count(4)?;
        let temperatures = r.read_i32_array(num_of_temperature)?;
        let num_of_parameter = r.read_count(8)?;
        let param_names = (0..num_of_parameter)
            .map(|_| r.read_string_aligned())
            .collect::<Result<Vec<_>, _>>()?;
        let param_values = r.read_i32_array(num_of_parameter)?;
        Ok(Self {
            name,
            temperatures,
            param_names,
            param_values,
        })
    }

    /// Returns the value of the parameter named `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<i32> {
        let idx = self.param_names.iter().position(|n| n == name)?;
        self.param_values.get(idx).copied()
    }
}

/// The parsed `PIDTM` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidtmHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Blocks in blob order.
    pub blocks: Vec<PidtmBlock>,
}

impl PidtmHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let blocks = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| PidtmBlock::parse(&mut Reader::at(blob, pos)?, name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            blocks,
        })
    }

    /// Looks up a block by exact name.
    #[must_use]
    pub fn block(&self, name: &str) -> Option<&PidtmBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

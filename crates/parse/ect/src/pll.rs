//! `PLL` block: per-PLL frequency tables with P/M/S/K dividers.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// One PLL operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllFrequency {
    /// Output frequency in Hz.
    pub frequency: u32,
    /// Pre-divider.
    pub p: u32,
    /// Main divider.
    pub m: u32,
    /// Post-scaler (power of two).
    pub s: u32,
    /// Fractional divider; zero for integer PLLs.
    pub k: u32,
}

impl PllFrequency {
    /// Creates an entry from its five fields.
    #[must_use]
    pub const fn new(frequency: u32, p: u32, m: u32, s: u32, k: u32) -> Self {
        Self {
            frequency,
            p,
            m,
            s,
            k,
        }
    }
}

/// A PLL and its frequency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pll {
    /// PLL name, e.g. `"PLL_G3D"`.
    pub name: String,
    /// PLL type code.
    pub type_pll: u32,
    /// Frequency table in blob order.
    pub frequencies: Vec<PllFrequency>,
}

impl Pll {
    fn parse(r: &mut Reader<'_>, name: String) -> Result<Self, EctError> {
        let type_pll = r.read_u32()?;
        let count = r.read_count(20)?;
        let frequencies = r
            .read_u32_array(count * 5)?
            .chunks_exact(5)
            .map(|c| PllFrequency::new(c[0], c[1], c[2], c[3], c[4]))
            .collect();
        Ok(Self {
            name,
            type_pll,
            frequencies,
        })
    }

    /// Returns the entry with exactly `frequency` Hz.
    #[must_use]
    pub fn frequency(&self, frequency: u32) -> Option<&PllFrequency> {
        self.frequencies.iter().find(|f| f.frequency == frequency)
    }
}

/// The parsed `PLL` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PllHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// PLLs in table order.
    pub plls: Vec<Pll>,
}

impl PllHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let plls = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| Pll::parse(&mut Reader::at(blob, pos)?, name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            plls,
        })
    }

    /// Looks up a PLL by exact name.
    #[must_use]
    pub fn pll(&self, name: &str) -> Option<&Pll> {
        self.plls.iter().find(|p| p.name == name)
    }

    /// Looks up a PLL by exact name for modification.
    pub fn pll_mut(&mut self, name: &str) -> Option<&mut Pll> {
        self.plls.iter_mut().find(|p| p.name == name)
    }
}

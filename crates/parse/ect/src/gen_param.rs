//! `GEN` block: named row-major parameter tables.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// A generic parameter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenParamTable {
    /// Table name, e.g. `"MINMAX_dvfs_g3d"`.
    pub name: String,
    /// Columns per row.
    pub num_of_col: u32,
    /// Number of rows.
    pub num_of_row: u32,
    /// `rows x cols` values, row-major.
    pub parameters: Vec<u32>,
}

impl GenParamTable {
    fn parse(r: &mut Reader<'_>, name: String) -> Result<Self, EctError> {
        let num_of_col = r.read_u32()?;
        let num_of_row = r.read_u32()?;
        let count = (num_of_col as usize)
            .checked_mul(num_of_row as usize)
            .ok_or(EctError::TooLarge)?;
        let parameters = r.read_u32_array(count)?;
        Ok(Self {
            name,
            num_of_col,
            num_of_row,
            parameters,
        })
    }

    /// Returns row `row`.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<&[u32]> {
        if row >= self.num_of_row as usize {
            return None;
        }
        let cols = self.num_of_col as usize;
        let start = row.checked_mul(cols)?;
        self.parameters.get(start..start.checked_add(cols)?)
    }

    /// Returns the value at `(row, col)`.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<u32> {
        self.row(row)?.get(col).copied()
    }

    /// Iterates over all rows.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        (0..self.num_of_row as usize).filter_map(|i| self.row(i))
    }
}

/// The parsed `GEN` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenParamHeader {
    /// Section parser version.
    pub parser_version: u32,
    /// Section version tag.
    pub version: [u8; 4],
    /// Tables in blob order.
    pub tables: Vec<GenParamTable>,
}

impl GenParamHeader {
    pub(crate) fn parse(blob: &[u8], base: usize) -> Result<Self, EctError> {
        let mut r = Reader::at(blob, base)?;
        let parser_version = r.read_u32()?;
        let version = r.read_tag()?;
        let tables = r
            .read_name_table(base)?
            .into_iter()
            .map(|(name, pos)| GenParamTable::parse(&mut Reader::at(blob, pos)?, name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            parser_version,
            version,
            tables,
        })
    }

    /// Looks up a table by exact name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&GenParamTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Looks up a table by exact name for modification.
    pub fn table_mut(&mut self, name: &str) -> Option<&mut GenParamTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}

//! ASV voltage, RCC and SSA tables.
//!
//! Flattens the ECT's per-group encodings into plain microvolt tables:
//! ASV voltages get the matching `MARGIN` domain's offset added, RCC values
//! are used as stored. The SSA and big-cluster turbo parameters come from
//! GEN tables indexed by the ASV table version.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use exynos_core::{kdebug, kwarn};
use exynos_ect::{Ect, GroupValues};

use crate::config::{BIGTURBO_TABLE, SSA_PREFIX};
use crate::error::CalError;
use crate::margin::clamp_uv;

const LOG: &str = "asv";

/// One level of a flattened table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsvEntry {
    /// Level frequency in MHz.
    pub index: i32,
    /// One value per ASV group.
    pub values: Vec<u32>,
}

/// A flattened table for one table version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsvTable {
    /// Table version.
    pub table_version: u32,
    /// Levels in table order.
    pub entries: Vec<AsvEntry>,
}

impl AsvTable {
    /// Returns the value of `group` at every level.
    #[must_use]
    pub fn column(&self, group: usize) -> Vec<u32> {
        self.entries
            .iter()
            .map(|e| e.values.get(group).copied().unwrap_or(0))
            .collect()
    }
}

fn flatten(
    level_list: &[i32],
    groups: usize,
    values: &GroupValues,
    offset: impl Fn(usize, usize) -> i64,
) -> Vec<AsvEntry> {
    level_list
        .iter()
        .enumerate()
        .map(|(lv, &index)| AsvEntry {
            index,
            values: (0..groups)
                .map(|g| clamp_uv(values.at(lv, g, groups).unwrap_or(0) + offset(lv, g)))
                .collect(),
        })
        .collect()
}

/// Builds every voltage table of ASV domain `name`, margins included.
///
/// # Errors
///
/// [`CalError::NotFound`] if there is no ASV block or domain.
pub fn voltage_tables(ect: &Ect, name: &str) -> Result<Vec<AsvTable>, CalError> {
    let domain = ect.asv_domain(name).ok_or(CalError::NotFound)?;
    let margin = ect.margin_domain(name);
    if margin.is_none() {
        kdebug!(target: LOG, "no margin domain for {}", name);
    }
    let groups = domain.num_of_group as usize;
    Ok(domain
        .tables
        .iter()
        .map(|t| AsvTable {
            table_version: t.table_version,
            entries: flatten(&domain.level_list, groups, &t.voltages, |lv, g| {
                margin.and_then(|m| m.offset(lv, g)).unwrap_or(0)
            }),
        })
        .collect())
}

/// Builds every RCC table of domain `name`.
///
/// # Errors
///
/// [`CalError::NotFound`] if there is no RCC block or domain.
pub fn rcc_tables(ect: &Ect, name: &str) -> Result<Vec<AsvTable>, CalError> {
    let domain = ect.rcc_domain(name).ok_or(CalError::NotFound)?;
    let groups = domain.num_of_group as usize;
    Ok(domain
        .tables
        .iter()
        .map(|t| AsvTable {
            table_version: t.table_version,
            entries: flatten(&domain.level_list, groups, &t.values, |_, _| 0),
        })
        .collect())
}

/// Returns the voltages of `group` in the table selected for `version`.
///
/// # Errors
///
/// [`CalError::NotFound`] if the domain or a table for it is absent.
pub fn asv_table(ect: &Ect, name: &str, version: u32, group: usize) -> Result<Vec<u32>, CalError> {
    let domain = ect.asv_domain(name).ok_or(CalError::NotFound)?;
    let sel = domain.select_table(version).ok_or(CalError::NotFound)?;
    let tables = voltage_tables(ect, name)?;
    tables
        .get(sel.index)
        .map(|t| t.column(group))
        .ok_or(CalError::NotFound)
}

// ---------------------------------------------------------------------------
// SSA
// ---------------------------------------------------------------------------

/// Static SSA parameters of one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsaInfo {
    /// ASV sub-group.
    pub subgroup: u32,
    /// SSA0 base voltage.
    pub ssa0_base: u32,
    /// SSA0 offset.
    pub ssa0_offset: u32,
    /// SSA1 table.
    pub ssa1: Vec<u32>,
}

const SUB_GROUP_COL: usize = 1;
const SSA0_BASE_COL: usize = 2;
const SSA0_OFFSET_COL: usize = 3;
const SSA1_FIRST_COL: usize = 4;

/// Returns the GEN table name carrying SSA data for `domain`.
#[must_use]
pub fn ssa_table_name(domain: &str) -> String {
    format!("{SSA_PREFIX}{domain}")
}

/// Reads the SSA row for `version` from `SSA_<domain>`.
///
/// # Errors
///
/// [`CalError::NotFound`] if the table or the row is absent.
pub fn ssa_info(ect: &Ect, domain: &str, version: u32) -> Result<SsaInfo, CalError> {
    let name = ssa_table_name(domain);
    let table = ect.gen_table(&name).ok_or(CalError::NotFound)?;
    let Some(row) = table.row(version as usize) else {
        kwarn!(target: LOG, "{}: no row for table version {}", name, version);
        return Err(CalError::NotFound);
    };
    let col = |c: usize| row.get(c).copied().unwrap_or(0);
    Ok(SsaInfo {
        subgroup: col(SUB_GROUP_COL),
        ssa0_base: col(SSA0_BASE_COL),
        ssa0_offset: col(SSA0_OFFSET_COL),
        ssa1: row.get(SSA1_FIRST_COL..).map(<[u32]>::to_vec).unwrap_or_default(),
    })
}

/// Returns the `BIGTURBO` row for `version`, clamped to the last row.
#[must_use]
pub fn bigturbo_table(ect: &Ect, version: u32) -> Option<&[u32]> {
    let table = ect.gen_table(BIGTURBO_TABLE)?;
    let last = (table.num_of_row as usize).checked_sub(1)?;
    table.row((version as usize).min(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use alloc::vec;
    use exynos_ect::builder::EctBuilder;
    use exynos_ect::{Block, GenParamHeader, GenParamTable, RccDomain, RccHeader, RccTable};

    fn gen_ect(tables: Vec<GenParamTable>) -> Ect {
        let blob = EctBuilder::new()
            .block(
                "GEN",
                Block::Gen(GenParamHeader {
                    parser_version: 1,
                    version: *b"0001",
                    tables,
                }),
            )
            .block(
                "RCC",
                Block::Rcc(RccHeader {
                    parser_version: 2,
                    version: *b"0002",
                    domains: vec![RccDomain {
                        name: String::from("dvfs_g3d"),
                        num_of_group: 1,
                        level_list: vec![500, 400],
                        tables: vec![RccTable {
                            table_version: 0,
                            values: GroupValues::Compact {
                                steps: vec![9, 7],
                                step: 1,
                            },
                        }],
                    }],
                }),
            )
            .build();
        Ect::parse(&blob).unwrap()
    }

    #[test]
    fn voltages_include_margin() {
        let ect = testutil::g3d_ect();
        let tables = voltage_tables(&ect, "dvfs_g3d").unwrap();
        assert_eq!(tables.len(), 2);
        let t = &tables[0];
        assert_eq!(t.entries[0].index, 858);
        // Group 0 has no margin, group 1 has 12500 base offset plus 6250 margin.
        assert_eq!(t.entries[0].values, vec![850_000, 868_750]);
        assert_eq!(tables[1].entries[1].values[0], 831_250);
        assert_eq!(voltage_tables(&ect, "dvfs_mif"), Err(CalError::NotFound));
    }

    #[test]
    fn asv_table_selects_version() {
        let ect = testutil::g3d_ect();
        let v = asv_table(&ect, "dvfs_g3d", 1, 0).unwrap();
        assert_eq!(v.len(), 11);
        assert_eq!(v[0], 856_250);
        // Unknown version falls back to the last table.
        assert_eq!(asv_table(&ect, "dvfs_g3d", 7, 0).unwrap()[0], 856_250);
    }

    #[test]
    fn rcc_values_are_unscaled() {
        let ect = gen_ect(vec![]);
        let t = rcc_tables(&ect, "dvfs_g3d").unwrap();
        assert_eq!(t[0].column(0), vec![9, 7]);
        assert_eq!(t[0].entries[1].index, 400);
    }

    #[test]
    fn ssa_row_by_version() {
        let ect = gen_ect(vec![GenParamTable {
            name: String::from("SSA_dvfs_g3d"),
            num_of_col: 6,
            num_of_row: 2,
            parameters: vec![0, 1, 600, 10, 5, 6, 1, 2, 625, 20, 7, 8],
        }]);
        let s = ssa_info(&ect, "dvfs_g3d", 1).unwrap();
        assert_eq!(
            s,
            SsaInfo {
                subgroup: 2,
                ssa0_base: 625,
                ssa0_offset: 20,
                ssa1: vec![7, 8],
            }
        );
        assert_eq!(ssa_info(&ect, "dvfs_g3d", 2), Err(CalError::NotFound));
        assert_eq!(ssa_info(&ect, "dvfs_mif", 0), Err(CalError::NotFound));
    }

    #[test]
    fn bigturbo_clamps_row() {
        let ect = gen_ect(vec![GenParamTable {
            name: String::from("BIGTURBO"),
            num_of_col: 2,
            num_of_row: 2,
            parameters: vec![1, 2, 3, 4],
        }]);
        assert_eq!(bigturbo_table(&ect, 0), Some(&[1, 2][..]));
        assert_eq!(bigturbo_table(&ect, 9), Some(&[3, 4][..]));
        assert_eq!(bigturbo_table(&testutil::g3d_ect(), 0), None);
    }
}

//! Virtual clocks and their lookup tables.
//!
//! A [`Vclk`] is the runtime view of one DVFS domain: its members resolved
//! to clock ids, one [`LutRow`] per level, and the max/min/boot/resume
//! frequencies. Rows are built from the (already overridden) ECT DVFS
//! domain, then adjusted by the `MINMAX_<name>` GEN table or the ASV
//! enable flags.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use exynos_core::{kdebug, kerr, kinfo, kwarn};
use exynos_ect::{DomainKind, DvfsDomain, Ect, Member};

use crate::clk::{ClkId, ClockTree};
use crate::config::MINMAX_PREFIX;
use crate::error::CalError;
use crate::margin::MarginCategory;
use crate::transition::{SeqEntry, SwitchInfo, TransOps};

const LOG: &str = "vclk";

/// Identifier of a DFS vclk: a type tag above the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VclkId(u32);

impl VclkId {
    /// Type tag of DFS vclks.
    pub const DFS_BASE: u32 = 0x0B00_0000;
    const INDEX_MASK: u32 = 0xFFFF;

    /// Returns the id of the `index`th vclk.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(Self::DFS_BASE | (index & Self::INDEX_MASK))
    }

    /// Parses a raw id, rejecting anything that is not a DFS vclk.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw & !Self::INDEX_MASK == Self::DFS_BASE {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the vclk index.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }
}

impl fmt::Display for VclkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// One LUT row: a rate and the member values that produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LutRow {
    /// Rate in kHz.
    pub rate: u32,
    /// One value per member, aligned with [`Vclk::members`].
    pub params: Vec<u32>,
}

/// Static description of a vclk, supplied by the SoC.
#[derive(Clone, Default)]
pub struct VclkSpec {
    /// DVFS domain name, e.g. `"dvfs_g3d"`.
    pub name: String,
    /// Margin category of the domain's voltage rail.
    pub margin: Option<MarginCategory>,
    /// Auxiliary PLL used while the main PLL relocks.
    pub switch: Option<SwitchInfo>,
    /// Per-member write order; empty for the default order.
    pub seq: Vec<SeqEntry>,
    /// Clocks toggled by enable and disable requests.
    pub gates: Vec<ClkId>,
}

impl VclkSpec {
    /// Creates a spec with only a domain name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: String::from(name),
            ..Self::default()
        }
    }
}

/// A virtual clock.
#[derive(Clone)]
pub struct Vclk {
    /// Id of this vclk.
    pub id: VclkId,
    /// Index of this vclk's domain in the firmware FVMAP.
    pub fvmap_domain: usize,
    /// DVFS domain name.
    pub name: String,
    /// Domain kind.
    pub kind: DomainKind,
    /// Margin category.
    pub margin: Option<MarginCategory>,
    /// Members; [`ClkId::INVALID`] where a member did not resolve.
    pub members: Vec<ClkId>,
    /// Rows, in DVFS level order.
    pub lut: Vec<LutRow>,
    /// Highest rate in kHz; zero when unknown.
    pub max_freq: u32,
    /// Lowest rate in kHz; zero when unknown.
    pub min_freq: u32,
    /// Boot rate in kHz; zero falls back to the live rate.
    pub boot_freq: u32,
    /// Resume rate in kHz; zero falls back to the live rate.
    pub resume_freq: u32,
    /// Last requested rate.
    pub vrate: u32,
    /// `true` when a `MINMAX_<name>` row set the limits.
    pub has_minmax: bool,
    /// Auxiliary PLL switching.
    pub switch: Option<SwitchInfo>,
    /// Per-member write order.
    pub seq: Vec<SeqEntry>,
    /// Clocks toggled by enable and disable requests.
    pub gates: Vec<ClkId>,
    /// Transition hooks.
    pub ops: Option<Arc<dyn TransOps>>,
}

impl fmt::Debug for Vclk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vclk")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members)
            .field("rows", &self.lut.len())
            .field("max_freq", &self.max_freq)
            .field("min_freq", &self.min_freq)
            .field("vrate", &self.vrate)
            .finish_non_exhaustive()
    }
}

fn khz(mhz: u32) -> u32 {
    mhz.saturating_mul(1000)
}

fn level_khz(level_list: &[i32], idx: usize) -> u32 {
    level_list
        .get(idx)
        .and_then(|&mhz| u32::try_from(mhz).ok())
        .map_or(0, khz)
}

impl Vclk {
    /// Builds a vclk from its DVFS domain.
    ///
    /// `extra_rates` (kHz) are inserted into GPU LUTs that lack them.
    ///
    /// # Errors
    ///
    /// [`CalError::NotFound`] without a DVFS block, [`CalError::InvalidArgument`]
    /// if the domain is missing or has no levels or members,
    /// [`CalError::NoMemory`] if the LUT cannot grow.
    pub fn build(
        id: VclkId,
        spec: &VclkSpec,
        ect: &Ect,
        tree: &ClockTree,
        asv_version: u32,
        extra_rates: &[u32],
    ) -> Result<Self, CalError> {
        if ect.dvfs().is_none() {
            kerr!(target: LOG, "{}: no DVFS block", spec.name);
            return Err(CalError::NotFound);
        }
        let Some(domain) = ect.dvfs_domain(&spec.name) else {
            kerr!(target: LOG, "{}: no DVFS domain", spec.name);
            return Err(CalError::InvalidArgument);
        };
        if domain.num_of_level() == 0 || domain.num_of_clock() == 0 {
            kerr!(
                target: LOG,
                "{}: empty domain ({} levels, {} members)",
                spec.name, domain.num_of_level(), domain.num_of_clock()
            );
            return Err(CalError::InvalidArgument);
        }
        if !domain.is_consistent() {
            kerr!(
                target: LOG,
                "{}: {} values, expected {}",
                spec.name, domain.values.len(), domain.num_of_level() * domain.num_of_clock()
            );
            return Err(CalError::InvalidArgument);
        }

        let members = resolve_members(&spec.name, &domain.members, tree);
        let mut lut = Vec::new();
        lut.try_reserve_exact(domain.num_of_level())?;
        for (lv, level) in domain.levels.iter().enumerate() {
            lut.push(LutRow {
                rate: level.level,
                params: domain.row(lv).map(<[u32]>::to_vec).unwrap_or_default(),
            });
        }

        let mut vclk = Self {
            id,
            fvmap_domain: id.index(),
            name: spec.name.clone(),
            kind: domain.kind,
            margin: spec.margin,
            members,
            lut,
            max_freq: 0,
            min_freq: 0,
            boot_freq: 0,
            resume_freq: 0,
            vrate: 0,
            has_minmax: false,
            switch: spec.switch.clone(),
            seq: spec.seq.clone(),
            gates: spec.gates.clone(),
            ops: None,
        };

        if !vclk.apply_minmax(ect, asv_version) {
            vclk.apply_domain_limits(domain);
        }
        if vclk.kind == DomainKind::Gpu && !extra_rates.is_empty() {
            vclk.insert_rates(extra_rates)?;
        }
        kinfo!(
            target: LOG,
            "{}: {} rows, max {} min {} boot {} resume {}",
            vclk.name, vclk.lut.len(), vclk.max_freq, vclk.min_freq, vclk.boot_freq, vclk.resume_freq
        );
        Ok(vclk)
    }

    fn rate_at(&self, idx: i32) -> u32 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.lut.get(i))
            .map_or(0, |r| r.rate)
    }

    fn apply_domain_limits(&mut self, domain: &DvfsDomain) {
        self.max_freq = domain.max_frequency;
        self.min_freq = domain.min_frequency;
        self.boot_freq = self.rate_at(domain.boot_level_idx);
        self.resume_freq = self.rate_at(domain.resume_level_idx);
    }

    /// Applies the `MINMAX_<name>` row for `asv_version`, or the last row.
    fn apply_minmax(&mut self, ect: &Ect, asv_version: u32) -> bool {
        let name = format!("{MINMAX_PREFIX}{}", self.name);
        let Some(table) = ect.gen_table(&name) else {
            return false;
        };
        let row = table
            .rows()
            .find(|r| r.first() == Some(&asv_version))
            .or_else(|| table.rows().last());
        let Some(&[_, max, min, boot, resume, ..]) = row else {
            kwarn!(target: LOG, "{}: malformed, ignored", name);
            return false;
        };
        let lut_rate = |mhz: u32| {
            let rate = khz(mhz);
            self.lut.iter().find(|r| r.rate == rate).map_or(0, |r| r.rate)
        };
        self.boot_freq = lut_rate(boot);
        self.resume_freq = lut_rate(resume);
        self.max_freq = khz(max);
        self.min_freq = khz(min);
        self.has_minmax = true;
        kdebug!(target: LOG, "{}: limits from {}", self.name, name);
        true
    }

    /// Inserts every rate in `rates` the LUT does not have, keeping the
    /// LUT's sort direction.
    fn insert_rates(&mut self, rates: &[u32]) -> Result<(), CalError> {
        let descending = match self.lut.as_slice() {
            [a, b, ..] => b.rate < a.rate,
            _ => true,
        };
        let orig_max = self.max_freq;
        let mut highest = 0;
        let mut added = 0usize;
        for &rate in rates {
            highest = highest.max(rate);
            if self.lut.iter().any(|r| r.rate == rate) {
                continue;
            }
            let pos = self
                .lut
                .iter()
                .position(|r| if descending { r.rate < rate } else { r.rate > rate })
                .unwrap_or(self.lut.len());
            let Some(template) = self.lut.get(pos).or_else(|| self.lut.last()) else {
                break;
            };
            let mut params = template.params.clone();
            for (p, id) in params.iter_mut().zip(&self.members) {
                if id.is_pll() {
                    *p = rate;
                }
            }
            self.lut.try_reserve(1)?;
            self.lut.insert(pos, LutRow { rate, params });
            added += 1;
        }
        if highest > self.max_freq {
            self.max_freq = highest;
            if self.boot_freq == orig_max {
                self.boot_freq = highest;
            }
            if self.resume_freq == orig_max {
                self.resume_freq = highest;
            }
        }
        self.min_freq = self.min_freq.min(self.max_freq);
        if added > 0 {
            kinfo!(target: LOG, "{}: inserted {} rates, {} rows", self.name, added, self.lut.len());
        }
        Ok(())
    }

    /// Derives the limits from the ASV table for `asv_version`.
    ///
    /// Returns the table version to adopt globally when no table matched
    /// exactly.
    ///
    /// # Errors
    ///
    /// [`CalError::NotFound`] if the ASV block, domain or tables are absent.
    pub fn apply_asv_info(&mut self, ect: &Ect, asv_version: u32) -> Result<Option<u32>, CalError> {
        let domain = ect.asv_domain(&self.name).ok_or(CalError::NotFound)?;
        let sel = domain.select_table(asv_version).ok_or(CalError::NotFound)?;
        let table = domain.tables.get(sel.index).ok_or(CalError::NotFound)?;
        if let Some(v) = sel.fallback_version {
            kwarn!(target: LOG, "{}: no ASV table {}, using {}", self.name, asv_version, v);
        }

        let levels = domain.num_of_level();
        match (0..levels).find(|&lv| table.level_enabled(lv)) {
            Some(max_lv) => {
                let min_lv = (max_lv + 1..levels)
                    .find(|&lv| !table.level_enabled(lv))
                    .map_or(levels - 1, |lv| lv - 1);
                self.max_freq = level_khz(&domain.level_list, max_lv);
                self.min_freq = level_khz(&domain.level_list, min_lv);
            }
            None => {
                kwarn!(target: LOG, "{}: no enabled ASV level", self.name);
                self.max_freq = 0;
                self.min_freq = 0;
            }
        }
        if let Ok(idx) = usize::try_from(table.boot_level_idx) {
            self.boot_freq = level_khz(&domain.level_list, idx);
        }
        if let Ok(idx) = usize::try_from(table.resume_level_idx) {
            self.resume_freq = level_khz(&domain.level_list, idx);
        }
        Ok(sel.fallback_version)
    }

    /// Returns the first row whose rate does not exceed `rate`.
    #[must_use]
    pub fn get_lut(&self, rate: u32) -> Option<&LutRow> {
        self.lut.iter().find(|r| rate >= r.rate)
    }

    /// Returns the rates of every row.
    #[must_use]
    pub fn rate_table(&self) -> Vec<u32> {
        self.lut.iter().map(|r| r.rate).collect()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn lv_num(&self) -> usize {
        self.lut.len()
    }

    /// Returns `true` if every row has one value per member.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.lut.iter().all(|r| r.params.len() == self.members.len())
    }
}

fn resolve_members(name: &str, members: &[Member], tree: &ClockTree) -> Vec<ClkId> {
    members
        .iter()
        .map(|m| {
            let id = match m {
                Member::Name(n) => tree.id_by_name(n),
                Member::Sfr(addr) => tree.id_by_addr(*addr),
            };
            id.unwrap_or_else(|| {
                kwarn!(target: LOG, "{}: unresolved member {:?}", name, m);
                ClkId::INVALID
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalConfig, G3D_OPERATING_POINTS};
    use crate::override_engine;
    use crate::soc;
    use crate::testutil;
    use alloc::vec;
    use exynos_ect::builder::EctBuilder;
    use exynos_ect::{Block, GenParamHeader, GenParamTable};

    fn g3d(ect: &Ect, extra: &[u32]) -> Vclk {
        let tree = soc::g3d_clock_tree();
        Vclk::build(VclkId::new(0), &VclkSpec::named("dvfs_g3d"), ect, &tree, 0, extra).unwrap()
    }

    #[test]
    fn vclk_ids() {
        let id = VclkId::new(3);
        assert_eq!(id.raw(), 0x0B00_0003);
        assert_eq!(id.index(), 3);
        assert_eq!(VclkId::from_raw(0x0B00_0003), Some(id));
        assert_eq!(VclkId::from_raw(0x0A00_0003), None);
        assert_eq!(VclkId::from_raw(0), None);
    }

    #[test]
    fn build_from_firmware_domain() {
        let ect = testutil::g3d_ect();
        let v = g3d(&ect, &[]);
        assert_eq!(v.lv_num(), 11);
        assert!(v.is_aligned());
        assert!(v.members.iter().all(|m| m.is_valid()));
        assert!(v.members[0].is_pll());
        assert_eq!(v.max_freq, 858_000);
        assert_eq!(v.boot_freq, 754_000);
        assert!(!v.has_minmax);
    }

    #[test]
    fn get_lut_picks_first_row_at_or_below() {
        let ect = testutil::g3d_ect();
        let v = g3d(&ect, &[]);
        assert_eq!(v.get_lut(858_000).map(|r| r.rate), Some(858_000));
        assert_eq!(v.get_lut(800_000).map(|r| r.rate), Some(754_000));
        assert_eq!(v.get_lut(1_000_000).map(|r| r.rate), Some(858_000));
        assert!(v.get_lut(100_000).is_none());
    }

    #[test]
    fn extra_rates_are_inserted_in_order() {
        let ect = testutil::g3d_ect();
        let extra: Vec<u32> = G3D_OPERATING_POINTS.iter().map(|o| o.rate_khz).collect();
        let v = g3d(&ect, &extra);
        assert_eq!(v.lv_num(), 16);
        assert!(v.is_aligned());
        let rates = v.rate_table();
        assert!(rates.windows(2).all(|w| w[0] > w[1]));
        // 598000 copies the 572000 row below it, with its own PLL rate.
        let row = v.get_lut(598_000).unwrap();
        assert_eq!(row.rate, 598_000);
        assert_eq!(row.params, vec![598_000, 1, 0]);
        // 100000 is appended with the last row as template.
        assert_eq!(v.lut[15].params, vec![100_000, 1, 0]);
        assert_eq!(v.max_freq, 910_000);
        assert_eq!(v.min_freq, 156_000);
    }

    #[test]
    fn overridden_domain_needs_no_insertion() {
        let mut ect = testutil::g3d_ect();
        let cfg = CalConfig::default();
        override_engine::apply(&mut ect, &cfg);
        let v = g3d(&ect, &cfg.extra_gpu_rates);
        assert_eq!(v.lv_num(), 16);
        assert_eq!(v.lut[0].rate, 910_000);
        assert_eq!(v.max_freq, 910_000);
    }

    #[test]
    fn minmax_row_by_asv_version() {
        let mut blob_ect = testutil::g3d_ect();
        let params = GenParamHeader {
            parser_version: 1,
            version: *b"0001",
            tables: vec![GenParamTable {
                name: String::from("MINMAX_dvfs_g3d"),
                num_of_col: 5,
                num_of_row: 2,
                parameters: vec![0, 806, 260, 702, 650, 3, 754, 156, 754, 999],
            }],
        };
        let minmax = Ect::parse(&EctBuilder::new().block("GEN", Block::Gen(params)).build()).unwrap();
        *blob_ect.gen_param_mut().unwrap() = minmax.gen_param().unwrap().clone();

        let tree = soc::g3d_clock_tree();
        let spec = VclkSpec::named("dvfs_g3d");
        let v = Vclk::build(VclkId::new(0), &spec, &blob_ect, &tree, 0, &[]).unwrap();
        assert!(v.has_minmax);
        assert_eq!((v.max_freq, v.min_freq), (806_000, 260_000));
        assert_eq!((v.boot_freq, v.resume_freq), (702_000, 650_000));

        // No row for version 9: the last row applies; 999 MHz is not a LUT rate.
        let v = Vclk::build(VclkId::new(0), &spec, &blob_ect, &tree, 9, &[]).unwrap();
        assert_eq!((v.max_freq, v.min_freq), (754_000, 156_000));
        assert_eq!((v.boot_freq, v.resume_freq), (754_000, 0));
    }

    #[test]
    fn asv_info_uses_enable_flags() {
        let mut ect = testutil::g3d_ect();
        let t = &mut ect.asv_mut().unwrap().domains[0].tables[0];
        let en = t.level_en.as_mut().unwrap();
        en[0] = 0;
        en[8] = 0;
        let mut v = g3d(&ect, &[]);
        assert_eq!(v.apply_asv_info(&ect, 0), Ok(None));
        assert_eq!(v.max_freq, 806_000);
        assert_eq!(v.min_freq, 377_000);
        assert_eq!(v.boot_freq, 754_000);
        assert_eq!(v.apply_asv_info(&ect, 5), Ok(Some(1)));
        assert_eq!(v.max_freq, 858_000);
        assert_eq!(v.min_freq, 156_000);
    }

    #[test]
    fn missing_domain_is_invalid() {
        let ect = testutil::g3d_ect();
        let tree = soc::g3d_clock_tree();
        let spec = VclkSpec::named("dvfs_mif");
        assert_eq!(
            Vclk::build(VclkId::new(1), &spec, &ect, &tree, 0, &[]).map(|_| ()),
            Err(CalError::InvalidArgument)
        );
        let empty = testutil::empty_ect();
        assert_eq!(
            Vclk::build(VclkId::new(1), &spec, &empty, &tree, 0, &[]).map(|_| ()),
            Err(CalError::NotFound)
        );
    }

    #[test]
    fn unresolved_members_keep_alignment() {
        let ect = testutil::g3d_ect();
        let v = Vclk::build(
            VclkId::new(0),
            &VclkSpec::named("dvfs_g3d"),
            &ect,
            &ClockTree::new(),
            0,
            &[],
        )
        .unwrap();
        assert_eq!(v.members, vec![ClkId::INVALID; 3]);
        assert!(v.is_aligned());
    }
}

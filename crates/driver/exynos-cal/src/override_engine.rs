//! GPU table override.
//!
//! Firmware ships a GPU DVFS table with fewer levels than the operating
//! points in [`CalConfig::operating_points`]. Before any LUT is built the
//! parsed tables are patched in place so that every GPU-related table
//! (DVFS levels and values, ASV voltages, the dynamic-droop margin table
//! and the `PLL_G3D` divider table) covers the full operating point list.
//!
//! Each step is independent and idempotent: a table that already covers
//! the list is left alone. An allocation failure leaves the affected table
//! exactly as it was.

use alloc::vec::Vec;

use exynos_core::{kdebug, kerr, kinfo, kwarn};
use exynos_ect::{DomainKind, DvfsLevel, Ect, Member, PllFrequency};

use crate::config::{
    CalConfig, G3D_DD_DEFAULT_MARGIN_UV, G3D_DD_MARGIN_TABLE, G3D_PLL_NAME, OperatingPoint,
    OverrideValuePolicy,
};
use crate::error::CalError;

const LOG: &str = "override";

/// Outcome of each override step; `Ok(true)` means the table changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverrideReport {
    /// GPU DVFS levels and values.
    pub dvfs: Result<bool, CalError>,
    /// GPU ASV voltage tables.
    pub asv: Result<bool, CalError>,
    /// `G3D_DD_margin` GEN table.
    pub dd_margin: Result<bool, CalError>,
    /// `PLL_G3D` divider table.
    pub pll: Result<bool, CalError>,
}

impl OverrideReport {
    /// Returns `true` if any step changed a table.
    #[must_use]
    pub fn changed(&self) -> bool {
        [self.dvfs, self.asv, self.dd_margin, self.pll]
            .into_iter()
            .any(|r| r == Ok(true))
    }
}

/// Runs every override step against `ect`.
///
/// Failures are logged and reported per step; a failed step does not stop
/// the others.
pub fn apply(ect: &mut Ect, config: &CalConfig) -> OverrideReport {
    let ops = config.operating_points.as_slice();
    let report = OverrideReport {
        dvfs: override_dvfs(ect, ops, config.value_policy),
        asv: override_asv(ect, ops),
        dd_margin: override_dd_margin(ect, ops.len()),
        pll: override_pll(ect, &config.pll_table),
    };
    for (step, r) in [
        ("dvfs", report.dvfs),
        ("asv", report.asv),
        ("dd margin", report.dd_margin),
        ("pll", report.pll),
    ] {
        match r {
            Ok(true) => kinfo!(target: LOG, "{} override applied", step),
            Ok(false) => kdebug!(target: LOG, "{} override not needed", step),
            Err(CalError::NoMemory) => {
                kerr!(target: LOG, "{} override: allocation failed, table left unchanged", step);
            }
            Err(e) => kwarn!(target: LOG, "{} override skipped: {}", step, e),
        }
    }
    report
}

/// Returns `true` for members that name a PLL.
#[must_use]
pub fn is_pll_member(member: &Member) -> bool {
    matches!(member, Member::Name(n) if n.starts_with("PLL"))
}

/// Returns the index of the rate in `rates` closest to `target`; ties go to
/// the lowest index.
#[must_use]
pub fn nearest_rate(rates: impl IntoIterator<Item = u32>, target: u32) -> Option<usize> {
    rates
        .into_iter()
        .enumerate()
        .min_by_key(|&(i, r)| (r.abs_diff(target), i))
        .map(|(i, _)| i)
}

pub(crate) fn try_vec<T>(len: usize) -> Result<Vec<T>, CalError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    Ok(v)
}

// ---------------------------------------------------------------------------
// DVFS
// ---------------------------------------------------------------------------

/// Expands the GPU DVFS domain to the operating point list.
///
/// # Errors
///
/// [`CalError::NotFound`] if there is no DVFS block or GPU domain,
/// [`CalError::NoMemory`] if the new tables cannot be allocated.
pub fn override_dvfs(
    ect: &mut Ect,
    ops: &[OperatingPoint],
    policy: OverrideValuePolicy,
) -> Result<bool, CalError> {
    let domain = ect
        .dvfs_mut()
        .and_then(|d| d.domain_by_kind_mut(DomainKind::Gpu))
        .ok_or(CalError::NotFound)?;

    let old_lv = domain.num_of_level();
    if old_lv >= ops.len() {
        if old_lv > ops.len() {
            kinfo!(
                target: LOG,
                "{}: {} levels already exceed the {} operating points, kept as is",
                domain.name, old_lv, ops.len()
            );
        }
        return Ok(false);
    }
    let m = domain.num_of_clock();

    let mut levels = try_vec(ops.len())?;
    let mut values = try_vec(ops.len() * m)?;
    for (i, op) in ops.iter().enumerate() {
        levels.push(DvfsLevel {
            level: op.rate_khz,
            level_en: 1,
        });
        match policy {
            OverrideValuePolicy::IdentityIndex => {
                let idx = u32::try_from(i).unwrap_or(u32::MAX);
                values.extend(core::iter::repeat_n(idx, m));
            }
            OverrideValuePolicy::NearestRate => {
                let near = nearest_rate(domain.levels.iter().map(|l| l.level), op.rate_khz);
                let row = near.and_then(|j| domain.row(j));
                for (c, member) in domain.members.iter().enumerate() {
                    let v = if is_pll_member(member) {
                        op.rate_khz
                    } else {
                        row.and_then(|r| r.get(c).copied()).unwrap_or(0)
                    };
                    values.push(v);
                }
            }
        }
    }

    let remap = |idx: i32| -> i32 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| domain.levels.get(i))
            .and_then(|l| nearest_rate(ops.iter().map(|o| o.rate_khz), l.level))
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(-1)
    };
    domain.boot_level_idx = remap(domain.boot_level_idx);
    domain.resume_level_idx = remap(domain.resume_level_idx);

    kinfo!(
        target: LOG,
        "{}: {} -> {} levels, {} members",
        domain.name, old_lv, ops.len(), m
    );
    domain.levels = levels;
    domain.values = values;
    if let (Some(first), Some(last)) = (ops.first(), ops.last()) {
        domain.max_frequency = first.rate_khz;
        domain.min_frequency = last.rate_khz;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// ASV
// ---------------------------------------------------------------------------

/// Extends the GPU ASV voltage domain to the operating point list by
/// repeating the top row.
///
/// Boot and resume indices follow their rate onto the new level list. The
/// matching `MARGIN` domain grows by the same number of top rows so every
/// voltage row keeps the margin it had.
///
/// # Errors
///
/// [`CalError::NotFound`] if there is no ASV block or GPU domain,
/// [`CalError::NoMemory`] if a table cannot grow.
pub fn override_asv(ect: &mut Ect, ops: &[OperatingPoint]) -> Result<bool, CalError> {
    let domain = ect
        .asv()
        .and_then(|a| a.domain_by_kind(DomainKind::Gpu))
        .ok_or(CalError::NotFound)?;

    let old_lv = domain.num_of_level();
    if old_lv >= ops.len() {
        return Ok(false);
    }
    let delta = ops.len() - old_lv;
    let groups = domain.num_of_group as usize;

    // Build everything first so a failed allocation leaves both blocks alone.
    let remap = |idx: i32| -> i32 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| domain.level_list.get(i))
            .and_then(|&mhz| u32::try_from(mhz).ok())
            .and_then(|mhz| nearest_rate(ops.iter().map(OperatingPoint::rate_mhz), mhz))
            .and_then(|i| i32::try_from(i).ok())
            .unwrap_or(idx)
    };
    let mut tables = try_vec(domain.tables.len())?;
    for t in &domain.tables {
        let mut t = t.clone();
        t.voltages.try_prepend_first_row(groups, delta)?;
        if let Some(en) = t.level_en.as_mut() {
            let mut out = try_vec(en.len() + delta)?;
            if let Some(&first) = en.first() {
                out.extend(core::iter::repeat_n(first, delta));
            }
            out.extend_from_slice(en);
            *en = out;
        }
        t.boot_level_idx = remap(t.boot_level_idx);
        t.resume_level_idx = remap(t.resume_level_idx);
        tables.push(t);
    }
    let mut level_list = try_vec(ops.len())?;
    level_list.extend(
        ops.iter()
            .map(|o| i32::try_from(o.rate_mhz()).unwrap_or(i32::MAX)),
    );
    let name = domain.name.clone();

    let margin = match ect.margin_domain(&name) {
        Some(m) if m.num_of_level as usize == old_lv => {
            let mut offsets = m.offsets.clone();
            offsets.try_prepend_first_row(m.num_of_group as usize, delta)?;
            let levels = u32::try_from(ops.len()).map_err(|_| CalError::Range)?;
            Some((offsets, levels))
        }
        Some(m) => {
            kwarn!(
                target: LOG,
                "{}: margin has {} levels, ASV has {}, margin left as is",
                name, m.num_of_level, old_lv
            );
            None
        }
        None => None,
    };

    kinfo!(
        target: LOG,
        "{}: {} -> {} ASV levels across {} tables",
        name, old_lv, ops.len(), tables.len()
    );
    if let Some(d) = ect
        .asv_mut()
        .and_then(|a| a.domain_by_kind_mut(DomainKind::Gpu))
    {
        d.level_list = level_list;
        d.tables = tables;
    }
    if let (Some((offsets, levels)), Some(m)) = (margin, ect.margin_domain_mut(&name)) {
        m.offsets = offsets;
        m.num_of_level = levels;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// GEN dynamic-droop margin
// ---------------------------------------------------------------------------

/// Extends `G3D_DD_margin` to `levels` rows.
///
/// New top rows carry the old top margin, or a default when that is zero;
/// old rows keep their margins and shift their level index down.
///
/// # Errors
///
/// [`CalError::NotFound`] if the GEN block or table is absent,
/// [`CalError::NoMemory`] if the table cannot grow.
pub fn override_dd_margin(ect: &mut Ect, levels: usize) -> Result<bool, CalError> {
    let table = ect
        .gen_table_mut(G3D_DD_MARGIN_TABLE)
        .ok_or(CalError::NotFound)?;

    let rows = table.num_of_row as usize;
    if table.num_of_col != 2 || rows == 0 || rows >= levels {
        return Ok(false);
    }
    let delta = levels - rows;
    let top = match table.value(0, 1) {
        Some(0) | None => G3D_DD_DEFAULT_MARGIN_UV,
        Some(v) => v,
    };
    let shift = u32::try_from(delta).map_err(|_| CalError::Range)?;

    let mut params = try_vec(levels * 2)?;
    for i in 0..shift {
        params.extend_from_slice(&[i, top]);
    }
    for row in table.rows() {
        params.extend_from_slice(&[row[0].saturating_add(shift), row[1]]);
    }

    kdebug!(target: LOG, "{}: {} -> {} rows, top margin {}", table.name, rows, levels, top);
    table.parameters = params;
    table.num_of_row = u32::try_from(levels).map_err(|_| CalError::Range)?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// PLL_G3D
// ---------------------------------------------------------------------------

/// Prepends the desired `PLL_G3D` entries the table lacks.
///
/// # Errors
///
/// [`CalError::NotFound`] if the PLL block or `PLL_G3D` is absent,
/// [`CalError::NoMemory`] if the table cannot grow.
pub fn override_pll(ect: &mut Ect, desired: &[PllFrequency]) -> Result<bool, CalError> {
    let pll = ect
        .pll_entry_mut(G3D_PLL_NAME)
        .ok_or(CalError::NotFound)?;

    let mut missing: Vec<PllFrequency> = try_vec(desired.len())?;
    for d in desired {
        if pll.frequency(d.frequency).is_none() && !missing.iter().any(|x| x.frequency == d.frequency)
        {
            missing.push(*d);
        }
    }
    if missing.is_empty() {
        return Ok(false);
    }

    let mut freqs = try_vec(missing.len() + pll.frequencies.len())?;
    freqs.extend_from_slice(&missing);
    freqs.extend_from_slice(&pll.frequencies);
    kinfo!(
        target: LOG,
        "{}: added {} entries, {} total",
        pll.name, missing.len(), freqs.len()
    );
    pll.frequencies = freqs;
    Ok(true)
}

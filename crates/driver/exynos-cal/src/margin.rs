//! Per-domain voltage margins.
//!
//! Two kinds of margin apply to the DRAM FVMAP copy: a fixed microvolt
//! margin set once at init (one per [`MarginCategory`]), and a percentage
//! tunable that can be changed at runtime. Tunables live in a spin-locked
//! table; the global boot-time percentage is an atomic.

use core::fmt;
use core::sync::atomic::{AtomicI32, Ordering};

use exynos_core::sync::SpinLock;

use crate::error::CalError;

/// PMIC voltage step in microvolts.
pub const STEP_UV: i64 = 6250;

/// Bounds of a percentage margin, inclusive.
pub const PERCENT_RANGE: core::ops::RangeInclusive<i32> = -100..=100;

/// Voltage rail categories that carry their own margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum MarginCategory {
    Mif,
    Int,
    Big,
    Mid,
    Lit,
    G3d,
    Intcam,
    Cam,
    Disp,
    G3dm,
    Cp,
    Fsys0,
    Aud,
    Iva,
    Score,
    Npu,
    Mfc,
}

impl MarginCategory {
    /// Number of categories.
    pub const COUNT: usize = 17;

    /// All categories in table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Mif,
        Self::Int,
        Self::Big,
        Self::Mid,
        Self::Lit,
        Self::G3d,
        Self::Intcam,
        Self::Cam,
        Self::Disp,
        Self::G3dm,
        Self::Cp,
        Self::Fsys0,
        Self::Aud,
        Self::Iva,
        Self::Score,
        Self::Npu,
        Self::Mfc,
    ];

    /// Returns the lowercase name used on the command line and in config files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mif => "mif",
            Self::Int => "int",
            Self::Big => "big",
            Self::Mid => "mid",
            Self::Lit => "lit",
            Self::G3d => "g3d",
            Self::Intcam => "intcam",
            Self::Cam => "cam",
            Self::Disp => "disp",
            Self::G3dm => "g3dm",
            Self::Cp => "cp",
            Self::Fsys0 => "fsys0",
            Self::Aud => "aud",
            Self::Iva => "iva",
            Self::Score => "score",
            Self::Npu => "npu",
            Self::Mfc => "mfc",
        }
    }

    /// Parses a category name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Returns the table index of this category.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MarginCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks that `percent` is an accepted margin percentage.
///
/// # Errors
///
/// Returns [`CalError::Range`] outside [`PERCENT_RANGE`].
pub fn validate_percent(percent: i32) -> Result<i32, CalError> {
    if PERCENT_RANGE.contains(&percent) {
        Ok(percent)
    } else {
        Err(CalError::Range)
    }
}

/// Clamps a signed microvolt value into the `u32` range.
#[must_use]
pub fn clamp_uv(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

/// Adds `delta` microvolts to `volt`, clamping to `[0, u32::MAX]`.
#[must_use]
pub fn add_uv(volt: u32, delta: i64) -> u32 {
    clamp_uv(i64::from(volt).saturating_add(delta))
}

/// Scales `volt` by `percent`, rounding the delta toward zero to a whole
/// number of PMIC steps.
#[must_use]
pub fn apply_percent(volt: u32, percent: i32) -> u32 {
    let delta = i64::from(volt) * i64::from(percent) / 100;
    add_uv(volt, delta - delta % STEP_UV)
}

// ---------------------------------------------------------------------------
// Tunables
// ---------------------------------------------------------------------------

/// Runtime margin tunables.
pub struct MarginTunables {
    percent: SpinLock<[i32; MarginCategory::COUNT]>,
    volt_offset_percent: AtomicI32,
}

impl MarginTunables {
    /// Creates a tunable table with every percentage at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            percent: SpinLock::named("margin", [0; MarginCategory::COUNT]),
            volt_offset_percent: AtomicI32::new(0),
        }
    }

    /// Returns the percentage margin of `category`.
    #[must_use]
    pub fn percent(&self, category: MarginCategory) -> i32 {
        self.percent.lock()[category.index()]
    }

    /// Sets the percentage margin of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CalError::Range`] if `percent` lies outside `-100..=100`;
    /// the stored value is unchanged.
    pub fn set_percent(&self, category: MarginCategory, percent: i32) -> Result<(), CalError> {
        let percent = validate_percent(percent)?;
        self.percent.lock()[category.index()] = percent;
        Ok(())
    }

    /// Returns the global boot-time volt offset percentage.
    #[must_use]
    pub fn volt_offset_percent(&self) -> i32 {
        self.volt_offset_percent.load(Ordering::Relaxed)
    }

    /// Sets the global boot-time volt offset percentage.
    ///
    /// # Errors
    ///
    /// Returns [`CalError::Range`] if `percent` lies outside `-100..=100`.
    pub fn set_volt_offset_percent(&self, percent: i32) -> Result<(), CalError> {
        let percent = validate_percent(percent)?;
        self.volt_offset_percent.store(percent, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for MarginTunables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_bounds() {
        let t = MarginTunables::new();
        assert_eq!(t.set_percent(MarginCategory::G3d, 150), Err(CalError::Range));
        assert_eq!(t.set_percent(MarginCategory::G3d, -150), Err(CalError::Range));
        assert_eq!(t.percent(MarginCategory::G3d), 0);
        t.set_percent(MarginCategory::G3d, -100).unwrap();
        t.set_percent(MarginCategory::Mif, 100).unwrap();
        assert_eq!(t.percent(MarginCategory::G3d), -100);
        assert_eq!(t.percent(MarginCategory::Mif), 100);
        assert_eq!(t.set_volt_offset_percent(101), Err(CalError::Range));
    }

    #[test]
    fn percent_rounds_to_step() {
        // 25% of 800000 is 200000, a whole number of steps.
        assert_eq!(apply_percent(800_000, 25), 1_000_000);
        // 25% of 787500 is 196875 -> 193750.
        assert_eq!(apply_percent(787_500, 25), 981_250);
        // Negative deltas round toward zero: -196875 -> -193750.
        assert_eq!(apply_percent(787_500, -25), 593_750);
        assert_eq!(apply_percent(600_000, 0), 600_000);
    }

    #[test]
    fn voltage_clamp() {
        assert_eq!(add_uv(500_000, -1_000_000), 0);
        assert_eq!(add_uv(u32::MAX - 10, 1_000), u32::MAX);
        assert_eq!(add_uv(500_000, 12_500), 512_500);
    }

    #[test]
    fn category_names_round_trip() {
        for c in MarginCategory::ALL {
            assert_eq!(MarginCategory::from_name(c.name()), Some(c));
        }
        for (i, c) in MarginCategory::ALL.into_iter().enumerate() {
            assert_eq!(c.index(), i);
        }
        assert_eq!(MarginCategory::from_name("gpu"), None);
    }
}

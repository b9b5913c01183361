//! Compile-time constants and the runtime calibration configuration.

use alloc::vec::Vec;

use exynos_ect::PllFrequency;

use crate::margin::MarginCategory;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of the FVMAP image, in bytes.
pub const FVMAP_SIZE: usize = 16 * 1024;

/// PMIC voltage step in microvolts.
pub const VOLT_STEP_UV: u32 = exynos_ect::PMIC_VOLTAGE_STEP;

/// PLL reference clock, in Hz.
pub const FIN_HZ: u32 = 26_000_000;

/// Poll budget for a PLL to report stable, in microseconds.
pub const PLL_LOCK_POLL_US: u32 = 400;

/// Poll budget for a divider or mux busy bit to clear, in microseconds.
pub const DIV_MUX_POLL_US: u32 = 100;

/// Name of the PLL that feeds the GPU domain.
pub const G3D_PLL_NAME: &str = "PLL_G3D";

/// GEN table holding the GPU dynamic-droop margin per level.
pub const G3D_DD_MARGIN_TABLE: &str = "G3D_DD_margin";

/// Margin written into new top rows of [`G3D_DD_MARGIN_TABLE`] when the
/// existing top row carries none.
pub const G3D_DD_DEFAULT_MARGIN_UV: u32 = 12_500;

/// Prefix of the GEN tables that override min/max/boot/resume frequencies.
pub const MINMAX_PREFIX: &str = "MINMAX_";

/// Prefix of the GEN tables that carry SSA information.
pub const SSA_PREFIX: &str = "SSA_";

/// GEN table with the big-cluster turbo parameters.
pub const BIGTURBO_TABLE: &str = "BIGTURBO";

/// Physical base subtracted from FVMAP member addresses.
pub const FVMAP_ADDR_BASE: u32 = 0x9000_0000;

// ---------------------------------------------------------------------------
// GPU operating points
// ---------------------------------------------------------------------------

/// A frequency/voltage operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingPoint {
    /// Frequency in kHz.
    pub rate_khz: u32,
    /// Voltage in microvolts.
    pub volt_uv: u32,
}

impl OperatingPoint {
    /// Creates an operating point.
    #[must_use]
    pub const fn new(rate_khz: u32, volt_uv: u32) -> Self {
        Self { rate_khz, volt_uv }
    }

    /// Returns the frequency in MHz.
    #[must_use]
    pub const fn rate_mhz(&self) -> u32 {
        self.rate_khz / 1000
    }
}

/// Curated GPU operating points, highest first.
pub const G3D_OPERATING_POINTS: [OperatingPoint; 16] = [
    OperatingPoint::new(910_000, 875_000),
    OperatingPoint::new(858_000, 850_000),
    OperatingPoint::new(806_000, 825_000),
    OperatingPoint::new(754_000, 800_000),
    OperatingPoint::new(702_000, 775_000),
    OperatingPoint::new(676_000, 762_500),
    OperatingPoint::new(650_000, 750_000),
    OperatingPoint::new(598_000, 737_500),
    OperatingPoint::new(572_000, 725_000),
    OperatingPoint::new(433_000, 700_000),
    OperatingPoint::new(377_000, 675_000),
    OperatingPoint::new(325_000, 650_000),
    OperatingPoint::new(260_000, 625_000),
    OperatingPoint::new(200_000, 600_000),
    OperatingPoint::new(156_000, 575_000),
    OperatingPoint::new(100_000, 550_000),
];

/// `PLL_G3D` dividers for [`G3D_OPERATING_POINTS`], from a 26 MHz reference.
pub const G3D_PLL_TABLE: [PllFrequency; 16] = [
    PllFrequency::new(910_000_000, 4, 140, 0, 0),
    PllFrequency::new(858_000_000, 4, 132, 0, 0),
    PllFrequency::new(806_000_000, 4, 124, 0, 0),
    PllFrequency::new(754_000_000, 4, 116, 0, 0),
    PllFrequency::new(702_000_000, 4, 108, 0, 0),
    PllFrequency::new(676_000_000, 4, 104, 0, 0),
    PllFrequency::new(650_000_000, 4, 100, 0, 0),
    PllFrequency::new(598_000_000, 4, 184, 1, 0),
    PllFrequency::new(572_000_000, 4, 176, 1, 0),
    PllFrequency::new(432_250_000, 4, 133, 1, 0),
    PllFrequency::new(377_000_000, 4, 116, 1, 0),
    PllFrequency::new(325_000_000, 4, 100, 1, 0),
    PllFrequency::new(260_000_000, 4, 160, 2, 0),
    PllFrequency::new(199_875_000, 4, 123, 2, 0),
    PllFrequency::new(156_000_000, 4, 96, 2, 0),
    PllFrequency::new(99_937_000, 4, 123, 3, 0),
];

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// How the override engine fills the value table of levels it adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverrideValuePolicy {
    /// Every member's value is its level index.
    IdentityIndex,
    /// Every member's value is copied from the nearest-rate existing level;
    /// PLL members carry the new rate in kHz.
    #[default]
    NearestRate,
}

/// Runtime calibration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalConfig {
    /// ASV table version to start from; `None` uses the fused version
    /// reported by the platform.
    pub asv_table_version: Option<u32>,
    /// Value policy for override-added DVFS levels.
    pub value_policy: OverrideValuePolicy,
    /// GPU operating points, highest first.
    pub operating_points: Vec<OperatingPoint>,
    /// Desired `PLL_G3D` entries.
    pub pll_table: Vec<PllFrequency>,
    /// Extra GPU rates in kHz inserted into the LUT if absent.
    pub extra_gpu_rates: Vec<u32>,
    /// Fixed microvolt margins applied at init, per category.
    pub init_margins: [i32; MarginCategory::COUNT],
    /// Percentage applied to the firmware voltage table before copy.
    pub volt_offset_percent: i32,
}

impl CalConfig {
    /// Returns the init margin for `category`.
    #[must_use]
    pub fn init_margin(&self, category: MarginCategory) -> i32 {
        self.init_margins[category.index()]
    }
}

impl Default for CalConfig {
    fn default() -> Self {
        Self {
            asv_table_version: None,
            value_policy: OverrideValuePolicy::default(),
            operating_points: G3D_OPERATING_POINTS.to_vec(),
            pll_table: G3D_PLL_TABLE.to_vec(),
            extra_gpu_rates: G3D_OPERATING_POINTS.iter().map(|op| op.rate_khz).collect(),
            init_margins: [0; MarginCategory::COUNT],
            volt_offset_percent: 0,
        }
    }
}

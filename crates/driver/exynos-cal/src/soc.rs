//! Reference GPU clock controller.
//!
//! The `CMU_G3D` block of the reference SoC: `PLL_G3D` feeding the GPU
//! through a user mux and a bus divider, plus the `CMU_TOP` switch path
//! that keeps the GPU clocked while `PLL_G3D` relocks. Register addresses
//! are physical.

use alloc::vec;
use alloc::vec::Vec;

use exynos_ect::Ect;

use crate::asv;
use crate::clk::{ClkId, ClockKind, ClockTree, PllClock, PllLayout};
use crate::config::{FIN_HZ, FVMAP_ADDR_BASE, G3D_PLL_NAME};
use crate::error::CalError;
use crate::fvmap::{DomainImage, FvmapHeader, FvmapImage, PllRecord};
use crate::margin::MarginCategory;
use crate::pll;
use crate::regs::{RegField, RegisterFile};
use crate::transition::{SwitchInfo, SwitchLut};
use crate::vclk::VclkSpec;

/// `CMU_G3D` base address.
pub const CMU_G3D_BASE: u32 = 0x1840_0000;
/// `CMU_TOP` base address.
pub const CMU_TOP_BASE: u32 = 0x1a33_0000;

/// `PLL_LOCK_PLL_G3D`.
pub const PLL_G3D_LOCK: u32 = CMU_G3D_BASE;
/// `PLL_CON0_PLL_G3D`.
pub const PLL_G3D_CON0: u32 = CMU_G3D_BASE + 0x100;
/// `CLK_CON_MUX_MUX_G3D`.
pub const MUX_G3D_CON: u32 = CMU_G3D_BASE + 0x1000;
/// `CLK_CON_MUX_MUX_CLKCMU_G3D_SWITCH_USER`.
pub const MUX_G3D_SWITCH_USER_CON: u32 = CMU_G3D_BASE + 0x1004;
/// `CLK_CON_MUX_MUX_CLK_G3D_BUSD`.
pub const MUX_G3D_BUSD_CON: u32 = CMU_G3D_BASE + 0x1008;
/// `CLK_CON_DIV_DIV_G3D_BUS`.
pub const DIV_G3D_BUS_CON: u32 = CMU_G3D_BASE + 0x1800;
/// `CLK_CON_GAT_GATE_G3D`.
pub const GATE_G3D_CON: u32 = CMU_G3D_BASE + 0x2000;
/// `CLK_CON_MUX_MUX_CLKCMU_G3D_SWITCH`.
pub const MUX_TOP_G3D_SWITCH_CON: u32 = CMU_TOP_BASE + 0x1000;
/// `CLK_CON_DIV_DIV_CLKCMU_G3D_SWITCH`.
pub const DIV_TOP_G3D_SWITCH_CON: u32 = CMU_TOP_BASE + 0x1800;
/// `CLK_CON_GAT_GATE_CLKCMU_G3D_SWITCH`.
pub const GATE_TOP_G3D_SWITCH_CON: u32 = CMU_TOP_BASE + 0x2000;

const BUSY_BIT: u8 = 16;
const PLL_STABLE_BIT: u8 = 29;
const LOCK_TIME: u32 = 200;
const FLOCK_TIME: u32 = 500;

fn mux(sel: u32, shift: u8, parents: Vec<ClkId>, user: bool) -> ClockKind {
    ClockKind::Mux {
        sel: RegField::new(sel, shift, 1),
        busy: Some(RegField::bit(sel, BUSY_BIT)),
        parents,
        user,
    }
}

/// Builds the reference clock tree.
///
/// `PLL_G3D` starts with an empty divider table; the calibration context
/// fills it from the ECT `PLL` block.
#[must_use]
pub fn g3d_clock_tree() -> ClockTree {
    let mut t = ClockTree::new();
    let osc = t.add("OSCCLK", ClockKind::FixedRate { rate_hz: FIN_HZ });
    let shared0 = t.add("SHARED0_DIV2", ClockKind::FixedRate { rate_hz: 800_000_000 });
    let shared1 = t.add("SHARED1_DIV2", ClockKind::FixedRate { rate_hz: 666_000_000 });

    let pll = t.add(
        G3D_PLL_NAME,
        ClockKind::Pll(PllClock {
            con0: PLL_G3D_CON0,
            con1: None,
            lock: PLL_G3D_LOCK,
            layout: PllLayout::INTEGER,
            lock_time: LOCK_TIME,
            flock_time: FLOCK_TIME,
            umux: None,
            parent: Some(osc),
            rate_table: Vec::new(),
        }),
    );
    let mux_g3d = t.add("MUX_G3D", mux(MUX_G3D_CON, 0, vec![osc, pll], true));
    t.add(
        "DIV_G3D_BUS",
        ClockKind::Div {
            ratio: RegField::new(DIV_G3D_BUS_CON, 0, 4),
            busy: Some(RegField::bit(DIV_G3D_BUS_CON, BUSY_BIT)),
            parent: mux_g3d,
        },
    );
    t.add(
        "GATE_G3D",
        ClockKind::Gate {
            gate: RegField::bit(GATE_G3D_CON, 21),
            parent: mux_g3d,
        },
    );

    let top_mux = t.add(
        "MUX_CLKCMU_G3D_SWITCH",
        ClockKind::Mux {
            sel: RegField::new(MUX_TOP_G3D_SWITCH_CON, 0, 2),
            busy: Some(RegField::bit(MUX_TOP_G3D_SWITCH_CON, BUSY_BIT)),
            parents: vec![shared0, shared1],
            user: false,
        },
    );
    let top_div = t.add(
        "DIV_CLKCMU_G3D_SWITCH",
        ClockKind::Div {
            ratio: RegField::new(DIV_TOP_G3D_SWITCH_CON, 0, 3),
            busy: Some(RegField::bit(DIV_TOP_G3D_SWITCH_CON, BUSY_BIT)),
            parent: top_mux,
        },
    );
    let top_gate = t.add(
        "GATE_CLKCMU_G3D_SWITCH",
        ClockKind::Gate {
            gate: RegField::bit(GATE_TOP_G3D_SWITCH_CON, 21),
            parent: top_div,
        },
    );
    let umux = t.add(
        "MUX_CLKCMU_G3D_SWITCH_USER",
        mux(MUX_G3D_SWITCH_USER_CON, 4, vec![osc, top_gate], true),
    );
    t.add("MUX_CLK_G3D_BUSD", mux(MUX_G3D_BUSD_CON, 0, vec![mux_g3d, umux], false));
    t
}

/// Returns the switch path of the GPU domain, or `None` if `tree` lacks it.
#[must_use]
pub fn g3d_switch(tree: &ClockTree) -> Option<SwitchInfo> {
    Some(SwitchInfo {
        switch_mux: tree.id_by_name("MUX_CLK_G3D_BUSD")?,
        src_mux: tree.id_by_name("MUX_CLKCMU_G3D_SWITCH"),
        src_div: tree.id_by_name("DIV_CLKCMU_G3D_SWITCH"),
        src_gate: tree.id_by_name("GATE_CLKCMU_G3D_SWITCH"),
        src_umux: tree.id_by_name("MUX_CLKCMU_G3D_SWITCH_USER"),
        lut: vec![
            SwitchLut { rate: 800_000, mux_value: 0, div_value: 0 },
            SwitchLut { rate: 666_000, mux_value: 1, div_value: 0 },
            SwitchLut { rate: 400_000, mux_value: 0, div_value: 1 },
            SwitchLut { rate: 200_000, mux_value: 0, div_value: 3 },
        ],
    })
}

/// Describes the GPU vclk.
///
/// With `switch` set, transitions run through the `CMU_TOP` switch path.
#[must_use]
pub fn g3d_vclk_spec(tree: &ClockTree, switch: bool) -> VclkSpec {
    let gates = ["PLL_G3D", "MUX_G3D", "GATE_G3D"]
        .into_iter()
        .filter_map(|n| tree.id_by_name(n))
        .collect();
    VclkSpec {
        margin: Some(MarginCategory::G3d),
        switch: if switch { g3d_switch(tree) } else { None },
        gates,
        ..VclkSpec::named(exynos_ect::GPU_DOMAIN_NAME)
    }
}

/// Pins the status bits the simulated PLL would assert on its own.
pub fn pin_status(regs: &RegisterFile) {
    regs.pin(RegField::bit(PLL_G3D_CON0, PLL_STABLE_BIT), 1);
}

/// FVMAP block address of `CMU_G3D`, as firmware stores it.
pub const FVMAP_BLOCK_G3D: u16 = block_of(CMU_G3D_BASE);

const fn block_of(base: u32) -> u16 {
    (base.wrapping_add(FVMAP_ADDR_BASE) >> 16) as u16
}

const fn member_word(addr: u32, blk_idx: u16) -> u16 {
    ((addr & 0xfffc) as u16) | blk_idx
}

/// Builds the firmware's FVMAP image for the GPU domain of `ect`.
///
/// # Errors
///
/// As [`reference_domain`].
pub fn reference_fvmap(ect: &Ect, asv_version: u32) -> Result<FvmapImage, CalError> {
    FvmapImage::layout(&[reference_domain(ect, asv_version)?])
}

/// Builds the firmware's FVMAP contents for the GPU domain of `ect`.
///
/// The domain carries the unmodified firmware levels: `PLL_G3D` as a PMS
/// index into its own record, then `MUX_G3D` and `DIV_G3D_BUS`. Voltages
/// are group 0 of the ASV table selected for `asv_version`.
///
/// # Errors
///
/// [`CalError::NotFound`] if the DVFS domain, ASV table or PLL block is
/// missing, [`CalError::Range`] if a value does not fit its field.
pub fn reference_domain(ect: &Ect, asv_version: u32) -> Result<DomainImage, CalError> {
    let domain = ect
        .dvfs_domain(exynos_ect::GPU_DOMAIN_NAME)
        .ok_or(CalError::NotFound)?;
    let pll_table = ect.pll_entry(G3D_PLL_NAME).ok_or(CalError::NotFound)?;
    let volts = asv::asv_table(ect, exynos_ect::GPU_DOMAIN_NAME, asv_version, 0)?;

    let pms: Vec<u32> = pll_table.frequencies.iter().map(pll::pms_word).collect();
    let mut ratevolt = Vec::new();
    let mut params = Vec::new();
    for (lv, level) in domain.levels.iter().enumerate() {
        let row = domain.row(lv).ok_or(CalError::NotFound)?;
        let pll_idx = pll_table
            .frequencies
            .iter()
            .enumerate()
            .min_by_key(|(_, f)| (f.frequency / 1000).abs_diff(level.level))
            .map_or(0, |(i, _)| i);
        params.push(u8::try_from(pll_idx).map_err(|_| CalError::Range)?);
        for &v in row.iter().skip(1) {
            params.push(u8::try_from(v).map_err(|_| CalError::Range)?);
        }
        ratevolt.push((level.level, volts.get(lv).copied().unwrap_or(0)));
    }

    let num_of_lv = u8::try_from(domain.num_of_level()).map_err(|_| CalError::Range)?;
    Ok(DomainImage {
        header: FvmapHeader {
            dvfs_type: 0,
            num_of_lv,
            num_of_members: 3,
            num_of_pll: 1,
            num_of_mux: 1,
            num_of_div: 1,
            gearratio: 0,
            init_lv: u8::try_from(domain.boot_level_idx.max(0)).unwrap_or(0),
            num_of_gate: 0,
            block_addr: [FVMAP_BLOCK_G3D, 0, 0],
            ..FvmapHeader::default()
        },
        plls: vec![PllRecord {
            addr: PLL_G3D_CON0.wrapping_add(FVMAP_ADDR_BASE),
            o_lock: 0,
            pms,
        }],
        members: vec![
            member_word(MUX_G3D_CON, 0),
            member_word(DIV_G3D_BUS_CON, 0),
        ],
        ratevolt,
        params,
    })
}

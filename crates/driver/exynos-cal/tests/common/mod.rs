//! Blob fixtures shared by the integration tests.

#![allow(dead_code)]

use exynos_cal::{CalConfig, CalibrationContext, Platform, RegisterAccess, soc};
use exynos_ect::builder::EctBuilder;
use exynos_ect::{
    AsvHeader, Block, DomainKind, DvfsDomain, DvfsHeader, DvfsLevel, GroupValues, Member,
    MemberMode, Pll, PllFrequency, PllHeader, VoltageDomain, VoltageTable,
};

/// Firmware GPU levels in MHz.
pub const LEVELS_MHZ: [u32; 11] = [858, 806, 754, 702, 650, 572, 433, 377, 325, 260, 156];

/// Dividers firmware ships for [`LEVELS_MHZ`].
pub const PLL: [(u32, u32, u32, u32); 11] = [
    (858_000_000, 4, 132, 0),
    (806_000_000, 4, 124, 0),
    (754_000_000, 4, 116, 0),
    (702_000_000, 4, 108, 0),
    (650_000_000, 4, 100, 0),
    (572_000_000, 4, 176, 1),
    (432_250_000, 4, 133, 1),
    (377_000_000, 4, 116, 1),
    (325_000_000, 4, 100, 1),
    (260_000_000, 4, 160, 2),
    (156_000_000, 4, 96, 2),
];

/// A fused chip reporting `id`.
pub struct Chip(pub u32);

impl Platform for Chip {
    fn calibration_id(&self) -> u32 {
        self.0
    }
}

fn dvfs() -> DvfsDomain {
    DvfsDomain {
        name: "dvfs_g3d".into(),
        kind: DomainKind::Gpu,
        max_frequency: LEVELS_MHZ[0] * 1000,
        min_frequency: LEVELS_MHZ[10] * 1000,
        boot_level_idx: 4,
        resume_level_idx: 4,
        mode: MemberMode::ClockName,
        members: ["PLL_G3D", "MUX_G3D", "DIV_G3D_BUS"]
            .into_iter()
            .map(|n| Member::Name(n.into()))
            .collect(),
        levels: LEVELS_MHZ
            .iter()
            .map(|&mhz| DvfsLevel {
                level: mhz * 1000,
                level_en: 1,
            })
            .collect(),
        values: LEVELS_MHZ
            .iter()
            .flat_map(|&mhz| [mhz * 1000, 1, u32::from(mhz > 600)])
            .collect(),
    }
}

fn asv() -> VoltageDomain {
    VoltageDomain {
        name: "dvfs_g3d".into(),
        kind: DomainKind::Gpu,
        num_of_group: 1,
        level_list: LEVELS_MHZ.iter().map(|&m| m as i32).collect(),
        tables: vec![VoltageTable {
            table_version: 0,
            boot_level_idx: 4,
            resume_level_idx: 4,
            level_en: Some(vec![1; LEVELS_MHZ.len()]),
            voltages: GroupValues::Raw((0..11).map(|lv| 850_000 - lv * 25_000).collect()),
        }],
    }
}

/// An ECT blob with the GPU DVFS, ASV and PLL blocks.
pub fn gpu_blob() -> Vec<u8> {
    EctBuilder::new()
        .block(
            "DVFS",
            Block::Dvfs(DvfsHeader {
                parser_version: 3,
                version: *b"0003",
                domains: vec![dvfs()],
            }),
        )
        .block(
            "ASV",
            Block::Asv(AsvHeader {
                parser_version: 2,
                version: *b"0002",
                domains: vec![asv()],
            }),
        )
        .block(
            "PLL",
            Block::Pll(PllHeader {
                parser_version: 1,
                version: *b"0001",
                plls: vec![Pll {
                    name: "PLL_G3D".into(),
                    type_pll: 0,
                    frequencies: PLL
                        .iter()
                        .map(|&(f, p, m, s)| PllFrequency::new(f, p, m, s, 0))
                        .collect(),
                }],
            }),
        )
        .build()
}

/// Runs init and FVMAP reconciliation over [`gpu_blob`].
pub fn gpu_context<R: RegisterAccess>(regs: R, switch: bool) -> CalibrationContext<R> {
    let blob = gpu_blob();
    let tree = soc::g3d_clock_tree();
    let specs = [soc::g3d_vclk_spec(&tree, switch)];
    let ctx = CalibrationContext::init(&blob, &Chip(0), tree, &specs, CalConfig::default(), regs)
        .expect("init");
    let firmware = exynos_ect::Ect::parse(&blob).expect("parse");
    let sram = soc::reference_fvmap(&firmware, 0).expect("reference FVMAP");
    assert_eq!(ctx.init_fvmap(sram.as_bytes()), Ok(1));
    ctx
}

//! Shared fixtures for unit tests.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use exynos_ect::builder::EctBuilder;
use exynos_ect::{
    AsvHeader, Block, DomainKind, DvfsDomain, DvfsHeader, DvfsLevel, Ect, GenParamHeader,
    GenParamTable, GroupValues, MarginDomain, MarginHeader, Member, MemberMode, Pll, PllFrequency,
    PllHeader, VoltageDomain, VoltageTable,
};

/// Firmware GPU levels in kHz, highest first.
pub const FW_LEVELS: [u32; 11] = [
    858_000, 806_000, 754_000, 702_000, 650_000, 572_000, 433_000, 377_000, 325_000, 260_000,
    156_000,
];

/// Bus divider value for a GPU rate: 1 above 600 MHz, else 0.
pub fn bus_div(rate_khz: u32) -> u32 {
    u32::from(rate_khz > 600_000)
}

fn fw_pll() -> Vec<PllFrequency> {
    vec![
        PllFrequency::new(858_000_000, 4, 132, 0, 0),
        PllFrequency::new(806_000_000, 4, 124, 0, 0),
        PllFrequency::new(754_000_000, 4, 116, 0, 0),
        PllFrequency::new(702_000_000, 4, 108, 0, 0),
        PllFrequency::new(650_000_000, 4, 100, 0, 0),
        PllFrequency::new(572_000_000, 4, 176, 1, 0),
        PllFrequency::new(432_250_000, 4, 133, 1, 0),
        PllFrequency::new(377_000_000, 4, 116, 1, 0),
        PllFrequency::new(325_000_000, 4, 100, 1, 0),
        PllFrequency::new(260_000_000, 4, 160, 2, 0),
        PllFrequency::new(156_000_000, 4, 96, 2, 0),
    ]
}

/// The firmware `dvfs_g3d` domain: `PLL_G3D`, `MUX_G3D`, `DIV_G3D_BUS`.
pub fn g3d_dvfs() -> DvfsDomain {
    DvfsDomain {
        name: String::from("dvfs_g3d"),
        kind: DomainKind::Gpu,
        max_frequency: FW_LEVELS[0],
        min_frequency: FW_LEVELS[10],
        boot_level_idx: 2,
        resume_level_idx: 2,
        mode: MemberMode::ClockName,
        members: vec![
            Member::Name(String::from("PLL_G3D")),
            Member::Name(String::from("MUX_G3D")),
            Member::Name(String::from("DIV_G3D_BUS")),
        ],
        levels: FW_LEVELS
            .iter()
            .map(|&level| DvfsLevel { level, level_en: 1 })
            .collect(),
        values: FW_LEVELS.iter().flat_map(|&r| [r, 1, bus_div(r)]).collect(),
    }
}

fn g3d_asv() -> VoltageDomain {
    let table = |version: u32, bias: i32| VoltageTable {
        table_version: version,
        boot_level_idx: 2,
        resume_level_idx: 2,
        level_en: Some(vec![1; FW_LEVELS.len()]),
        voltages: GroupValues::Raw(
            (0..FW_LEVELS.len() as i32)
                .flat_map(|lv| {
                    let v = 850_000 - lv * 25_000 + bias;
                    [v, v + 12_500]
                })
                .collect(),
        ),
    };
    VoltageDomain {
        name: String::from("dvfs_g3d"),
        kind: DomainKind::Gpu,
        num_of_group: 2,
        level_list: FW_LEVELS.iter().map(|&r| (r / 1000) as i32).collect(),
        tables: vec![table(0, 0), table(1, 6250)],
    }
}

fn dd_margin() -> GenParamTable {
    GenParamTable {
        name: String::from("G3D_DD_margin"),
        num_of_col: 2,
        num_of_row: 11,
        parameters: (0..11u32)
            .flat_map(|i| [i, if i == 10 { 6250 } else { 0 }])
            .collect(),
    }
}

/// The firmware GPU blob: DVFS, ASV (parser version 2), MARGIN, GEN and PLL.
pub fn g3d_blob() -> Vec<u8> {
    EctBuilder::new()
        .block(
            "DVFS",
            Block::Dvfs(DvfsHeader {
                parser_version: 3,
                version: *b"0003",
                domains: vec![g3d_dvfs()],
            }),
        )
        .block(
            "ASV",
            Block::Asv(AsvHeader {
                parser_version: 2,
                version: *b"0002",
                domains: vec![g3d_asv()],
            }),
        )
        .block(
            "MARGIN",
            Block::Margin(MarginHeader {
                parser_version: 1,
                version: *b"0001",
                domains: vec![MarginDomain {
                    name: String::from("dvfs_g3d"),
                    num_of_group: 2,
                    num_of_level: 11,
                    offsets: GroupValues::Raw((0..11).flat_map(|_| [0, 6250]).collect()),
                }],
            }),
        )
        .block(
            "GEN",
            Block::Gen(GenParamHeader {
                parser_version: 1,
                version: *b"0001",
                tables: vec![dd_margin()],
            }),
        )
        .block(
            "PLL",
            Block::Pll(PllHeader {
                parser_version: 1,
                version: *b"0001",
                plls: vec![Pll {
                    name: String::from("PLL_G3D"),
                    type_pll: 0,
                    frequencies: fw_pll(),
                }],
            }),
        )
        .build()
}

/// The parsed firmware GPU blob.
pub fn g3d_ect() -> Ect {
    Ect::parse(&g3d_blob()).unwrap()
}

/// An ECT with no blocks.
pub fn empty_ect() -> Ect {
    Ect::parse(&EctBuilder::new().build()).unwrap()
}

//! `no_std` parser for the Exynos Chip Table (ECT).
//!
//! The ECT is a vendor calibration blob: a `"PARA"` header followed by a
//! table of named blocks (DVFS levels, PLL dividers, ASV voltages, margins,
//! thermal tables, DRAM timings, ...). Every block is self-describing, with
//! version-dependent layouts keyed on its `parser_version`.
//!
//! Parsing is isolated per block: a malformed block is logged and recorded
//! as that block's error while every other block stays usable. Only a bad
//! signature or a truncated top-level header fails [`Ect::parse`].
//!
//! # Usage
//!
//! ```ignore
//! let ect = Ect::parse(blob)?;
//! if let Some(g3d) = ect.dvfs().and_then(|d| d.domain("dvfs_g3d")) {
//!     for lv in &g3d.levels {
//!         // ...
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod asv;
pub mod bin;
#[cfg(any(test, feature = "builder"))]
pub mod builder;
pub mod domain;
pub mod dump;
pub mod dvfs;
pub mod error;
pub mod gen_param;
pub mod header;
pub mod margin;
pub mod minlock;
pub mod pidtm;
pub mod pll;
pub mod rcc;
pub mod reader;
pub mod thermal;
pub mod timing;
pub mod values;

use alloc::collections::BTreeMap;
use alloc::string::String;

use exynos_core::{kerr, kinfo, kwarn};

pub use asv::{AsvHeader, TableSelection, VoltageDomain, VoltageTable};
pub use bin::{BinHeader, Binary};
pub use domain::{DomainKind, GPU_DOMAIN_NAME};
pub use dvfs::{DvfsDomain, DvfsHeader, DvfsLevel, Member, MemberMode};
pub use error::EctError;
pub use gen_param::{GenParamHeader, GenParamTable};
pub use header::EctHeader;
pub use margin::{MarginDomain, MarginHeader};
pub use minlock::{MinlockDomain, MinlockFrequency, MinlockHeader};
pub use pidtm::{PidtmBlock, PidtmHeader};
pub use pll::{Pll, PllFrequency, PllHeader};
pub use rcc::{RccDomain, RccHeader, RccTable};
pub use thermal::{ApThermalFunction, ApThermalHeader, ApThermalRange, MifThermalHeader, MifThermalLevel};
pub use timing::{NewTimingParamHeader, NewTimingParamSize, TimingParamHeader, TimingParamSize};
pub use values::{GroupValues, PMIC_VOLTAGE_STEP};

const LOG: &str = "ect";

// ---------------------------------------------------------------------------
// Block kinds
// ---------------------------------------------------------------------------

/// The kinds of block an ECT blob can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// `THERMAL_AP`
    ApThermal,
    /// `ASV`
    Asv,
    /// `DVFS`
    Dvfs,
    /// `MARGIN`
    Margin,
    /// `THERMAL_IF`
    MifThermal,
    /// `PLL`
    Pll,
    /// `RCC`
    Rcc,
    /// `TIMING`
    Timing,
    /// `MINLOCK`
    Minlock,
    /// `GEN`
    Gen,
    /// `BIN`
    Bin,
    /// `NEWTIMING`
    NewTiming,
    /// `PIDTM`
    Pidtm,
}

impl BlockKind {
    /// Number of block kinds.
    pub const COUNT: usize = 13;

    /// All kinds, in name-dispatch order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::ApThermal,
        Self::Asv,
        Self::Dvfs,
        Self::Margin,
        Self::MifThermal,
        Self::Pll,
        Self::Rcc,
        Self::Timing,
        Self::Minlock,
        Self::Gen,
        Self::Bin,
        Self::NewTiming,
        Self::Pidtm,
    ];

    /// Returns the block name as it appears in the blob.
    #[must_use]
    pub const fn block_name(self) -> &'static str {
        match self {
            Self::ApThermal => "THERMAL_AP",
            Self::Asv => "ASV",
            Self::Dvfs => "DVFS",
            Self::Margin => "MARGIN",
            Self::MifThermal => "THERMAL_IF",
            Self::Pll => "PLL",
            Self::Rcc => "RCC",
            Self::Timing => "TIMING",
            Self::Minlock => "MINLOCK",
            Self::Gen => "GEN",
            Self::Bin => "BIN",
            Self::NewTiming => "NEWTIMING",
            Self::Pidtm => "PIDTM",
        }
    }

    /// Resolves a stored block name by prefix, first match in dispatch order.
    #[must_use]
    pub fn from_block_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| name.starts_with(k.block_name()))
    }

    const fn index(self) -> usize {
        self as usize
    }

    fn parse(self, blob: &[u8], base: usize) -> Result<Block, EctError> {
        Ok(match self {
            Self::ApThermal => Block::ApThermal(ApThermalHeader::parse(blob, base)?),
            Self::Asv => Block::Asv(AsvHeader::parse(blob, base)?),
            Self::Dvfs => Block::Dvfs(DvfsHeader::parse(blob, base)?),
            Self::Margin => Block::Margin(MarginHeader::parse(blob, base)?),
            Self::MifThermal => Block::MifThermal(MifThermalHeader::parse(blob, base)?),
            Self::Pll => Block::Pll(PllHeader::parse(blob, base)?),
            Self::Rcc => Block::Rcc(RccHeader::parse(blob, base)?),
            Self::Timing => Block::Timing(TimingParamHeader::parse(blob, base)?),
            Self::Minlock => Block::Minlock(MinlockHeader::parse(blob, base)?),
            Self::Gen => Block::Gen(GenParamHeader::parse(blob, base)?),
            Self::Bin => Block::Bin(BinHeader::parse(blob, base)?),
            Self::NewTiming => Block::NewTiming(NewTimingParamHeader::parse(blob, base)?),
            Self::Pidtm => Block::Pidtm(PidtmHeader::parse(blob, base)?),
        })
    }
}

/// A decoded block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Block {
    ApThermal(ApThermalHeader),
    Asv(AsvHeader),
    Dvfs(DvfsHeader),
    Margin(MarginHeader),
    MifThermal(MifThermalHeader),
    Pll(PllHeader),
    Rcc(RccHeader),
    Timing(TimingParamHeader),
    Minlock(MinlockHeader),
    Gen(GenParamHeader),
    Bin(BinHeader),
    NewTiming(NewTimingParamHeader),
    Pidtm(PidtmHeader),
}

impl Block {
    /// Returns the name of the `i`th named entry (domain, table, PLL, ...).
    ///
    /// Blocks keyed by number (`THERMAL_IF`, `TIMING`, `NEWTIMING`) have no
    /// named entries.
    #[must_use]
    pub fn entry_name(&self, i: usize) -> Option<&str> {
        match self {
            Self::ApThermal(b) => b.functions.get(i).map(|e| e.name.as_str()),
            Self::Asv(b) => b.domains.get(i).map(|e| e.name.as_str()),
            Self::Dvfs(b) => b.domains.get(i).map(|e| e.name.as_str()),
            Self::Margin(b) => b.domains.get(i).map(|e| e.name.as_str()),
            Self::Pll(b) => b.plls.get(i).map(|e| e.name.as_str()),
            Self::Rcc(b) => b.domains.get(i).map(|e| e.name.as_str()),
            Self::Minlock(b) => b.domains.get(i).map(|e| e.name.as_str()),
            Self::Gen(b) => b.tables.get(i).map(|e| e.name.as_str()),
            Self::Bin(b) => b.binaries.get(i).map(|e| e.name.as_str()),
            Self::Pidtm(b) => b.blocks.get(i).map(|e| e.name.as_str()),
            Self::MifThermal(_) | Self::Timing(_) | Self::NewTiming(_) => None,
        }
    }

    /// Iterates over the named entries in table order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        (0..).map_while(move |i| self.entry_name(i))
    }
}

/// A block table entry and its decode result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSlot {
    /// Name as stored in the blob.
    pub name: String,
    /// Position of the entry in the block table.
    pub precedence: usize,
    /// The decoded block, or the error that stopped it.
    pub result: Result<Block, EctError>,
}

// ---------------------------------------------------------------------------
// Ect
// ---------------------------------------------------------------------------

/// A parsed ECT blob.
///
/// Owns every decoded block so later stages can patch tables in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ect {
    header: EctHeader,
    slots: [Option<BlockSlot>; BlockKind::COUNT],
    names: [BTreeMap<String, usize>; BlockKind::COUNT],
}

/// Entry name to position, first occurrence wins.
fn index_names(block: &Block) -> BTreeMap<String, usize> {
    let mut map = BTreeMap::new();
    for (i, name) in block.entry_names().enumerate() {
        map.entry(String::from(name)).or_insert(i);
    }
    map
}

macro_rules! typed_block {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Returns the `", stringify!($variant), "` block if it parsed.")]
        #[must_use]
        pub fn $get(&self) -> Option<&$ty> {
            match self.block(BlockKind::$variant)? {
                Block::$variant(b) => Some(b),
                _ => None,
            }
        }

        #[doc = concat!("Returns the `", stringify!($variant), "` block for modification.")]
        pub fn $get_mut(&mut self) -> Option<&mut $ty> {
            match self.block_mut(BlockKind::$variant)? {
                Block::$variant(b) => Some(b),
                _ => None,
            }
        }
    };
}

macro_rules! named_entry {
    ($get:ident, $get_mut:ident, $block:ident, $block_mut:ident, $kind:ident, $field:ident, $ty:ty) => {
        #[doc = concat!("Looks up a `", stringify!($kind), "` entry by exact name.")]
        #[must_use]
        pub fn $get(&self, name: &str) -> Option<&$ty> {
            let i = self.entry_index(BlockKind::$kind, name)?;
            self.$block()?.$field.get(i)
        }

        #[doc = concat!("Looks up a `", stringify!($kind), "` entry by exact name for modification.")]
        pub fn $get_mut(&mut self, name: &str) -> Option<&mut $ty> {
            let i = self.entry_index(BlockKind::$kind, name)?;
            self.$block_mut()?.$field.get_mut(i)
        }
    };
}

impl Ect {
    /// Parses an ECT blob.
    ///
    /// Blocks are decoded independently; a block that fails is recorded
    /// and logged, and its siblings are unaffected. Unknown block names are
    /// logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::BadSignature`] if the blob is not an ECT, or a
    /// read error if the top-level header or block table is malformed.
    pub fn parse(blob: &[u8]) -> Result<Self, EctError> {
        let (header, limit) = match EctHeader::parse(blob) {
            Ok(v) => v,
            Err(e) => {
                kerr!(target: LOG, "header: {}", e);
                return Err(e);
            }
        };
        let blob = &blob[..limit];

        if header.is_test_version() {
            kwarn!(
                target: LOG,
                "test version of the table detected ({}), do not use it for production",
                header.version_str()
            );
        }

        let mut slots: [Option<BlockSlot>; BlockKind::COUNT] = [const { None }; BlockKind::COUNT];
        let mut names: [BTreeMap<String, usize>; BlockKind::COUNT] =
            [const { BTreeMap::new() }; BlockKind::COUNT];
        for (precedence, entry) in header.blocks.iter().enumerate() {
            let Some(kind) = BlockKind::from_block_name(&entry.name) else {
                kwarn!(target: LOG, "unknown block {}, skipped", entry.name);
                continue;
            };
            let result = kind.parse(blob, entry.offset);
            match &result {
                Ok(block) => {
                    kinfo!(target: LOG, "parsed {} at {:#x}", entry.name, entry.offset);
                    names[kind.index()] = index_names(block);
                }
                Err(e) => kerr!(target: LOG, "parse error {}: {}", entry.name, e),
            }
            slots[kind.index()] = Some(BlockSlot {
                name: entry.name.clone(),
                precedence,
                result,
            });
        }

        Ok(Self {
            header,
            slots,
            names,
        })
    }

    /// Returns the top-level header.
    #[must_use]
    pub fn header(&self) -> &EctHeader {
        &self.header
    }

    /// Returns the slot for `kind`, whether it parsed or not.
    #[must_use]
    pub fn slot(&self, kind: BlockKind) -> Option<&BlockSlot> {
        self.slots[kind.index()].as_ref()
    }

    /// Returns all present slots in block-table order.
    #[must_use]
    pub fn slots(&self) -> alloc::vec::Vec<(BlockKind, &BlockSlot)> {
        let mut v: alloc::vec::Vec<_> = BlockKind::ALL
            .into_iter()
            .filter_map(|k| self.slot(k).map(|s| (k, s)))
            .collect();
        v.sort_by_key(|(_, s)| s.precedence);
        v
    }

    /// Returns the decoded block of `kind`.
    #[must_use]
    pub fn block(&self, kind: BlockKind) -> Option<&Block> {
        self.slot(kind)?.result.as_ref().ok()
    }

    /// Returns the decoded block of `kind` for modification.
    pub fn block_mut(&mut self, kind: BlockKind) -> Option<&mut Block> {
        self.slots[kind.index()].as_mut()?.result.as_mut().ok()
    }

    /// Returns the error recorded for `kind`, if its block failed to decode.
    #[must_use]
    pub fn block_error(&self, kind: BlockKind) -> Option<EctError> {
        self.slot(kind)?.result.as_ref().err().copied()
    }

    /// Returns the position of entry `name` within the `kind` block.
    ///
    /// Served from the name index built at parse time. An entry moved by an
    /// in-place edit is found by scanning instead.
    #[must_use]
    pub fn entry_index(&self, kind: BlockKind, name: &str) -> Option<usize> {
        let block = self.block(kind)?;
        if let Some(&i) = self.names[kind.index()].get(name) {
            if block.entry_name(i) == Some(name) {
                return Some(i);
            }
        }
        block.entry_names().position(|n| n == name)
    }

    typed_block!(ap_thermal, ap_thermal_mut, ApThermal, ApThermalHeader);
    typed_block!(asv, asv_mut, Asv, AsvHeader);
    typed_block!(dvfs, dvfs_mut, Dvfs, DvfsHeader);
    typed_block!(margin, margin_mut, Margin, MarginHeader);
    typed_block!(mif_thermal, mif_thermal_mut, MifThermal, MifThermalHeader);
    typed_block!(pll, pll_mut, Pll, PllHeader);
    typed_block!(rcc, rcc_mut, Rcc, RccHeader);
    typed_block!(timing, timing_mut, Timing, TimingParamHeader);
    typed_block!(minlock, minlock_mut, Minlock, MinlockHeader);
    typed_block!(gen_param, gen_param_mut, Gen, GenParamHeader);
    typed_block!(bin, bin_mut, Bin, BinHeader);
    typed_block!(new_timing, new_timing_mut, NewTiming, NewTimingParamHeader);
    typed_block!(pidtm, pidtm_mut, Pidtm, PidtmHeader);

    named_entry!(dvfs_domain, dvfs_domain_mut, dvfs, dvfs_mut, Dvfs, domains, DvfsDomain);
    named_entry!(asv_domain, asv_domain_mut, asv, asv_mut, Asv, domains, VoltageDomain);
    named_entry!(margin_domain, margin_domain_mut, margin, margin_mut, Margin, domains, MarginDomain);
    named_entry!(rcc_domain, rcc_domain_mut, rcc, rcc_mut, Rcc, domains, RccDomain);
    named_entry!(minlock_domain, minlock_domain_mut, minlock, minlock_mut, Minlock, domains, MinlockDomain);
    named_entry!(pll_entry, pll_entry_mut, pll, pll_mut, Pll, plls, Pll);
    named_entry!(gen_table, gen_table_mut, gen_param, gen_param_mut, Gen, tables, GenParamTable);
    named_entry!(binary, binary_mut, bin, bin_mut, Bin, binaries, Binary);
    named_entry!(pidtm_block, pidtm_block_mut, pidtm, pidtm_mut, Pidtm, blocks, PidtmBlock);
    named_entry!(ap_thermal_function, ap_thermal_function_mut, ap_thermal, ap_thermal_mut, ApThermal, functions, ApThermalFunction);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{EctBuilder, RawBlock};
    use alloc::vec;
    use alloc::vec::Vec;

    fn g3d_domain(parser_version: u32) -> DvfsDomain {
        DvfsDomain {
            name: String::from("dvfs_g3d"),
            kind: DomainKind::Gpu,
            max_frequency: 702_000,
            min_frequency: 260_000,
            boot_level_idx: if parser_version >= 2 { 1 } else { -1 },
            resume_level_idx: if parser_version >= 2 { 2 } else { -1 },
            mode: MemberMode::ClockName,
            members: vec![
                Member::Name(String::from("PLL_G3D")),
                Member::Name(String::from("DIV_G3D")),
            ],
            levels: vec![
                DvfsLevel { level: 702_000, level_en: 1 },
                DvfsLevel { level: 520_000, level_en: 1 },
                DvfsLevel { level: 260_000, level_en: 0 },
            ],
            values: vec![702_000, 0, 520_000, 0, 520_000, 1],
        }
    }

    fn dvfs_block(parser_version: u32) -> DvfsHeader {
        DvfsHeader {
            parser_version,
            version: *b"0001",
            domains: vec![g3d_domain(parser_version)],
        }
    }

    #[test]
    fn block_kind_prefix_dispatch() {
        assert_eq!(BlockKind::from_block_name("DVFS"), Some(BlockKind::Dvfs));
        assert_eq!(BlockKind::from_block_name("THERMAL_IF"), Some(BlockKind::MifThermal));
        assert_eq!(BlockKind::from_block_name("NEWTIMING"), Some(BlockKind::NewTiming));
        assert_eq!(BlockKind::from_block_name("TIMING_V2"), Some(BlockKind::Timing));
        assert_eq!(BlockKind::from_block_name("FOO"), None);
        for (i, k) in BlockKind::ALL.into_iter().enumerate() {
            assert_eq!(k.index(), i);
        }
    }

    #[test]
    fn dvfs_round_trip_per_parser_version() {
        for pv in 1..=3 {
            let blob = EctBuilder::new()
                .block("DVFS", Block::Dvfs(dvfs_block(pv)))
                .build();
            let ect = Ect::parse(&blob).unwrap();
            assert_eq!(ect.dvfs(), Some(&dvfs_block(pv)), "parser_version {pv}");
        }
    }

    #[test]
    fn dvfs_sfr_mode() {
        let mut hdr = dvfs_block(3);
        hdr.domains[0].mode = MemberMode::SfrAddress;
        hdr.domains[0].members = vec![Member::Sfr(0x1a33_0100), Member::Sfr(0x1a33_1800)];
        let blob = EctBuilder::new().block("DVFS", Block::Dvfs(hdr.clone())).build();
        let ect = Ect::parse(&blob).unwrap();
        assert_eq!(ect.dvfs(), Some(&hdr));
    }

    #[test]
    fn asv_versions_and_defaults() {
        let mk = |pv: u32| AsvHeader {
            parser_version: pv,
            version: *b"0002",
            domains: vec![VoltageDomain {
                name: String::from("dvfs_g3d"),
                kind: DomainKind::Gpu,
                num_of_group: 2,
                level_list: vec![702, 520],
                tables: vec![VoltageTable {
                    table_version: 5,
                    boot_level_idx: if pv >= 2 { 0 } else { -1 },
                    resume_level_idx: if pv >= 2 { 1 } else { -1 },
                    level_en: (pv >= 2).then(|| vec![1, 1]),
                    voltages: if pv >= 3 {
                        GroupValues::Compact {
                            steps: vec![128, 127, 100, 99],
                            step: PMIC_VOLTAGE_STEP,
                        }
                    } else {
                        GroupValues::Raw(vec![800_000, 793_750, 625_000, 618_750])
                    },
                }],
            }],
        };
        for pv in 1..=3 {
            let blob = EctBuilder::new().block("ASV", Block::Asv(mk(pv))).build();
            let ect = Ect::parse(&blob).unwrap();
            let asv = ect.asv().unwrap();
            assert_eq!(asv, &mk(pv));
            let d = asv.domain("dvfs_g3d").unwrap();
            assert_eq!(d.voltage(0, 0, 0), Some(800_000));
            assert_eq!(d.voltage(0, 1, 1), Some(618_750));
        }
    }

    #[test]
    fn remaining_blocks_parse() {
        let params = GenParamHeader {
            parser_version: 1,
            version: *b"0001",
            tables: vec![GenParamTable {
                name: String::from("MINMAX_dvfs_g3d"),
                num_of_col: 5,
                num_of_row: 1,
                parameters: vec![0, 702, 260, 520, 520],
            }],
        };
        let pll = PllHeader {
            parser_version: 1,
            version: *b"0001",
            plls: vec![Pll {
                name: String::from("PLL_G3D"),
                type_pll: 4,
                frequencies: vec![PllFrequency::new(702_000_000, 4, 108, 0, 0)],
            }],
        };
        let timing = TimingParamHeader {
            parser_version: 3,
            version: *b"0001",
            sizes: vec![TimingParamSize {
                parameter_key: 0x1_0000_0800,
                memory_size: 0x800,
                num_of_timing_param: 2,
                num_of_level: 1,
                timing_parameter: vec![7, 9],
            }],
        };
        let bin = BinHeader {
            parser_version: 1,
            version: *b"0001",
            binaries: vec![Binary {
                name: String::from("fw"),
                data: vec![1, 2, 3],
            }],
        };
        let mif = MifThermalHeader {
            parser_version: 1,
            version: *b"0001",
            levels: vec![MifThermalLevel {
                mr4_level: 3,
                max_frequency: 2_093_000,
                min_frequency: 421_000,
                refresh_rate_value: 2,
                polling_period: 100,
                sw_trip: 0,
            }],
        };
        let blob = EctBuilder::new()
            .block("GEN", Block::Gen(params.clone()))
            .block("PLL", Block::Pll(pll.clone()))
            .block("TIMING", Block::Timing(timing.clone()))
            .block("BIN", Block::Bin(bin.clone()))
            .block("THERMAL_IF", Block::MifThermal(mif.clone()))
            .build();
        let ect = Ect::parse(&blob).unwrap();
        assert_eq!(ect.gen_param(), Some(&params));
        assert_eq!(ect.pll(), Some(&pll));
        assert_eq!(ect.timing(), Some(&timing));
        assert_eq!(ect.bin(), Some(&bin));
        assert_eq!(ect.mif_thermal(), Some(&mif));
        assert_eq!(ect.timing().unwrap().size(0x800).unwrap().timing_parameter, [7, 9]);
        assert!(ect.mif_thermal().unwrap().level(3).is_some());
        assert!(ect.dvfs().is_none());
    }

    #[test]
    fn bad_section_is_isolated() {
        // A DVFS block whose domain offset points back into its own name table.
        let mut bad = Vec::new();
        bad.extend_from_slice(&1u32.to_le_bytes()); // parser_version
        bad.extend_from_slice(b"0001");
        bad.extend_from_slice(&1u32.to_le_bytes()); // one domain
        bad.extend_from_slice(&1u32.to_le_bytes());
        bad.extend_from_slice(b"x\0\0\0");
        bad.extend_from_slice(&0u32.to_le_bytes()); // offset 0: inside the table
        bad.extend_from_slice(&[0; 16]);

        let pll = PllHeader {
            parser_version: 1,
            version: *b"0001",
            plls: Vec::new(),
        };
        let blob = EctBuilder::new()
            .raw("DVFS", RawBlock(bad))
            .block("PLL", Block::Pll(pll.clone()))
            .build();
        let ect = Ect::parse(&blob).unwrap();
        assert_eq!(ect.block_error(BlockKind::Dvfs), Some(EctError::BadOffset));
        assert!(ect.dvfs().is_none());
        assert_eq!(ect.pll(), Some(&pll));
    }

    #[test]
    fn truncated_section_is_isolated() {
        let blob = EctBuilder::new()
            .block("DVFS", Block::Dvfs(dvfs_block(3)))
            .build();
        // Cut the blob mid-way through the DVFS value table and fix up total_size.
        let mut cut = blob[..blob.len() - 8].to_vec();
        let len = cut.len() as u32;
        cut[8..12].copy_from_slice(&len.to_le_bytes());
        let ect = Ect::parse(&cut).unwrap();
        assert_eq!(ect.block_error(BlockKind::Dvfs), Some(EctError::Truncated));
    }

    #[test]
    fn total_size_limits_reads() {
        let blob = EctBuilder::new()
            .block("DVFS", Block::Dvfs(dvfs_block(2)))
            .build();
        let mut short = blob.clone();
        let declared = (blob.len() - 4) as u32;
        short[8..12].copy_from_slice(&declared.to_le_bytes());
        let ect = Ect::parse(&short).unwrap();
        assert!(ect.block_error(BlockKind::Dvfs).is_some());
    }

    #[test]
    fn signature_failure_is_fatal() {
        let mut blob = EctBuilder::new().build();
        blob[0] = b'X';
        assert_eq!(Ect::parse(&blob), Err(EctError::BadSignature));
    }

    #[test]
    fn unknown_blocks_are_skipped() {
        let blob = EctBuilder::new()
            .raw("VENDOR", RawBlock(vec![0; 8]))
            .block("DVFS", Block::Dvfs(dvfs_block(3)))
            .build();
        let ect = Ect::parse(&blob).unwrap();
        assert!(ect.dvfs().is_some());
        assert_eq!(ect.slots().len(), 1);
        assert_eq!(ect.slot(BlockKind::Dvfs).unwrap().precedence, 1);
    }

    #[test]
    fn named_lookups_survive_edits() {
        let mut hdr = dvfs_block(3);
        let mut mif = g3d_domain(3);
        mif.name = String::from("dvfs_mif");
        hdr.domains.push(mif);
        let blob = EctBuilder::new().block("DVFS", Block::Dvfs(hdr)).build();
        let mut ect = Ect::parse(&blob).unwrap();
        assert_eq!(ect.entry_index(BlockKind::Dvfs, "dvfs_mif"), Some(1));
        assert_eq!(ect.dvfs_domain("dvfs_g3d").map(|d| d.max_frequency), Some(702_000));
        assert!(ect.dvfs_domain("dvfs_cpu").is_none());
        assert!(ect.entry_index(BlockKind::MifThermal, "dvfs_mif").is_none());

        // Reordered in place: the index is stale but lookups still resolve.
        ect.dvfs_mut().unwrap().domains.swap(0, 1);
        assert_eq!(ect.entry_index(BlockKind::Dvfs, "dvfs_mif"), Some(0));
        assert_eq!(ect.dvfs_domain("dvfs_g3d").unwrap().name, "dvfs_g3d");
        ect.dvfs_domain_mut("dvfs_g3d").unwrap().max_frequency = 1;
        assert_eq!(ect.dvfs().unwrap().domains[1].max_frequency, 1);
    }

    #[test]
    fn typed_mut_access() {
        let blob = EctBuilder::new()
            .block("DVFS", Block::Dvfs(dvfs_block(3)))
            .build();
        let mut ect = Ect::parse(&blob).unwrap();
        ect.dvfs_mut().unwrap().domains[0].max_frequency = 1;
        assert_eq!(ect.dvfs().unwrap().domain("dvfs_g3d").unwrap().max_frequency, 1);
        assert!(ect.gen_param_mut().is_none());
    }
}

//! ECT blob builder.
//!
//! The inverse of the parser: encodes typed blocks back into the on-disk
//! layout for their `parser_version`. Used by tests here and downstream
//! (behind the `builder` feature) to synthesize calibration blobs.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dvfs::{DvfsDomain, Member};
use crate::header::ECT_SIGNATURE;
use crate::reader::align4;
use crate::timing::NewTimingValues;
use crate::values::GroupValues;
use crate::Block;

/// Pre-encoded block bytes, placed verbatim.
#[derive(Debug, Clone)]
pub struct RawBlock(pub Vec<u8>);

/// Builds an ECT blob from typed or raw blocks.
#[derive(Debug, Clone)]
pub struct EctBuilder {
    version: [u8; 4],
    blocks: Vec<(String, Vec<u8>)>,
}

impl Default for EctBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EctBuilder {
    /// Creates an empty builder with a release version tag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: *b"1.00",
            blocks: Vec::new(),
        }
    }

    /// Sets the top-level version tag.
    #[must_use]
    pub fn version(mut self, tag: [u8; 4]) -> Self {
        self.version = tag;
        self
    }

    /// Appends a typed block under `name`.
    #[must_use]
    pub fn block(mut self, name: &str, block: Block) -> Self {
        self.blocks.push((String::from(name), encode_block(&block)));
        self
    }

    /// Appends raw block bytes under `name`.
    #[must_use]
    pub fn raw(mut self, name: &str, raw: RawBlock) -> Self {
        self.blocks.push((String::from(name), raw.0));
        self
    }

    /// Encodes the blob.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ECT_SIGNATURE);
        out.extend_from_slice(&self.version);
        put_u32(&mut out, 0); // total_size, patched below
        append_table(&mut out, 0, self.blocks);
        let total = out.len() as u32;
        out[8..12].copy_from_slice(&total.to_le_bytes());
        out
    }
}

// ---- primitive writers ------------------------------------------------------

fn put_u32(v: &mut Vec<u8>, x: u32) {
    v.extend_from_slice(&x.to_le_bytes());
}

fn put_i32(v: &mut Vec<u8>, x: i32) {
    v.extend_from_slice(&x.to_le_bytes());
}

fn put_u64(v: &mut Vec<u8>, x: u64) {
    put_u32(v, x as u32);
    put_u32(v, (x >> 32) as u32);
}

/// Writes a length-prefixed, NUL-terminated, 4-byte padded string.
fn put_str(v: &mut Vec<u8>, s: &str) {
    put_u32(v, s.len() as u32);
    v.extend_from_slice(s.as_bytes());
    v.resize(v.len() + align4(s.len() + 1) - s.len(), 0);
}

fn pad4(v: &mut Vec<u8>) {
    v.resize(align4(v.len()), 0);
}

fn put_values(v: &mut Vec<u8>, values: &GroupValues) {
    match values {
        GroupValues::Raw(raw) => raw.iter().for_each(|&x| put_i32(v, x)),
        GroupValues::Compact { steps, .. } => v.extend_from_slice(steps),
    }
}

// ---- tables -----------------------------------------------------------------

/// Appends a count plus `(name, offset)` table at the end of `out`, followed
/// by the bodies. Offsets are relative to `base`.
fn append_table(out: &mut Vec<u8>, base: usize, entries: Vec<(String, Vec<u8>)>) {
    put_u32(out, entries.len() as u32);
    let mut patch = Vec::with_capacity(entries.len());
    for (name, _) in &entries {
        put_str(out, name);
        patch.push(out.len());
        put_u32(out, 0);
    }
    for ((_, body), at) in entries.into_iter().zip(patch) {
        pad4(out);
        let offset = (out.len() - base) as u32;
        out[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&body);
    }
}

/// Appends a count plus `(key, offset)` table, keys 64-bit when `wide`.
fn append_key_table(out: &mut Vec<u8>, base: usize, wide: bool, entries: Vec<(u64, Vec<u8>)>) {
    put_u32(out, entries.len() as u32);
    let mut patch = Vec::with_capacity(entries.len());
    for (key, _) in &entries {
        if wide {
            put_u64(out, *key);
        } else {
            put_u32(out, *key as u32);
        }
        patch.push(out.len());
        put_u32(out, 0);
    }
    for ((_, body), at) in entries.into_iter().zip(patch) {
        pad4(out);
        let offset = (out.len() - base) as u32;
        out[at..at + 4].copy_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&body);
    }
}

fn section(pv: u32, version: [u8; 4]) -> Vec<u8> {
    let mut v = Vec::new();
    put_u32(&mut v, pv);
    v.extend_from_slice(&version);
    v
}

fn named(pv: u32, version: [u8; 4], entries: Vec<(String, Vec<u8>)>) -> Vec<u8> {
    let mut v = section(pv, version);
    append_table(&mut v, 0, entries);
    v
}

// ---- blocks -----------------------------------------------------------------

fn encode_dvfs_domain(pv: u32, d: &DvfsDomain) -> Vec<u8> {
    let mut v = Vec::new();
    put_u32(&mut v, d.max_frequency);
    put_u32(&mut v, d.min_frequency);
    if pv >= 2 {
        put_i32(&mut v, d.boot_level_idx);
        put_i32(&mut v, d.resume_level_idx);
    }
    if pv >= 3 {
        put_u32(&mut v, d.mode as u32);
    }
    put_u32(&mut v, d.members.len() as u32);
    put_u32(&mut v, d.levels.len() as u32);
    for m in &d.members {
        match m {
            Member::Name(n) => put_str(&mut v, n),
            Member::Sfr(a) => put_u32(&mut v, *a),
        }
    }
    for lv in &d.levels {
        put_u32(&mut v, lv.level);
        put_i32(&mut v, lv.level_en);
    }
    d.values.iter().for_each(|&x| put_u32(&mut v, x));
    v
}

/// Encodes a typed block into its on-disk layout.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn encode_block(block: &Block) -> Vec<u8> {
    match block {
        Block::Dvfs(h) => named(
            h.parser_version,
            h.version,
            h.domains
                .iter()
                .map(|d| (d.name.clone(), encode_dvfs_domain(h.parser_version, d)))
                .collect(),
        ),
        Block::Pll(h) => named(
            h.parser_version,
            h.version,
            h.plls
                .iter()
                .map(|p| {
                    let mut v = Vec::new();
                    put_u32(&mut v, p.type_pll);
                    put_u32(&mut v, p.frequencies.len() as u32);
                    for f in &p.frequencies {
                        for x in [f.frequency, f.p, f.m, f.s, f.k] {
                            put_u32(&mut v, x);
                        }
                    }
                    (p.name.clone(), v)
                })
                .collect(),
        ),
        Block::Asv(h) => named(
            h.parser_version,
            h.version,
            h.domains
                .iter()
                .map(|d| {
                    let mut v = Vec::new();
                    put_u32(&mut v, d.num_of_group);
                    put_u32(&mut v, d.level_list.len() as u32);
                    put_u32(&mut v, d.tables.len() as u32);
                    d.level_list.iter().for_each(|&x| put_i32(&mut v, x));
                    for t in &d.tables {
                        put_u32(&mut v, t.table_version);
                        if h.parser_version >= 2 {
                            put_i32(&mut v, t.boot_level_idx);
                            put_i32(&mut v, t.resume_level_idx);
                            let en = t.level_en.as_deref().unwrap_or(&[]);
                            (0..d.level_list.len())
                                .for_each(|i| put_i32(&mut v, en.get(i).copied().unwrap_or(1)));
                        }
                        put_values(&mut v, &t.voltages);
                    }
                    (d.name.clone(), v)
                })
                .collect(),
        ),
        Block::Rcc(h) => named(
            h.parser_version,
            h.version,
            h.domains
                .iter()
                .map(|d| {
                    let mut v = Vec::new();
                    put_u32(&mut v, d.num_of_group);
                    put_u32(&mut v, d.level_list.len() as u32);
                    put_u32(&mut v, d.tables.len() as u32);
                    d.level_list.iter().for_each(|&x| put_i32(&mut v, x));
                    for t in &d.tables {
                        put_u32(&mut v, t.table_version);
                        put_values(&mut v, &t.values);
                    }
                    (d.name.clone(), v)
                })
                .collect(),
        ),
        Block::Margin(h) => named(
            h.parser_version,
            h.version,
            h.domains
                .iter()
                .map(|d| {
                    let mut v = Vec::new();
                    put_u32(&mut v, d.num_of_group);
                    put_u32(&mut v, d.num_of_level);
                    put_values(&mut v, &d.offsets);
                    (d.name.clone(), v)
                })
                .collect(),
        ),
        Block::Gen(h) => named(
            h.parser_version,
            h.version,
            h.tables
                .iter()
                .map(|t| {
                    let mut v = Vec::new();
                    put_u32(&mut v, t.num_of_col);
                    put_u32(&mut v, t.num_of_row);
                    t.parameters.iter().for_each(|&x| put_u32(&mut v, x));
                    (t.name.clone(), v)
                })
                .collect(),
        ),
        Block::ApThermal(h) => named(
            h.parser_version,
            h.version,
            h.functions
                .iter()
                .map(|f| {
                    let mut v = Vec::new();
                    put_u32(&mut v, f.ranges.len() as u32);
                    for r in &f.ranges {
                        for x in [
                            r.lower_bound_temperature,
                            r.upper_bound_temperature,
                            r.max_frequency,
                            r.sw_trip,
                            r.flag,
                        ] {
                            put_u32(&mut v, x);
                        }
                    }
                    (f.name.clone(), v)
                })
                .collect(),
        ),
        Block::MifThermal(h) => {
            let mut v = section(h.parser_version, h.version);
            put_u32(&mut v, h.levels.len() as u32);
            for l in &h.levels {
                put_i32(&mut v, l.mr4_level);
                for x in [
                    l.max_frequency,
                    l.min_frequency,
                    l.refresh_rate_value,
                    l.polling_period,
                    l.sw_trip,
                ] {
                    put_u32(&mut v, x);
                }
            }
            v
        }
        Block::Timing(h) => {
            let mut v = section(h.parser_version, h.version);
            let wide = h.parser_version >= 3;
            let entries = h
                .sizes
                .iter()
                .map(|s| {
                    let mut b = Vec::new();
                    put_u32(&mut b, s.num_of_timing_param);
                    put_u32(&mut b, s.num_of_level);
                    s.timing_parameter.iter().for_each(|&x| put_u32(&mut b, x));
                    let key = if wide {
                        s.parameter_key
                    } else {
                        u64::from(s.memory_size)
                    };
                    (key, b)
                })
                .collect();
            append_key_table(&mut v, 0, wide, entries);
            v
        }
        Block::NewTiming(h) => {
            let mut v = section(h.parser_version, h.version);
            let entries = h
                .sizes
                .iter()
                .map(|s| {
                    let mut b = Vec::new();
                    let mode = u32::from(matches!(s.timing_parameter, NewTimingValues::Extend(_)));
                    put_u32(&mut b, mode);
                    put_u32(&mut b, s.num_of_timing_param);
                    put_u32(&mut b, s.num_of_level);
                    match &s.timing_parameter {
                        NewTimingValues::Normal(xs) => xs.iter().for_each(|&x| put_u32(&mut b, x)),
                        NewTimingValues::Extend(xs) => xs.iter().for_each(|&x| put_u64(&mut b, x)),
                    }
                    (s.parameter_key, b)
                })
                .collect();
            append_key_table(&mut v, 0, true, entries);
            v
        }
        Block::Minlock(h) => named(
            h.parser_version,
            h.version,
            h.domains
                .iter()
                .map(|d| {
                    let mut v = Vec::new();
                    put_u32(&mut v, d.levels.len() as u32);
                    for l in &d.levels {
                        put_u32(&mut v, l.main_frequencies);
                        put_u32(&mut v, l.sub_frequencies);
                    }
                    (d.name.clone(), v)
                })
                .collect(),
        ),
        Block::Bin(h) => named(
            h.parser_version,
            h.version,
            h.binaries
                .iter()
                .map(|b| {
                    let mut v = Vec::new();
                    put_u32(&mut v, b.data.len() as u32);
                    v.extend_from_slice(&b.data);
                    (b.name.clone(), v)
                })
                .collect(),
        ),
        Block::Pidtm(h) => named(
            h.parser_version,
            h.version,
            h.blocks
                .iter()
                .map(|b| {
                    let mut v = Vec::new();
                    put_u32(&mut v, b.temperatures.len() as u32);
                    b.temperatures.iter().for_each(|&x| put_i32(&mut v, x));
                    put_u32(&mut v, b.param_names.len() as u32);
                    b.param_names.iter().for_each(|n| put_str(&mut v, n));
                    b.param_values.iter().for_each(|&x| put_i32(&mut v, x));
                    (b.name.clone(), v)
                })
                .collect(),
        ),
    }
}

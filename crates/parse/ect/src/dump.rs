//! Human-readable dump of a parsed ECT.
//!
//! Blocks are printed in block-table order. Failed blocks print their error.

use core::fmt::{self, Write};

use crate::header::version_string;
use crate::{Block, BlockSlot, Ect};

/// Writes a dump of every block in `ect` to `out`.
///
/// # Errors
///
/// Propagates formatter errors from `out`.
pub fn dump(ect: &Ect, out: &mut impl Write) -> fmt::Result {
    let hdr = ect.header();
    writeln!(out, "[ECT] : ECT Information")?;
    writeln!(out, "[ECT] : version {}", hdr.version_str())?;
    writeln!(out, "[ECT] : total size {:#x}", hdr.total_size)?;
    writeln!(out, "[ECT] : {} blocks", hdr.blocks.len())?;

    for (_, slot) in ect.slots() {
        dump_slot(slot, out)?;
    }
    Ok(())
}

fn dump_slot(slot: &BlockSlot, out: &mut impl Write) -> fmt::Result {
    let block = match &slot.result {
        Ok(b) => b,
        Err(e) => return writeln!(out, "[{}] : parse error: {}", slot.name, e),
    };
    let tag = slot.name.as_str();

    match block {
        Block::Dvfs(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} domains", h.parser_version, version_string(&h.version), h.domains.len())?;
            for d in &h.domains {
                writeln!(
                    out,
                    "  {} : max {} min {} boot {} resume {} ({} members x {} levels)",
                    d.name,
                    d.max_frequency,
                    d.min_frequency,
                    d.boot_level_idx,
                    d.resume_level_idx,
                    d.num_of_clock(),
                    d.num_of_level()
                )?;
                for m in &d.members {
                    match m {
                        crate::Member::Name(n) => writeln!(out, "    member {n}")?,
                        crate::Member::Sfr(a) => writeln!(out, "    member {a:#010x}")?,
                    }
                }
                for (i, lv) in d.levels.iter().enumerate() {
                    write!(out, "    lv{i:<2} {:>8} en {} :", lv.level, lv.level_en)?;
                    for v in d.row(i).unwrap_or(&[]) {
                        write!(out, " {v}")?;
                    }
                    writeln!(out)?;
                }
            }
        }
        Block::Pll(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} plls", h.parser_version, version_string(&h.version), h.plls.len())?;
            for p in &h.plls {
                writeln!(out, "  {} : type {}", p.name, p.type_pll)?;
                for f in &p.frequencies {
                    writeln!(out, "    {:>10} Hz  p {} m {} s {} k {}", f.frequency, f.p, f.m, f.s, f.k)?;
                }
            }
        }
        Block::Asv(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} domains", h.parser_version, version_string(&h.version), h.domains.len())?;
            for d in &h.domains {
                writeln!(out, "  {} : {} groups, {} levels, {} tables", d.name, d.num_of_group, d.num_of_level(), d.tables.len())?;
                for (t, table) in d.tables.iter().enumerate() {
                    writeln!(
                        out,
                        "    table {t} version {} boot {} resume {}{}",
                        table.table_version,
                        table.boot_level_idx,
                        table.resume_level_idx,
                        if table.voltages.is_compact() { " (compact)" } else { "" }
                    )?;
                    for (lv, freq) in d.level_list.iter().enumerate() {
                        write!(out, "      {freq:>5} MHz en {} :", u8::from(table.level_enabled(lv)))?;
                        for g in 0..d.num_of_group as usize {
                            write!(out, " {}", d.voltage(t, lv, g).unwrap_or(0))?;
                        }
                        writeln!(out)?;
                    }
                }
            }
        }
        Block::Rcc(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} domains", h.parser_version, version_string(&h.version), h.domains.len())?;
            for d in &h.domains {
                writeln!(out, "  {} : {} groups, {} levels, {} tables", d.name, d.num_of_group, d.num_of_level(), d.tables.len())?;
                for t in &d.tables {
                    write!(out, "    table version {} :", t.table_version)?;
                    for i in 0..t.values.len() {
                        write!(out, " {}", t.values.get(i).unwrap_or(0))?;
                    }
                    writeln!(out)?;
                }
            }
        }
        Block::Margin(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} domains", h.parser_version, version_string(&h.version), h.domains.len())?;
            for d in &h.domains {
                write!(out, "  {} : {} groups x {} levels :", d.name, d.num_of_group, d.num_of_level)?;
                for i in 0..d.offsets.len() {
                    write!(out, " {}", d.offsets.get(i).unwrap_or(0))?;
                }
                writeln!(out)?;
            }
        }
        Block::Gen(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} tables", h.parser_version, version_string(&h.version), h.tables.len())?;
            for t in &h.tables {
                writeln!(out, "  {} : {} cols x {} rows", t.name, t.num_of_col, t.num_of_row)?;
                for row in t.rows() {
                    write!(out, "   ")?;
                    for v in row {
                        write!(out, " {v}")?;
                    }
                    writeln!(out)?;
                }
            }
        }
        Block::ApThermal(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} functions", h.parser_version, version_string(&h.version), h.functions.len())?;
            for f in &h.functions {
                writeln!(out, "  {} :", f.name)?;
                for r in &f.ranges {
                    writeln!(
                        out,
                        "    {}..{} C max {} sw_trip {} flag {}",
                        r.lower_bound_temperature, r.upper_bound_temperature, r.max_frequency, r.sw_trip, r.flag
                    )?;
                }
            }
        }
        Block::MifThermal(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} levels", h.parser_version, version_string(&h.version), h.levels.len())?;
            for l in &h.levels {
                writeln!(
                    out,
                    "  mr4 {} max {} min {} refresh {} polling {} sw_trip {}",
                    l.mr4_level, l.max_frequency, l.min_frequency, l.refresh_rate_value, l.polling_period, l.sw_trip
                )?;
            }
        }
        Block::Timing(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} sizes", h.parser_version, version_string(&h.version), h.sizes.len())?;
            for s in &h.sizes {
                writeln!(
                    out,
                    "  key {:#x} size {:#x} : {} params x {} levels",
                    s.parameter_key, s.memory_size, s.num_of_timing_param, s.num_of_level
                )?;
            }
        }
        Block::NewTiming(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} sizes", h.parser_version, version_string(&h.version), h.sizes.len())?;
            for s in &h.sizes {
                writeln!(
                    out,
                    "  key {:#x} mode {:?} : {} params x {} levels",
                    s.parameter_key, s.mode, s.num_of_timing_param, s.num_of_level
                )?;
            }
        }
        Block::Minlock(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} domains", h.parser_version, version_string(&h.version), h.domains.len())?;
            for d in &h.domains {
                writeln!(out, "  {} :", d.name)?;
                for l in &d.levels {
                    writeln!(out, "    main {} sub {}", l.main_frequencies, l.sub_frequencies)?;
                }
            }
        }
        Block::Bin(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} binaries", h.parser_version, version_string(&h.version), h.binaries.len())?;
            for b in &h.binaries {
                writeln!(out, "  {} : {} bytes crc {:#010x}", b.name, b.data.len(), b.checksum())?;
            }
        }
        Block::Pidtm(h) => {
            writeln!(out, "[{tag}] : v{} {}, {} blocks", h.parser_version, version_string(&h.version), h.blocks.len())?;
            for b in &h.blocks {
                write!(out, "  {} : temps", b.name)?;
                for t in &b.temperatures {
                    write!(out, " {t}")?;
                }
                writeln!(out)?;
                for (n, v) in b.param_names.iter().zip(&b.param_values) {
                    writeln!(out, "    {n} = {v}")?;
                }
            }
        }
    }
    Ok(())
}

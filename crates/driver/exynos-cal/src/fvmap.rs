//! FVMAP: the frequency/voltage map shared with the power-management
//! firmware.
//!
//! Firmware publishes one FVMAP image in SRAM; the kernel keeps its own
//! copy in DRAM. Both are 16 KiB, little-endian, and start with one
//! 24-byte [`FvmapHeader`] per DFS vclk, in vclk order. Each header points
//! at three tables inside the image:
//!
//! - members: a `u16` per member. PLL members hold the offset of a PLL
//!   record, the others hold `(addr & !3) | block index`;
//! - rate/volt: a `(kHz, uV)` pair of `u32` per level;
//! - parameters: a `u8` per level and member, level-major.
//!
//! [`Reconciler`] rebuilds the DRAM copy from the SRAM image so that it
//! covers the GPU operating points, and writes the resolved parameters
//! back into the vclk lookup tables.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use exynos_core::{kdebug, kerr, kinfo, kwarn};
use exynos_ect::{DomainKind, EctError};

use crate::clk::{ClkId, ClockTree};
use crate::config::{CalConfig, FVMAP_ADDR_BASE, FVMAP_SIZE};
use crate::error::CalError;
use crate::margin::{PERCENT_RANGE, add_uv, apply_percent};
use crate::override_engine::{nearest_rate, try_vec};
use crate::pll;
use crate::vclk::{LutRow, Vclk};

const LOG: &str = "fvmap";

/// Size of one [`FvmapHeader`].
pub const HEADER_SIZE: usize = 24;

/// Fixed part of a PLL record: `addr u32, o_lock u16, level u16`.
const PLL_RECORD_FIXED: usize = 8;

/// Size of one rate/volt pair.
const RATEVOLT_SIZE: usize = 8;

const BLOCK_COUNT: usize = 3;

const fn align(v: usize, to: usize) -> usize {
    v.div_ceil(to) * to
}

fn bad_offset() -> CalError {
    CalError::Format(EctError::BadOffset)
}

fn offset16(v: usize) -> Result<u16, CalError> {
    u16::try_from(v).map_err(|_| CalError::Range)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Per-domain FVMAP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct FvmapHeader {
    pub dvfs_type: u8,
    pub num_of_lv: u8,
    pub num_of_members: u8,
    pub num_of_pll: u8,
    pub num_of_mux: u8,
    pub num_of_div: u8,
    pub gearratio: u16,
    pub init_lv: u8,
    pub num_of_gate: u8,
    pub reserved: [u8; 2],
    /// Upper halves of the register blocks non-PLL members live in.
    pub block_addr: [u16; BLOCK_COUNT],
    pub o_members: u16,
    pub o_ratevolt: u16,
    pub o_tables: u16,
}

impl FvmapHeader {
    /// Decodes a header.
    #[must_use]
    pub fn from_bytes(b: &[u8; HEADER_SIZE]) -> Self {
        let u16_at = |o: usize| u16::from_le_bytes([b[o], b[o + 1]]);
        Self {
            dvfs_type: b[0],
            num_of_lv: b[1],
            num_of_members: b[2],
            num_of_pll: b[3],
            num_of_mux: b[4],
            num_of_div: b[5],
            gearratio: u16_at(6),
            init_lv: b[8],
            num_of_gate: b[9],
            reserved: [b[10], b[11]],
            block_addr: [u16_at(12), u16_at(14), u16_at(16)],
            o_members: u16_at(18),
            o_ratevolt: u16_at(20),
            o_tables: u16_at(22),
        }
    }

    /// Encodes the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut b = [0u8; HEADER_SIZE];
        b[0] = self.dvfs_type;
        b[1] = self.num_of_lv;
        b[2] = self.num_of_members;
        b[3] = self.num_of_pll;
        b[4] = self.num_of_mux;
        b[5] = self.num_of_div;
        b[6..8].copy_from_slice(&self.gearratio.to_le_bytes());
        b[8] = self.init_lv;
        b[9] = self.num_of_gate;
        b[10..12].copy_from_slice(&self.reserved);
        for (i, a) in self.block_addr.iter().enumerate() {
            b[12 + i * 2..14 + i * 2].copy_from_slice(&a.to_le_bytes());
        }
        b[18..20].copy_from_slice(&self.o_members.to_le_bytes());
        b[20..22].copy_from_slice(&self.o_ratevolt.to_le_bytes());
        b[22..24].copy_from_slice(&self.o_tables.to_le_bytes());
        b
    }

    fn levels(&self) -> usize {
        usize::from(self.num_of_lv)
    }

    fn members(&self) -> usize {
        usize::from(self.num_of_members)
    }

    /// Returns the first byte past the furthest of this domain's tables.
    #[must_use]
    pub fn end(&self) -> usize {
        let members = usize::from(self.o_members) + self.members() * 2;
        let ratevolt = usize::from(self.o_ratevolt) + self.levels() * RATEVOLT_SIZE;
        let tables = usize::from(self.o_tables) + self.levels() * self.members();
        members.max(ratevolt).max(tables)
    }

    /// Returns how many rate/volt pairs fit before the parameter table.
    ///
    /// This is `num_of_lv`, lowered to the gap between the two tables when
    /// that gap is smaller.
    #[must_use]
    pub fn ratevolt_capacity(&self) -> usize {
        let lv = self.levels();
        match usize::from(self.o_tables)
            .checked_sub(usize::from(self.o_ratevolt))
            .map(|gap| gap / RATEVOLT_SIZE)
        {
            Some(cap) if cap != 0 && cap < lv => cap,
            _ => lv,
        }
    }
}

/// A PLL record: the PLL's address and its PMS words by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PllRecord {
    /// `PLL_CON0` address in firmware space.
    pub addr: u32,
    /// Lock register offset.
    pub o_lock: u16,
    /// PMS words, `P << 24 | M << 12 | S << 8`.
    pub pms: Vec<u32>,
}

impl PllRecord {
    fn size(&self) -> usize {
        PLL_RECORD_FIXED + self.pms.len() * 4
    }
}

/// Contents of one domain, for [`FvmapImage::layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainImage {
    /// Header scalars; counts and offsets are filled in by the layout.
    pub header: FvmapHeader,
    /// PLL members, first in member order.
    pub plls: Vec<PllRecord>,
    /// Non-PLL member words.
    pub members: Vec<u16>,
    /// Rate/volt pairs.
    pub ratevolt: Vec<(u32, u32)>,
    /// Parameters, level-major.
    pub params: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A 16 KiB FVMAP image.
#[derive(Clone, PartialEq, Eq)]
pub struct FvmapImage {
    bytes: Vec<u8>,
}

impl fmt::Debug for FvmapImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FvmapImage")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

impl Default for FvmapImage {
    fn default() -> Self {
        Self::new()
    }
}

impl FvmapImage {
    /// Creates a zeroed image.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: vec![0; FVMAP_SIZE],
        }
    }

    /// Copies `data` into a new image, zero-padding it to 16 KiB.
    ///
    /// # Errors
    ///
    /// [`EctError::TooLarge`] if `data` exceeds 16 KiB.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CalError> {
        if data.len() > FVMAP_SIZE {
            return Err(CalError::Format(EctError::TooLarge));
        }
        let mut img = Self::new();
        img.bytes[..data.len()].copy_from_slice(data);
        Ok(img)
    }

    /// Returns the raw image.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn slice(&self, off: usize, len: usize) -> Result<&[u8], CalError> {
        let end = off.checked_add(len).ok_or_else(bad_offset)?;
        self.bytes.get(off..end).ok_or_else(bad_offset)
    }

    fn slice_mut(&mut self, off: usize, len: usize) -> Result<&mut [u8], CalError> {
        let end = off.checked_add(len).ok_or_else(bad_offset)?;
        self.bytes.get_mut(off..end).ok_or_else(bad_offset)
    }

    fn read_u16(&self, off: usize) -> Result<u16, CalError> {
        let b = self.slice(off, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, off: usize) -> Result<u32, CalError> {
        let b = self.slice(off, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_u16(&mut self, off: usize, v: u16) -> Result<(), CalError> {
        self.slice_mut(off, 2)?.copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    fn write_u32(&mut self, off: usize, v: u32) -> Result<(), CalError> {
        self.slice_mut(off, 4)?.copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    /// Reads the header of domain `idx`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn header(&self, idx: usize) -> Result<FvmapHeader, CalError> {
        let off = idx.checked_mul(HEADER_SIZE).ok_or_else(bad_offset)?;
        let b: &[u8; HEADER_SIZE] = self.slice(off, HEADER_SIZE)?.try_into().map_err(|_| bad_offset())?;
        Ok(FvmapHeader::from_bytes(b))
    }

    /// Writes the header of domain `idx`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn set_header(&mut self, idx: usize, h: &FvmapHeader) -> Result<(), CalError> {
        let off = idx.checked_mul(HEADER_SIZE).ok_or_else(bad_offset)?;
        self.slice_mut(off, HEADER_SIZE)?.copy_from_slice(&h.to_bytes());
        Ok(())
    }

    fn ratevolt_off(h: &FvmapHeader, lv: usize) -> usize {
        usize::from(h.o_ratevolt) + lv * RATEVOLT_SIZE
    }

    fn param_off(h: &FvmapHeader, lv: usize, m: usize) -> usize {
        usize::from(h.o_tables) + lv * h.members() + m
    }

    /// Reads the `(kHz, uV)` pair of level `lv`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn rate_volt(&self, h: &FvmapHeader, lv: usize) -> Result<(u32, u32), CalError> {
        let off = Self::ratevolt_off(h, lv);
        Ok((self.read_u32(off)?, self.read_u32(off + 4)?))
    }

    /// Writes the `(kHz, uV)` pair of level `lv`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn set_rate_volt(&mut self, h: &FvmapHeader, lv: usize, rate: u32, volt: u32) -> Result<(), CalError> {
        let off = Self::ratevolt_off(h, lv);
        self.write_u32(off, rate)?;
        self.write_u32(off + 4, volt)
    }

    /// Reads the parameter of member `m` at level `lv`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn param(&self, h: &FvmapHeader, lv: usize, m: usize) -> Result<u8, CalError> {
        Ok(self.slice(Self::param_off(h, lv, m), 1)?[0])
    }

    /// Writes the parameter of member `m` at level `lv`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn set_param(&mut self, h: &FvmapHeader, lv: usize, m: usize, v: u8) -> Result<(), CalError> {
        self.slice_mut(Self::param_off(h, lv, m), 1)?[0] = v;
        Ok(())
    }

    /// Checks that the rate/volt and parameter tables `h` describes lie
    /// inside the image.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] if either table runs past the end.
    pub fn check_tables(&self, h: &FvmapHeader) -> Result<(), CalError> {
        let lv = h.levels();
        self.slice(usize::from(h.o_ratevolt), lv * RATEVOLT_SIZE)?;
        self.slice(usize::from(h.o_tables), lv * h.members())?;
        Ok(())
    }

    /// Reads the member word of member `m`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] past the end of the image.
    pub fn member(&self, h: &FvmapHeader, m: usize) -> Result<u16, CalError> {
        self.read_u16(usize::from(h.o_members) + m * 2)
    }

    /// Reads the PLL record at `off`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] if the record runs past the image.
    pub fn pll_record(&self, off: usize) -> Result<PllRecord, CalError> {
        let addr = self.read_u32(off)?;
        let o_lock = self.read_u16(off + 4)?;
        let level = usize::from(self.read_u16(off + 6)?);
        let pms = (0..level)
            .map(|i| self.read_u32(off + PLL_RECORD_FIXED + i * 4))
            .collect::<Result<_, _>>()?;
        Ok(PllRecord { addr, o_lock, pms })
    }

    fn write_pll_record(&mut self, off: usize, r: &PllRecord) -> Result<(), CalError> {
        self.write_u32(off, r.addr)?;
        self.write_u16(off + 4, r.o_lock)?;
        self.write_u16(off + 6, offset16(r.pms.len())?)?;
        for (i, &w) in r.pms.iter().enumerate() {
            self.write_u32(off + PLL_RECORD_FIXED + i * 4, w)?;
        }
        Ok(())
    }

    /// Lays out `domains` into a new image, headers first.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] if a domain's parameter count is not
    /// levels times members, [`CalError::Range`] if the image overflows.
    pub fn layout(domains: &[DomainImage]) -> Result<Self, CalError> {
        let mut img = Self::new();
        let mut cursor = align(domains.len() * HEADER_SIZE, 4);
        for (idx, d) in domains.iter().enumerate() {
            let members = d.plls.len() + d.members.len();
            let levels = d.ratevolt.len();
            if d.params.len() != levels * members {
                kerr!(
                    target: LOG,
                    "domain {}: {} parameters, expected {}",
                    idx, d.params.len(), levels * members
                );
                return Err(CalError::InvalidArgument);
            }
            let mut h = d.header;
            h.num_of_members = u8::try_from(members).map_err(|_| CalError::Range)?;
            h.num_of_pll = u8::try_from(d.plls.len()).map_err(|_| CalError::Range)?;
            h.num_of_lv = u8::try_from(levels).map_err(|_| CalError::Range)?;

            h.o_members = offset16(cursor)?;
            cursor = align(cursor + members * 2, 4);
            let mut words = Vec::with_capacity(members);
            for r in &d.plls {
                words.push(offset16(cursor)?);
                img.write_pll_record(cursor, r).map_err(|_| CalError::Range)?;
                cursor = align(cursor + r.size(), 4);
            }
            words.extend_from_slice(&d.members);
            for (m, &w) in words.iter().enumerate() {
                img.write_u16(usize::from(h.o_members) + m * 2, w)
                    .map_err(|_| CalError::Range)?;
            }

            h.o_ratevolt = offset16(align(cursor, 8))?;
            h.o_tables = offset16(align(usize::from(h.o_ratevolt) + levels * RATEVOLT_SIZE, 4))?;
            cursor = usize::from(h.o_tables) + levels * members;
            if cursor > FVMAP_SIZE {
                return Err(CalError::Range);
            }
            for (lv, &(rate, volt)) in d.ratevolt.iter().enumerate() {
                img.set_rate_volt(&h, lv, rate, volt)?;
            }
            img.slice_mut(usize::from(h.o_tables), d.params.len())?
                .copy_from_slice(&d.params);
            img.set_header(idx, &h)?;
        }
        Ok(img)
    }

    // -----------------------------------------------------------------------
    // Voltage tables
    // -----------------------------------------------------------------------

    /// Returns every `(kHz, uV)` pair of domain `idx`.
    ///
    /// # Errors
    ///
    /// [`EctError::BadOffset`] if the domain's table lies outside the image.
    pub fn rate_asv_table(&self, idx: usize) -> Result<Vec<(u32, u32)>, CalError> {
        let h = self.header(idx)?;
        (0..h.levels()).map(|lv| self.rate_volt(&h, lv)).collect()
    }

    /// Returns the voltages of domain `idx`.
    ///
    /// # Errors
    ///
    /// As [`FvmapImage::rate_asv_table`].
    pub fn voltage_table(&self, idx: usize) -> Result<Vec<u32>, CalError> {
        Ok(self.rate_asv_table(idx)?.into_iter().map(|(_, v)| v).collect())
    }

    fn map_volts(&mut self, idx: usize, f: impl Fn(usize, u32) -> u32) -> Result<(), CalError> {
        let h = self.header(idx)?;
        for lv in 0..h.levels() {
            let (rate, volt) = self.rate_volt(&h, lv)?;
            self.set_rate_volt(&h, lv, rate, f(lv, volt))?;
        }
        Ok(())
    }

    /// Adds `delta_uv` to every voltage of domain `idx`, clamped.
    ///
    /// # Errors
    ///
    /// As [`FvmapImage::rate_asv_table`].
    pub fn add_voltage(&mut self, idx: usize, delta_uv: i64) -> Result<(), CalError> {
        self.map_volts(idx, |_, v| add_uv(v, delta_uv))
    }

    /// Scales every voltage of domain `idx` by `percent`.
    ///
    /// # Errors
    ///
    /// As [`FvmapImage::rate_asv_table`].
    pub fn scale_voltages(&mut self, idx: usize, percent: i32) -> Result<(), CalError> {
        self.map_volts(idx, |_, v| apply_percent(v, percent))
    }

    /// Sets the voltages of domain `idx` to those of `base`, scaled by
    /// `percent`.
    ///
    /// # Errors
    ///
    /// As [`FvmapImage::rate_asv_table`], for either image.
    pub fn rescale_from(&mut self, base: &Self, idx: usize, percent: i32) -> Result<(), CalError> {
        let volts = base.voltage_table(idx)?;
        self.map_volts(idx, |lv, v| volts.get(lv).map_or(v, |&b| apply_percent(b, percent)))
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Rebuilds the DRAM FVMAP from the SRAM image.
pub struct Reconciler<'a> {
    /// Clock tree, with PLL divider tables loaded.
    pub tree: &'a ClockTree,
    /// Operating points and init margins.
    pub config: &'a CalConfig,
    /// Percentage applied to the SRAM voltages first.
    pub volt_offset_percent: i32,
}

impl Reconciler<'_> {
    /// Reconciles every vclk with its FVMAP domain.
    ///
    /// Applies the volt offset percentage to `sram` in place, then returns
    /// the DRAM image and each domain's outcome: the new level count, or the
    /// error that stopped that domain. A failed domain keeps its SRAM
    /// contents in the DRAM copy.
    pub fn run(&self, sram: &mut FvmapImage, vclks: &mut [Vclk]) -> (FvmapImage, Vec<Result<usize, CalError>>) {
        let percent = self
            .volt_offset_percent
            .clamp(*PERCENT_RANGE.start(), *PERCENT_RANGE.end());
        if percent != 0 {
            for idx in vclks.iter().map(|v| v.fvmap_domain) {
                if let Err(e) = sram.scale_voltages(idx, percent) {
                    kwarn!(target: LOG, "domain {}: volt offset not applied: {}", idx, e);
                }
            }
            kinfo!(target: LOG, "volt offset {}% applied", percent);
        }

        let sram: &FvmapImage = sram;
        let mut dram = sram.clone();
        let domains = vclks.iter().map(|v| v.fvmap_domain + 1).max().unwrap_or(0);
        let used = (0..domains)
            .filter_map(|i| sram.header(i).ok())
            .map(|h| h.end())
            .max()
            .unwrap_or(domains * HEADER_SIZE);
        let mut next_free = align(used, 4);
        kdebug!(target: LOG, "{} bytes in use", next_free);

        let outcomes = vclks
            .iter_mut()
            .map(|vclk| {
                let idx = vclk.fvmap_domain;
                let r = self.reconcile_domain(sram, &mut dram, idx, vclk, &mut next_free);
                match &r {
                    Ok(lv) => kdebug!(target: LOG, "{}: {} levels", vclk.name, lv),
                    Err(e) => kerr!(target: LOG, "{}: not reconciled: {}", vclk.name, e),
                }
                r
            })
            .collect();
        (dram, outcomes)
    }

    fn resolve_member(&self, sram: &FvmapImage, h: &FvmapHeader, m: usize) -> ClkId {
        let word = match sram.member(h, m) {
            Ok(w) => w,
            Err(e) => {
                kerr!(target: LOG, "member {}: {}", m, e);
                return ClkId::INVALID;
            }
        };
        let addr = if m < usize::from(h.num_of_pll) {
            match sram.pll_record(usize::from(word)) {
                Ok(r) => r.addr.wrapping_sub(FVMAP_ADDR_BASE),
                Err(e) => {
                    kerr!(target: LOG, "member {}: PLL record at {:#x}: {}", m, word, e);
                    return ClkId::INVALID;
                }
            }
        } else {
            let blk = usize::from(word & 3);
            let Some(&block) = h.block_addr.get(blk) else {
                kerr!(target: LOG, "member {}: block index {} out of range", m, blk);
                return ClkId::INVALID;
            };
            (u32::from(word & !3) & 0xffff) | (u32::from(block) << 16).wrapping_sub(FVMAP_ADDR_BASE)
        };
        self.tree.id_by_addr(addr).unwrap_or_else(|| {
            kwarn!(target: LOG, "member {}: no clock at {:#010x}", m, addr);
            ClkId::INVALID
        })
    }

    fn reconcile_domain(
        &self,
        sram: &FvmapImage,
        dram: &mut FvmapImage,
        idx: usize,
        vclk: &mut Vclk,
        next_free: &mut usize,
    ) -> Result<usize, CalError> {
        let old = sram.header(idx)?;
        let mut new = old;
        let old_lv = old.levels();
        let members = old.members();
        let gpu = vclk.kind == DomainKind::Gpu;

        let old_rv = sram.rate_asv_table(idx)?;
        let targets: Vec<(u32, u32)> = if gpu && !self.config.operating_points.is_empty() {
            let mut t = try_vec(self.config.operating_points.len())?;
            t.extend(self.config.operating_points.iter().map(|op| (op.rate_khz, op.volt_uv)));
            t
        } else {
            old_rv.clone()
        };

        let mut new_lv = targets.len();
        let mut relocated_end = None;
        let capacity = old.ratevolt_capacity();
        if new_lv > capacity {
            let o_ratevolt = align(*next_free, 8);
            let o_tables = align(o_ratevolt + new_lv * RATEVOLT_SIZE, 4);
            let end = o_tables + new_lv * members;
            if end <= FVMAP_SIZE {
                new.o_ratevolt = offset16(o_ratevolt)?;
                new.o_tables = offset16(o_tables)?;
                relocated_end = Some(end);
                kinfo!(
                    target: LOG,
                    "{}: tables moved to {:#x}/{:#x} for {} levels",
                    vclk.name, o_ratevolt, o_tables, new_lv
                );
            } else {
                kerr!(
                    target: LOG,
                    "{}: {} levels need {} bytes, truncated to {}",
                    vclk.name, new_lv, end, capacity
                );
                new_lv = capacity;
            }
        }
        new.num_of_lv = u8::try_from(new_lv).map_err(|_| CalError::Range)?;

        let resolved: Vec<ClkId> = (0..members).map(|m| self.resolve_member(sram, &old, m)).collect();
        let plls: Vec<Option<PllRecord>> = (0..usize::from(old.num_of_pll).min(members))
            .map(|m| {
                sram.member(&old, m)
                    .and_then(|w| sram.pll_record(usize::from(w)))
                    .ok()
            })
            .collect();

        let mut rows = try_vec::<Vec<u8>>(new_lv)?;
        for (lv, &(rate, _)) in targets.iter().take(new_lv).enumerate() {
            let mut row = if lv < old_lv {
                let near = nearest_rate(old_rv.iter().map(|&(r, _)| r), rate).unwrap_or(0);
                (0..members)
                    .map(|m| sram.param(&old, near, m))
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                rows.last().cloned().unwrap_or_else(|| vec![0; members])
            };
            for (m, rec) in plls.iter().enumerate() {
                let Some(rec) = rec else {
                    continue;
                };
                let table = self
                    .tree
                    .pll(resolved[m])
                    .map_or(&[][..], |p| p.rate_table.as_slice());
                let pms_idx = pll::lookup(table, rate, None)
                    .and_then(|f| rec.pms.iter().position(|&w| w == pll::pms_word(&f)))
                    .and_then(|i| u8::try_from(i).ok());
                if let Some(i) = pms_idx {
                    row[m] = i;
                }
            }
            rows.push(row);
        }

        // Nothing reaches DRAM unless every table it describes fits.
        dram.check_tables(&new)?;
        if let Some(end) = relocated_end {
            *next_free = end;
        }
        dram.set_header(idx, &new)?;
        for (lv, (&(rate, volt), row)) in targets.iter().zip(&rows).enumerate() {
            dram.set_rate_volt(&new, lv, rate, volt)?;
            for (m, &p) in row.iter().enumerate() {
                dram.set_param(&new, lv, m, p)?;
            }
        }
        if let Some(cat) = vclk.margin {
            let margin = self.config.init_margin(cat);
            if margin != 0 {
                dram.add_voltage(idx, i64::from(margin))?;
                kinfo!(target: LOG, "{}: init margin {} uV", vclk.name, margin);
            }
        }

        if resolved.len() == vclk.members.len() {
            for (m, (slot, &id)) in vclk.members.iter_mut().zip(&resolved).enumerate() {
                if id.is_valid() && *slot != id {
                    kwarn!(target: LOG, "{}: member {} is {:?}, FVMAP has {:?}", vclk.name, m, slot, id);
                    *slot = id;
                }
            }
            sync_lut(vclk, &targets[..new_lv], &rows, old_lv, gpu)?;
        } else {
            kwarn!(
                target: LOG,
                "{}: {} FVMAP members, {} LUT members; LUT left as is",
                vclk.name, members, vclk.members.len()
            );
        }
        Ok(new_lv)
    }
}

/// Writes resolved parameters into the LUT, growing it by template copy.
///
/// PLL members keep their kHz rate: the domain rate on the GPU, the LUT's
/// own value elsewhere.
fn sync_lut(
    vclk: &mut Vclk,
    targets: &[(u32, u32)],
    rows: &[Vec<u8>],
    old_lv: usize,
    gpu: bool,
) -> Result<(), CalError> {
    for (lv, (&(rate, _), row)) in targets.iter().zip(rows).enumerate() {
        if lv >= vclk.lut.len() {
            let Some(template) = vclk.lut.last().cloned() else {
                return Err(CalError::InvalidArgument);
            };
            vclk.lut.try_reserve(1)?;
            vclk.lut.push(template);
        }
        let LutRow { rate: lut_rate, params } = &mut vclk.lut[lv];
        *lut_rate = rate;
        for (m, (p, &v)) in params.iter_mut().zip(row).enumerate() {
            if vclk.members[m].is_pll() {
                if gpu {
                    *p = rate;
                }
                continue;
            }
            let v = u32::from(v);
            if *p != v && lv < old_lv && !gpu {
                kdebug!(target: LOG, "{}: level {} member {}: {} -> {}", vclk.name, lv, m, p, v);
            }
            *p = v;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::G3D_OPERATING_POINTS;
    use crate::margin::MarginCategory;
    use crate::override_engine;
    use crate::soc;
    use crate::testutil;
    use crate::vclk::VclkId;
    use alloc::vec;

    struct Fixture {
        tree: ClockTree,
        vclk: Vclk,
        sram: FvmapImage,
        config: CalConfig,
    }

    fn fixture(config: CalConfig) -> Fixture {
        let firmware = testutil::g3d_ect();
        let sram = soc::reference_fvmap(&firmware, 0).unwrap();
        let mut ect = firmware;
        override_engine::apply(&mut ect, &config);
        let mut tree = soc::g3d_clock_tree();
        tree.load_pll_tables(&ect);
        let spec = soc::g3d_vclk_spec(&tree, false);
        let vclk =
            Vclk::build(VclkId::new(0), &spec, &ect, &tree, 0, &config.extra_gpu_rates).unwrap();
        Fixture { tree, vclk, sram, config }
    }

    fn run(f: &mut Fixture, percent: i32) -> (FvmapImage, Vec<Result<usize, CalError>>) {
        let r = Reconciler {
            tree: &f.tree,
            config: &f.config,
            volt_offset_percent: percent,
        };
        r.run(&mut f.sram, core::slice::from_mut(&mut f.vclk))
    }

    fn params(img: &FvmapImage, h: &FvmapHeader, lv: usize) -> [u8; 3] {
        [0, 1, 2].map(|m| img.param(h, lv, m).unwrap())
    }

    #[test]
    fn header_field_offsets() {
        let h = FvmapHeader {
            dvfs_type: 1,
            num_of_lv: 2,
            num_of_members: 3,
            num_of_pll: 4,
            num_of_mux: 5,
            num_of_div: 6,
            gearratio: 0x0807,
            init_lv: 9,
            num_of_gate: 10,
            reserved: [11, 12],
            block_addr: [0x0e0d, 0x100f, 0x1211],
            o_members: 0x1413,
            o_ratevolt: 0x1615,
            o_tables: 0x1817,
        };
        let b = h.to_bytes();
        assert_eq!(b.to_vec(), (1..=24).collect::<Vec<u8>>());
        assert_eq!(FvmapHeader::from_bytes(&b), h);
    }

    #[test]
    fn capacity_is_bounded_by_table_gap() {
        let mut h = FvmapHeader {
            num_of_lv: 11,
            o_ratevolt: 0x100,
            o_tables: 0x100 + 8 * 11,
            ..FvmapHeader::default()
        };
        assert_eq!(h.ratevolt_capacity(), 11);
        h.o_tables = 0x100 + 8 * 5;
        assert_eq!(h.ratevolt_capacity(), 5);
        // Tables before the rate/volt pairs leave the level count alone.
        h.o_tables = 0x80;
        assert_eq!(h.ratevolt_capacity(), 11);
    }

    #[test]
    fn reads_past_the_image_fail() {
        let img = FvmapImage::new();
        let h = FvmapHeader {
            num_of_lv: 1,
            o_ratevolt: u16::try_from(FVMAP_SIZE - 4).unwrap(),
            ..FvmapHeader::default()
        };
        assert_eq!(img.rate_volt(&h, 0), Err(CalError::Format(EctError::BadOffset)));
        assert!(img.header(FVMAP_SIZE / HEADER_SIZE).is_err());
        assert!(FvmapImage::from_bytes(&[0; FVMAP_SIZE + 1]).is_err());
    }

    #[test]
    fn gpu_tables_are_relocated_and_filled() {
        let mut f = fixture(CalConfig::default());
        let before = f.sram.clone();
        let (dram, outcomes) = run(&mut f, 0);
        assert_eq!(outcomes, vec![Ok(16)]);
        assert_eq!(f.sram, before);

        let old = f.sram.header(0).unwrap();
        let h = dram.header(0).unwrap();
        assert_eq!(old.end(), 209);
        assert_eq!((h.num_of_lv, h.o_ratevolt, h.o_tables), (16, 216, 344));
        assert_eq!((h.o_members, h.num_of_members), (old.o_members, old.num_of_members));

        let rv = dram.rate_asv_table(0).unwrap();
        let expected: Vec<(u32, u32)> = G3D_OPERATING_POINTS
            .iter()
            .map(|op| (op.rate_khz, op.volt_uv))
            .collect();
        assert_eq!(rv, expected);

        // Nearest firmware level for the first eleven, copy-down after;
        // PLL indexes follow the PMS record where it has the rate.
        let rows: Vec<[u8; 3]> = (0..16).map(|lv| params(&dram, &h, lv)).collect();
        assert_eq!(rows[0], [0, 1, 1]);
        assert_eq!(rows[2], [1, 1, 1]);
        assert_eq!(rows[5], [3, 1, 1]);
        assert_eq!(rows[7], [5, 1, 0]);
        assert_eq!(rows[9], [6, 1, 0]);
        assert_eq!(rows[11], [8, 1, 0]);
        assert_eq!(rows[13], [9, 1, 0]);
        assert_eq!(rows[15], [10, 1, 0]);

        // Dual write: non-PLL parameters land in the LUT too.
        assert_eq!(f.vclk.lv_num(), 16);
        assert!(f.vclk.is_aligned());
        assert_eq!(f.vclk.lut[5].params, vec![676_000, 1, 1]);
        assert_eq!(f.vclk.lut[13].params, vec![200_000, 1, 0]);
    }

    #[test]
    fn init_margin_lands_in_dram_only() {
        let mut config = CalConfig::default();
        config.init_margins[MarginCategory::G3d.index()] = 12_500;
        let mut f = fixture(config);
        let (dram, _) = run(&mut f, 0);
        assert_eq!(dram.voltage_table(0).unwrap()[0], 887_500);
        assert_eq!(f.sram.voltage_table(0).unwrap()[0], 850_000);
    }

    #[test]
    fn volt_offset_scales_sram() {
        let mut f = fixture(CalConfig::default());
        run(&mut f, 10);
        // 10% of 850000 is 85000, rounded down to 81250.
        assert_eq!(f.sram.voltage_table(0).unwrap()[0], 931_250);
    }

    #[test]
    fn full_image_truncates_to_capacity() {
        let mut f = fixture(CalConfig::default());
        let mut h = f.sram.header(0).unwrap();
        h.o_tables = u16::try_from(FVMAP_SIZE - 33).unwrap();
        f.sram.set_header(0, &h).unwrap();
        let (dram, outcomes) = run(&mut f, 0);
        assert_eq!(outcomes, vec![Ok(11)]);
        let nh = dram.header(0).unwrap();
        assert_eq!((nh.num_of_lv, nh.o_ratevolt), (11, h.o_ratevolt));
        assert_eq!(dram.rate_volt(&nh, 0).unwrap(), (910_000, 875_000));
    }

    #[test]
    fn out_of_range_tables_leave_dram_untouched() {
        let mut f = fixture(CalConfig::default());
        let mut h = f.sram.header(0).unwrap();
        // Rows read for the nearest rates fit; the last row does not.
        h.o_tables = u16::try_from(FVMAP_SIZE - 31).unwrap();
        f.sram.set_header(0, &h).unwrap();
        let lut = f.vclk.lut.clone();
        let (dram, outcomes) = run(&mut f, 0);
        assert_eq!(outcomes, vec![Err(CalError::Format(EctError::BadOffset))]);
        assert_eq!(dram, f.sram);
        assert_eq!(f.vclk.lut, lut);
    }

    #[test]
    fn bad_block_index_is_not_fatal() {
        let mut f = fixture(CalConfig::default());
        let h = f.sram.header(0).unwrap();
        let word = f.sram.member(&h, 2).unwrap() | 3;
        f.sram.write_u16(usize::from(h.o_members) + 4, word).unwrap();
        let before = f.vclk.members.clone();
        let (_, outcomes) = run(&mut f, 0);
        assert_eq!(outcomes, vec![Ok(16)]);
        assert_eq!(f.vclk.members, before);
    }

    #[test]
    fn other_domains_keep_firmware_levels() {
        let mut f = fixture(CalConfig::default());
        f.vclk.kind = DomainKind::Other;
        let pll_params: Vec<u32> = f.vclk.lut.iter().map(|r| r.params[0]).collect();
        let (dram, outcomes) = run(&mut f, 0);
        assert_eq!(outcomes, vec![Ok(11)]);
        assert_eq!(dram.header(0).unwrap(), f.sram.header(0).unwrap());
        assert_eq!(dram.rate_asv_table(0).unwrap(), f.sram.rate_asv_table(0).unwrap());
        // PLL members keep their LUT value outside the GPU domain.
        let after: Vec<u32> = f.vclk.lut.iter().map(|r| r.params[0]).collect();
        assert_eq!(after, pll_params);
        assert_eq!(f.vclk.lut[6].rate, 433_000);
        assert_eq!(f.vclk.lut[6].params[2], 0);
    }

    #[test]
    fn voltage_edits() {
        let mut f = fixture(CalConfig::default());
        f.sram.add_voltage(0, -1_000_000).unwrap();
        assert!(f.sram.voltage_table(0).unwrap().iter().all(|&v| v == 0));
        let (mut dram, _) = run(&mut f, 0);
        let base = dram.clone();
        dram.rescale_from(&base, 0, 25).unwrap();
        assert_eq!(dram.voltage_table(0).unwrap()[0], 1_093_750);
        dram.rescale_from(&base, 0, 0).unwrap();
        assert_eq!(dram, base);
    }
}

//! Register access.
//!
//! The transition engine never touches memory directly. It reads and
//! writes register fields through [`RegisterAccess`], which has three
//! implementations here: [`Mmio`] over a mapped register window,
//! [`RegisterFile`] for host-side simulation, and [`RecordingRegisters`],
//! which logs every write for ordering checks.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use exynos_core::sync::SpinLock;

/// A bit field inside a 32-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegField {
    /// Register address.
    pub addr: u32,
    /// Least significant bit of the field.
    pub shift: u8,
    /// Field width in bits.
    pub width: u8,
}

impl RegField {
    /// Creates a field descriptor.
    #[must_use]
    pub const fn new(addr: u32, shift: u8, width: u8) -> Self {
        Self { addr, shift, width }
    }

    /// Creates a single-bit field.
    #[must_use]
    pub const fn bit(addr: u32, shift: u8) -> Self {
        Self::new(addr, shift, 1)
    }
}

/// Returns the unshifted mask for a `width`-bit field.
#[must_use]
pub const fn width_mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Returns the in-place mask for a field at `shift` of `width` bits.
#[must_use]
pub const fn field_mask(shift: u8, width: u8) -> u32 {
    width_mask(width) << shift
}

/// Access to a 32-bit register space.
///
/// Implementors provide whole-register reads, writes and delays; field
/// accessors and polling are built on top.
pub trait RegisterAccess {
    /// Reads the register at `addr`.
    fn read(&self, addr: u32) -> u32;

    /// Writes `value` to the register at `addr`.
    fn write(&self, addr: u32, value: u32);

    /// Busy-waits for `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Reads a field.
    fn read_field(&self, addr: u32, shift: u8, width: u8) -> u32 {
        (self.read(addr) >> shift) & width_mask(width)
    }

    /// Read-modify-writes a field. Bits of `value` beyond `width` are dropped.
    fn write_field(&self, addr: u32, shift: u8, width: u8, value: u32) {
        let mask = field_mask(shift, width);
        let reg = self.read(addr) & !mask;
        self.write(addr, reg | ((value << shift) & mask));
    }

    /// Polls a field once per microsecond until it equals `target`.
    ///
    /// Returns `false` if `timeout_us` polls pass without a match.
    fn wait_field_equals(&self, addr: u32, shift: u8, width: u8, target: u32, timeout_us: u32) -> bool {
        for _ in 0..timeout_us.max(1) {
            if self.read_field(addr, shift, width) == target {
                return true;
            }
            self.delay_us(1);
        }
        false
    }
}

// ---------------------------------------------------------------------------
// MMIO
// ---------------------------------------------------------------------------

/// A mapped register window.
///
/// Register addresses are physical; the window translates them with
/// `addr - phys_base + virt_base`.
pub struct Mmio {
    virt_base: usize,
    phys_base: u32,
    len: usize,
    delay: fn(u32),
}

impl Mmio {
    /// Creates a window over `len` bytes of registers starting at `phys_base`.
    ///
    /// # Safety
    ///
    /// `virt_base` must be a valid, device-memory mapping of at least `len`
    /// bytes for the physical range starting at `phys_base`, and must stay
    /// mapped for the lifetime of the returned value.
    #[must_use]
    pub const unsafe fn new(virt_base: usize, phys_base: u32, len: usize, delay: fn(u32)) -> Self {
        Self {
            virt_base,
            phys_base,
            len,
            delay,
        }
    }

    fn ptr(&self, addr: u32) -> Option<*mut u32> {
        let off = addr.checked_sub(self.phys_base)? as usize;
        (off % 4 == 0 && off + 4 <= self.len).then_some((self.virt_base + off) as *mut u32)
    }
}

impl RegisterAccess for Mmio {
    fn read(&self, addr: u32) -> u32 {
        match self.ptr(addr) {
            // SAFETY: `ptr` only yields aligned addresses inside the window
            // the caller of `Mmio::new` guaranteed to be mapped.
            Some(p) => unsafe { core::ptr::read_volatile(p) },
            None => 0,
        }
    }

    fn write(&self, addr: u32, value: u32) {
        if let Some(p) = self.ptr(addr) {
            // SAFETY: As in `read`.
            unsafe { core::ptr::write_volatile(p, value) }
        }
    }

    fn delay_us(&self, us: u32) {
        (self.delay)(us);
    }
}

// ---------------------------------------------------------------------------
// In-memory register file
// ---------------------------------------------------------------------------

/// A sparse in-memory register space.
///
/// Unwritten registers read as zero. Pinned fields always read back their
/// pinned value, which stands in for hardware status bits (PLL stable,
/// mux busy) that would otherwise never change.
#[derive(Default)]
pub struct RegisterFile {
    regs: SpinLock<BTreeMap<u32, u32>>,
    pinned: SpinLock<Vec<(RegField, u32)>>,
    delayed_us: AtomicU64,
}

impl RegisterFile {
    /// Creates an empty register file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins `field` so that it always reads `value`.
    pub fn pin(&self, field: RegField, value: u32) {
        let mut pinned = self.pinned.lock();
        pinned.retain(|(f, _)| *f != field);
        pinned.push((field, value));
    }

    /// Sets a register without recording or side effects.
    pub fn poke(&self, addr: u32, value: u32) {
        self.regs.lock().insert(addr, value);
    }

    /// Returns the total time spent in [`RegisterAccess::delay_us`].
    #[must_use]
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of every written register.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(u32, u32)> {
        self.regs.lock().iter().map(|(&a, &v)| (a, v)).collect()
    }
}

impl RegisterAccess for RegisterFile {
    fn read(&self, addr: u32) -> u32 {
        let mut v = self.regs.lock().get(&addr).copied().unwrap_or(0);
        for (f, pv) in self.pinned.lock().iter().filter(|(f, _)| f.addr == addr) {
            let mask = field_mask(f.shift, f.width);
            v = (v & !mask) | ((pv << f.shift) & mask);
        }
        v
    }

    fn write(&self, addr: u32, value: u32) {
        self.regs.lock().insert(addr, value);
    }

    fn delay_us(&self, us: u32) {
        self.delayed_us.fetch_add(u64::from(us), Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Recording double
// ---------------------------------------------------------------------------

/// One recorded register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Register address.
    pub addr: u32,
    /// Register value before the write.
    pub old: u32,
    /// Value written.
    pub new: u32,
}

/// A [`RegisterFile`] that records every write in order.
#[derive(Default)]
pub struct RecordingRegisters {
    inner: RegisterFile,
    log: SpinLock<Vec<RecordedWrite>>,
}

impl RecordingRegisters {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying register file.
    #[must_use]
    pub fn file(&self) -> &RegisterFile {
        &self.inner
    }

    /// Returns the recorded writes.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.log.lock().clone()
    }

    /// Discards the recorded writes.
    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// Returns the position of the first write to `addr` after `from`.
    #[must_use]
    pub fn position(&self, addr: u32, from: usize) -> Option<usize> {
        self.log
            .lock()
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, w)| w.addr == addr)
            .map(|(i, _)| i)
    }
}

impl RegisterAccess for RecordingRegisters {
    fn read(&self, addr: u32) -> u32 {
        self.inner.read(addr)
    }

    fn write(&self, addr: u32, value: u32) {
        let old = self.inner.read(addr);
        self.log.lock().push(RecordedWrite { addr, old, new: value });
        self.inner.write(addr, value);
    }

    fn delay_us(&self, us: u32) {
        self.inner.delay_us(us);
    }
}

//! Clock tree description.
//!
//! A [`ClockTree`] is the static description of one SoC's clock
//! controller: every PLL, mux, divider and gate with the register fields
//! that control it. DVFS members from the ECT are resolved against it by
//! name or by register address.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use exynos_ect::{Ect, PllFrequency};

use crate::regs::RegField;

/// Clock node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClkType {
    /// Fixed-rate source.
    FixedRate = 1,
    /// Fixed divider.
    FixedFactor = 2,
    /// Phase-locked loop.
    Pll = 3,
    /// Mux.
    Mux = 4,
    /// Divider.
    Div = 5,
    /// Gate.
    Gate = 6,
}

impl ClkType {
    const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::FixedRate,
            2 => Self::FixedFactor,
            3 => Self::Pll,
            4 => Self::Mux,
            5 => Self::Div,
            6 => Self::Gate,
            _ => return None,
        })
    }
}

/// A clock identifier: node type in the top byte, per-type index below.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClkId(u32);

impl ClkId {
    /// Placeholder for a member that did not resolve.
    pub const INVALID: Self = Self(u32::MAX);

    const TYPE_SHIFT: u32 = 24;
    const INDEX_MASK: u32 = (1 << Self::TYPE_SHIFT) - 1;

    /// Builds an id from its type and index.
    #[must_use]
    pub const fn new(ty: ClkType, index: u32) -> Self {
        Self(((ty as u32) << Self::TYPE_SHIFT) | (index & Self::INDEX_MASK))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the node type, or `None` for [`ClkId::INVALID`].
    #[must_use]
    pub const fn ty(self) -> Option<ClkType> {
        if self.0 == Self::INVALID.0 {
            return None;
        }
        ClkType::from_raw(self.0 >> Self::TYPE_SHIFT)
    }

    /// Returns the per-type index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::INDEX_MASK
    }

    /// Returns `true` unless this is [`ClkId::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns `true` for PLL nodes.
    #[must_use]
    pub fn is_pll(self) -> bool {
        self.ty() == Some(ClkType::Pll)
    }
}

impl fmt::Debug for ClkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty() {
            Some(ty) => write!(f, "ClkId({ty:?}#{})", self.index()),
            None => f.write_str("ClkId(INVALID)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Bit positions of the divider fields in `PLL_CON0` / `PLL_CON1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PllLayout {
    /// P field `(shift, width)` in `PLL_CON0`.
    pub p: (u8, u8),
    /// M field in `PLL_CON0`.
    pub m: (u8, u8),
    /// S field in `PLL_CON0`.
    pub s: (u8, u8),
    /// K field in `PLL_CON1`, for fractional PLLs.
    pub k: Option<(u8, u8)>,
}

impl PllLayout {
    /// The common integer PLL layout: P\[13:8\], M\[25:16\], S\[2:0\].
    pub const INTEGER: Self = Self {
        p: (8, 6),
        m: (16, 10),
        s: (0, 3),
        k: None,
    };
}

/// A PLL node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PllClock {
    /// `PLL_CON0` address: enable, stable, mux select and P/M/S.
    pub con0: u32,
    /// `PLL_CON1` address, fractional PLLs only.
    pub con1: Option<u32>,
    /// `PLL_LOCK` address.
    pub lock: u32,
    /// Divider field layout.
    pub layout: PllLayout,
    /// Lock time per P step for integer mode.
    pub lock_time: u32,
    /// Lock time per P step when K is non-zero.
    pub flock_time: u32,
    /// User mux that selects this PLL downstream.
    pub umux: Option<ClkId>,
    /// Reference clock; `None` means the 26 MHz oscillator.
    pub parent: Option<ClkId>,
    /// Preferred dividers, searched before synthesis.
    pub rate_table: Vec<PllFrequency>,
}

/// Node-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockKind {
    /// A fixed-rate source.
    FixedRate {
        /// Rate in Hz.
        rate_hz: u32,
    },
    /// A fixed divider.
    FixedFactor {
        /// Parent clock.
        parent: ClkId,
        /// Division ratio.
        ratio: u32,
    },
    /// A PLL.
    Pll(PllClock),
    /// A mux.
    Mux {
        /// Select field.
        sel: RegField,
        /// Busy status bit, polled after a change.
        busy: Option<RegField>,
        /// Parents by select value.
        parents: Vec<ClkId>,
        /// `true` for user muxes that sit behind a PLL.
        user: bool,
    },
    /// A divider.
    Div {
        /// Ratio field; the division is `value + 1`.
        ratio: RegField,
        /// Busy status bit, polled after a change.
        busy: Option<RegField>,
        /// Parent clock.
        parent: ClkId,
    },
    /// A gate.
    Gate {
        /// Enable field.
        gate: RegField,
        /// Parent clock.
        parent: ClkId,
    },
}

impl ClockKind {
    const fn ty(&self) -> ClkType {
        match self {
            Self::FixedRate { .. } => ClkType::FixedRate,
            Self::FixedFactor { .. } => ClkType::FixedFactor,
            Self::Pll(_) => ClkType::Pll,
            Self::Mux { .. } => ClkType::Mux,
            Self::Div { .. } => ClkType::Div,
            Self::Gate { .. } => ClkType::Gate,
        }
    }

    /// Returns the primary register address, used for address lookups.
    #[must_use]
    pub const fn addr(&self) -> Option<u32> {
        match self {
            Self::FixedRate { .. } | Self::FixedFactor { .. } => None,
            Self::Pll(p) => Some(p.con0),
            Self::Mux { sel, .. } => Some(sel.addr),
            Self::Div { ratio, .. } => Some(ratio.addr),
            Self::Gate { gate, .. } => Some(gate.addr),
        }
    }
}

/// A named clock node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    /// Id assigned by the tree.
    pub id: ClkId,
    /// Node name.
    pub name: String,
    /// Node configuration.
    pub kind: ClockKind,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A clock controller description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClockTree {
    clocks: Vec<Clock>,
}

impl ClockTree {
    /// Creates an empty tree.
    #[must_use]
    pub const fn new() -> Self {
        Self { clocks: Vec::new() }
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, name: &str, kind: ClockKind) -> ClkId {
        let ty = kind.ty();
        let index = self.clocks.iter().filter(|c| c.kind.ty() == ty).count();
        let id = ClkId::new(ty, u32::try_from(index).unwrap_or(ClkId::INDEX_MASK));
        self.clocks.push(Clock {
            id,
            name: String::from(name),
            kind,
        });
        id
    }

    /// Returns the node with `id`.
    #[must_use]
    pub fn get(&self, id: ClkId) -> Option<&Clock> {
        if !id.is_valid() {
            return None;
        }
        self.clocks.iter().find(|c| c.id == id)
    }

    /// Returns the node with `id` for modification.
    pub fn get_mut(&mut self, id: ClkId) -> Option<&mut Clock> {
        if !id.is_valid() {
            return None;
        }
        self.clocks.iter_mut().find(|c| c.id == id)
    }

    /// Returns the PLL configuration of `id`.
    #[must_use]
    pub fn pll(&self, id: ClkId) -> Option<&PllClock> {
        match &self.get(id)?.kind {
            ClockKind::Pll(p) => Some(p),
            _ => None,
        }
    }

    /// Resolves a node by exact name.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ClkId> {
        self.clocks.iter().find(|c| c.name == name).map(|c| c.id)
    }

    /// Resolves a node by its primary register address.
    #[must_use]
    pub fn id_by_addr(&self, addr: u32) -> Option<ClkId> {
        self.clocks
            .iter()
            .find(|c| c.kind.addr() == Some(addr))
            .map(|c| c.id)
    }

    /// Copies each PLL's divider table from the ECT `PLL` block, matched by
    /// name. Returns the number of PLLs that received a table.
    pub fn load_pll_tables(&mut self, ect: &Ect) -> usize {
        if ect.pll().is_none() {
            return 0;
        }
        let mut loaded = 0;
        for c in &mut self.clocks {
            if let ClockKind::Pll(p) = &mut c.kind {
                if let Some(src) = ect.pll_entry(&c.name) {
                    p.rate_table.clone_from(&src.frequencies);
                    loaded += 1;
                }
            }
        }
        loaded
    }

    /// Returns the name of `id`, or `"?"`.
    #[must_use]
    pub fn name(&self, id: ClkId) -> &str {
        self.get(id).map_or("?", |c| c.name.as_str())
    }

    /// Iterates over every node.
    pub fn iter(&self) -> impl Iterator<Item = &Clock> {
        self.clocks.iter()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_encode_type_and_index() {
        let id = ClkId::new(ClkType::Div, 7);
        assert_eq!(id.ty(), Some(ClkType::Div));
        assert_eq!(id.index(), 7);
        assert!(!id.is_pll());
        assert_eq!(ClkId::INVALID.ty(), None);
        assert!(!ClkId::INVALID.is_valid());
    }

    #[test]
    fn lookup_by_name_and_addr() {
        let mut tree = ClockTree::new();
        let osc = tree.add("OSC", ClockKind::FixedRate { rate_hz: 26_000_000 });
        let d0 = tree.add(
            "DIV_A",
            ClockKind::Div {
                ratio: RegField::new(0x1800, 0, 4),
                busy: None,
                parent: osc,
            },
        );
        let d1 = tree.add(
            "DIV_B",
            ClockKind::Div {
                ratio: RegField::new(0x1804, 0, 4),
                busy: None,
                parent: d0,
            },
        );
        assert_eq!(d0.index(), 0);
        assert_eq!(d1.index(), 1);
        assert_eq!(tree.id_by_name("DIV_B"), Some(d1));
        assert_eq!(tree.id_by_addr(0x1800), Some(d0));
        assert_eq!(tree.id_by_addr(0x1808), None);
        assert_eq!(tree.name(d1), "DIV_B");
        assert_eq!(tree.name(ClkId::INVALID), "?");
        assert!(tree.pll(d0).is_none());
    }

    #[test]
    fn pll_tables_load_by_name() {
        let mut tree = crate::soc::g3d_clock_tree();
        let ect = crate::testutil::g3d_ect();
        assert_eq!(tree.load_pll_tables(&ect), 1);
        let pll = tree.id_by_name("PLL_G3D").unwrap();
        assert_eq!(tree.pll(pll).unwrap().rate_table.len(), 11);
        assert_eq!(tree.load_pll_tables(&crate::testutil::empty_ect()), 0);
    }
}

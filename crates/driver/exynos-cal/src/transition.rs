//! Register-level clock transitions.
//!
//! A rate change walks the members of a vclk in a fixed order so that no
//! intermediate state overclocks the domain:
//!
//! 1. dividers that grow,
//! 2. PLLs that slow down,
//! 3. every mux,
//! 4. PLLs that speed up,
//! 5. dividers that shrink.
//!
//! Domains with an auxiliary PLL instead park on the switch source while
//! the main PLL relocks. Domains with a sequence table write members in
//! the table's order.

use alloc::vec::Vec;

use exynos_core::{kdebug, kerr, ktrace, kwarn};

use crate::clk::{ClkId, ClkType, ClockKind, ClockTree, PllClock};
use crate::config::{DIV_MUX_POLL_US, FIN_HZ, PLL_LOCK_POLL_US};
use crate::error::CalError;
use crate::pll;
use crate::regs::{RegField, RegisterAccess};
use crate::vclk::Vclk;

const LOG: &str = "ra";

const PLL_ENABLE: u8 = 31;
const PLL_STABLE: u8 = 29;
const PLL_MUX_BUSY: u8 = 26;
const PLL_MUX_SEL: u8 = 4;

bitflags::bitflags! {
    /// Directions a register pass may move a value in.
    ///
    /// An empty set is a no-op transition (`to == from`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransOpt: u32 {
        /// The value grows.
        const HIGH = 1 << 0;
        /// The value shrinks.
        const LOW = 1 << 1;
        /// Write regardless of direction.
        const FORCE = Self::HIGH.bits() | Self::LOW.bits();
    }
}

bitflags::bitflags! {
    /// Halves of a switch-PLL transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TransCmd: u32 {
        /// Park the domain on the switch source.
        const SWITCH = 1 << 0;
        /// Relock the main PLL and return to it.
        const RESTORE = 1 << 1;
        /// Both halves in one request.
        const ONESHOT = Self::SWITCH.bits() | Self::RESTORE.bits();
    }
}

/// Returns the direction from `from` to `to`.
#[must_use]
pub fn trans_opt(to: u32, from: u32) -> TransOpt {
    match to.cmp(&from) {
        core::cmp::Ordering::Equal => TransOpt::empty(),
        core::cmp::Ordering::Greater => TransOpt::HIGH,
        core::cmp::Ordering::Less => TransOpt::LOW,
    }
}

/// Steps of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    /// No transition in progress.
    Idle,
    /// Dividers that grow are written.
    RaiseDividers,
    /// PLLs and muxes move to the target source.
    SwitchSource,
    /// Dividers that shrink are written.
    LowerDividers,
    /// The domain is parked on the switch source.
    SwitchToAuxPll,
    /// The main PLL is reprogrammed while parked.
    ReconfigureMainPll,
    /// The domain returns to the main PLL.
    SwitchBack,
}

/// Hooks a SoC driver can attach to a vclk.
///
/// Every method has a no-op default. The `*_trans` hooks return `true`
/// when they performed the step themselves.
pub trait TransOps: Send + Sync {
    /// Runs before any register of a transition is written.
    fn trans_pre(&self, _from: u32, _to: u32) {}

    /// Runs after the last register of a transition is written.
    fn trans_post(&self, _from: u32, _to: u32) {}

    /// Runs before the domain parks on the switch source.
    fn switch_pre(&self, _from: u32, _to: u32) {}

    /// Runs after the domain parked on the switch source.
    fn switch_post(&self, _from: u32, _to: u32) {}

    /// Parks the domain on the switch source.
    fn switch_trans(&self, _from: u32, _to: u32) -> bool {
        false
    }

    /// Returns the domain to its main PLL.
    fn restore_trans(&self, _from: u32, _to: u32) -> bool {
        false
    }

    /// Returns the current rate of `pll` in kHz, if the driver tracks it.
    fn get_pll(&self, _pll: ClkId) -> Option<u32> {
        None
    }

    /// Programs `pll` to `rate_khz`.
    fn set_pll(&self, _pll: ClkId, _rate_khz: u32) -> bool {
        false
    }
}

/// One entry of a switch-source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchLut {
    /// Switch rate in kHz.
    pub rate: u32,
    /// Source mux select.
    pub mux_value: u32,
    /// Source divider value.
    pub div_value: u32,
}

/// Auxiliary clock path of a vclk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    /// Mux that moves the domain between the main and switch paths.
    pub switch_mux: ClkId,
    /// Source mux of the switch path.
    pub src_mux: Option<ClkId>,
    /// Source divider of the switch path.
    pub src_div: Option<ClkId>,
    /// Source gate of the switch path.
    pub src_gate: Option<ClkId>,
    /// User mux of the switch path.
    pub src_umux: Option<ClkId>,
    /// Switch rates, highest first.
    pub lut: Vec<SwitchLut>,
}

/// One step of a sequence table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqEntry {
    /// Member index.
    pub idx: usize,
    /// Directions in which this step writes.
    pub opt: TransOpt,
}

/// Outcome of one rate change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionReport {
    /// Rate before the change, in kHz.
    pub from: u32,
    /// Rate after the change, in kHz.
    pub to: u32,
    /// Phases entered, in order.
    pub phases: Vec<TransitionPhase>,
    /// Register waits that timed out.
    pub timeouts: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives the registers of one clock tree.
pub struct Transition<'a, R: RegisterAccess + ?Sized> {
    tree: &'a ClockTree,
    regs: &'a R,
    phases: Vec<TransitionPhase>,
    timeouts: usize,
}

impl<'a, R: RegisterAccess + ?Sized> Transition<'a, R> {
    /// Creates an engine over `tree` and `regs`.
    #[must_use]
    pub fn new(tree: &'a ClockTree, regs: &'a R) -> Self {
        Self {
            tree,
            regs,
            phases: Vec::new(),
            timeouts: 0,
        }
    }

    /// Returns the number of timed-out waits since creation.
    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.timeouts
    }

    fn enter(&mut self, phase: TransitionPhase) {
        ktrace!(target: LOG, "phase {:?}", phase);
        self.phases.push(phase);
    }

    fn read(&self, f: RegField) -> u32 {
        self.regs.read_field(f.addr, f.shift, f.width)
    }

    fn write(&self, f: RegField, value: u32) {
        self.regs.write_field(f.addr, f.shift, f.width, value);
    }

    fn wait(&mut self, f: RegField, target: u32, budget_us: u32) {
        if !self.regs.wait_field_equals(f.addr, f.shift, f.width, target, budget_us) {
            kerr!(
                target: LOG,
                "timeout at {:#010x}[{}]: expected {}, read {}",
                f.addr, f.shift, target, self.read(f)
            );
            self.timeouts += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Single clocks
    // -----------------------------------------------------------------------

    fn fin_hz(&self, pll: &PllClock) -> u32 {
        match pll.parent.and_then(|p| self.tree.get(p)).map(|c| &c.kind) {
            Some(ClockKind::FixedRate { rate_hz }) => *rate_hz,
            _ => FIN_HZ,
        }
    }

    fn pll_dividers(&self, pll: &PllClock) -> (u32, u32, u32, u32) {
        let l = pll.layout;
        let field = |(shift, width): (u8, u8)| self.regs.read_field(pll.con0, shift, width);
        let k = match (pll.con1, l.k) {
            (Some(con1), Some((shift, width))) => self.regs.read_field(con1, shift, width),
            _ => 0,
        };
        (field(l.p), field(l.m), field(l.s), k)
    }

    fn pll_enabled(&self, pll: &PllClock) -> bool {
        self.regs.read_field(pll.con0, PLL_ENABLE, 1) != 0
    }

    fn pll_rate_khz(&self, pll: &PllClock) -> u32 {
        if !self.pll_enabled(pll) {
            return 0;
        }
        let (p, m, s, k) = self.pll_dividers(pll);
        u32::try_from(pll::fout_hz(self.fin_hz(pll), p, m, s, k) / 1000).unwrap_or(u32::MAX)
    }

    /// Returns `true` if `id` already runs at `rate_khz`.
    fn pll_matches(&self, id: ClkId, rate_khz: u32) -> bool {
        let Some(p) = self.tree.pll(id) else {
            return false;
        };
        if rate_khz == 0 || !self.pll_enabled(p) {
            return rate_khz == 0 && !self.pll_enabled(p);
        }
        pll::resolve(&p.rate_table, self.fin_hz(p), rate_khz)
            .is_some_and(|f| self.pll_dividers(p) == (f.p, f.m, f.s, f.k))
    }

    /// Returns the live value of `id`: kHz for PLLs and fixed sources, the
    /// raw field otherwise.
    #[must_use]
    pub fn get_value(&self, id: ClkId) -> Option<u32> {
        Some(match &self.tree.get(id)?.kind {
            ClockKind::Pll(p) => self.pll_rate_khz(p),
            ClockKind::Mux { sel, .. } => self.read(*sel),
            ClockKind::Div { ratio, .. } => self.read(*ratio),
            ClockKind::Gate { gate, .. } => self.read(*gate),
            ClockKind::FixedRate { rate_hz } => rate_hz / 1000,
            ClockKind::FixedFactor { .. } => return None,
        })
    }

    /// Writes `value` to `id` and waits for it to settle.
    pub fn set_value(&mut self, id: ClkId, value: u32) {
        let tree = self.tree;
        let Some(clk) = tree.get(id) else {
            kwarn!(target: LOG, "write to unknown clock {:?}", id);
            return;
        };
        ktrace!(target: LOG, "{} <- {}", clk.name, value);
        match &clk.kind {
            ClockKind::Mux { sel, busy, .. } => {
                self.write(*sel, value);
                if let Some(b) = busy {
                    self.wait(*b, 0, DIV_MUX_POLL_US);
                }
            }
            ClockKind::Div { ratio, busy, .. } => {
                self.write(*ratio, value);
                if let Some(b) = busy {
                    self.wait(*b, 0, DIV_MUX_POLL_US);
                }
            }
            ClockKind::Gate { gate, .. } => self.write(*gate, value),
            ClockKind::Pll(_) => self.set_pll(id, value),
            ClockKind::FixedRate { .. } | ClockKind::FixedFactor { .. } => {
                kwarn!(target: LOG, "{}: not writable", clk.name);
            }
        }
    }

    fn enable_pll(&mut self, p: &PllClock, on: bool) {
        let mux_busy = RegField::bit(p.con0, PLL_MUX_BUSY);
        if on {
            self.regs.write_field(p.con0, PLL_ENABLE, 1, 1);
            self.wait(RegField::bit(p.con0, PLL_STABLE), 1, PLL_LOCK_POLL_US);
            self.regs.write_field(p.con0, PLL_MUX_SEL, 1, 1);
            self.wait(mux_busy, 0, DIV_MUX_POLL_US);
            if let Some(umux) = p.umux {
                self.set_value(umux, 1);
            }
        } else {
            self.regs.write_field(p.con0, PLL_MUX_SEL, 1, 0);
            self.wait(mux_busy, 0, DIV_MUX_POLL_US);
            self.regs.write_field(p.con0, PLL_ENABLE, 1, 0);
        }
    }

    /// Programs PLL `id` to `rate_khz`; zero turns it off.
    pub fn set_pll(&mut self, id: ClkId, rate_khz: u32) {
        let tree = self.tree;
        let Some(p) = tree.pll(id) else {
            kwarn!(target: LOG, "{:?} is not a PLL", id);
            return;
        };
        let name = tree.name(id);
        if rate_khz == 0 {
            kdebug!(target: LOG, "{}: off", name);
            self.enable_pll(p, false);
            return;
        }
        let Some(f) = pll::resolve(&p.rate_table, self.fin_hz(p), rate_khz) else {
            kerr!(target: LOG, "{}: no dividers for {} kHz", name, rate_khz);
            return;
        };

        self.enable_pll(p, false);
        let l = p.layout;
        self.regs.write_field(p.con0, l.p.0, l.p.1, f.p);
        self.regs.write_field(p.con0, l.m.0, l.m.1, f.m);
        self.regs.write_field(p.con0, l.s.0, l.s.1, f.s);
        if let (Some(con1), Some((shift, width))) = (p.con1, l.k) {
            self.regs.write_field(con1, shift, width, f.k);
        }
        let lock_time = if f.k == 0 { p.lock_time } else { p.flock_time };
        self.regs.write(p.lock, f.p.saturating_mul(lock_time));
        self.enable_pll(p, true);
        kdebug!(
            target: LOG,
            "{}: {} kHz (p {} m {} s {} k {})",
            name, rate_khz, f.p, f.m, f.s, f.k
        );
    }

    // -----------------------------------------------------------------------
    // Member passes
    // -----------------------------------------------------------------------

    /// Writes `to` over `from` if the move is in `opt`'s direction.
    ///
    /// [`TransOpt::FORCE`] writes even when the value is unchanged.
    fn set_filtered(&mut self, id: ClkId, to: u32, from: u32, opt: TransOpt) {
        if opt != TransOpt::FORCE {
            let dir = trans_opt(to, from);
            if dir.is_empty() || !opt.contains(dir) {
                return;
            }
        }
        self.set_value(id, to);
    }

    fn set_pll_ops(&mut self, id: ClkId, to: u32, opt: TransOpt, ops: Option<&dyn TransOps>) {
        let from = ops
            .and_then(|o| o.get_pll(id))
            .or_else(|| self.get_value(id))
            .unwrap_or(0);
        if to == from || self.pll_matches(id, to) {
            return;
        }
        let dir = trans_opt(to, from);
        if opt != TransOpt::FORCE && !opt.contains(dir) {
            return;
        }
        if ops.is_some_and(|o| o.set_pll(id, to)) {
            return;
        }
        self.set_pll(id, to);
    }

    /// Writes every member of type `ty` whose move matches `opt`.
    fn set_clk_by_type(
        &mut self,
        members: &[ClkId],
        params: &[u32],
        ty: ClkType,
        opt: TransOpt,
        ops: Option<&dyn TransOps>,
    ) {
        for (&id, &to) in members.iter().zip(params) {
            if id.ty() != Some(ty) {
                continue;
            }
            if ty == ClkType::Pll {
                self.set_pll_ops(id, to, opt, ops);
            } else if let Some(from) = self.get_value(id) {
                self.set_filtered(id, to, from, opt);
            }
        }
    }

    fn transition_direct(&mut self, members: &[ClkId], params: &[u32], ops: Option<&dyn TransOps>) {
        self.enter(TransitionPhase::RaiseDividers);
        self.set_clk_by_type(members, params, ClkType::Div, TransOpt::HIGH, ops);
        self.enter(TransitionPhase::SwitchSource);
        self.set_clk_by_type(members, params, ClkType::Pll, TransOpt::LOW, ops);
        self.set_clk_by_type(members, params, ClkType::Mux, TransOpt::FORCE, ops);
        self.set_clk_by_type(members, params, ClkType::Pll, TransOpt::HIGH, ops);
        self.enter(TransitionPhase::LowerDividers);
        self.set_clk_by_type(members, params, ClkType::Div, TransOpt::LOW, ops);
    }

    fn transition_seq(
        &mut self,
        seq: &[SeqEntry],
        members: &[ClkId],
        params: &[u32],
        ops: Option<&dyn TransOps>,
    ) {
        self.enter(TransitionPhase::SwitchSource);
        for e in seq {
            let (Some(&id), Some(&to)) = (members.get(e.idx), params.get(e.idx)) else {
                kwarn!(target: LOG, "sequence index {} out of range", e.idx);
                continue;
            };
            if id.is_pll() {
                self.set_pll_ops(id, to, e.opt, ops);
            } else if let Some(from) = self.get_value(id) {
                self.set_filtered(id, to, from, e.opt);
            }
        }
    }

    /// Programs the switch source for `rate` and returns the switch rate.
    ///
    /// The first entry at or below `rate` wins; the last entry is the
    /// fallback.
    pub fn set_rate_switch(&mut self, info: &SwitchInfo, rate: u32) -> Option<u32> {
        let entry = *info
            .lut
            .iter()
            .find(|e| rate >= e.rate)
            .or_else(|| info.lut.last())?;
        if let Some(div) = info.src_div {
            self.set_value(div, entry.div_value);
        }
        if let Some(mux) = info.src_mux {
            self.set_value(mux, entry.mux_value);
        }
        Some(entry.rate)
    }

    /// Routes the domain onto (`on`) or off the switch source.
    pub fn select_switch_pll(&mut self, info: &SwitchInfo, on: bool) {
        if on {
            if let Some(gate) = info.src_gate {
                self.set_value(gate, 1);
            }
            if let Some(umux) = info.src_umux {
                self.set_value(umux, 1);
            }
            self.set_value(info.switch_mux, 1);
        } else {
            self.set_value(info.switch_mux, 0);
            if let Some(umux) = info.src_umux {
                self.set_value(umux, 0);
            }
            if let Some(gate) = info.src_gate {
                self.set_value(gate, 0);
            }
        }
    }

    fn transition_switch(
        &mut self,
        info: &SwitchInfo,
        members: &[ClkId],
        params: &[u32],
        ops: Option<&dyn TransOps>,
        (from, to): (u32, u32),
    ) {
        self.enter(TransitionPhase::SwitchToAuxPll);
        if let Some(o) = ops {
            o.switch_pre(from, to);
        }
        if !ops.is_some_and(|o| o.switch_trans(from, to)) {
            if let Some(o) = ops {
                o.trans_pre(from, to);
            }
            self.set_clk_by_type(members, params, ClkType::Div, TransOpt::HIGH, ops);
            self.select_switch_pll(info, true);
            self.set_clk_by_type(members, params, ClkType::Mux, TransOpt::FORCE, ops);
            self.set_clk_by_type(members, params, ClkType::Div, TransOpt::LOW, ops);
        }
        if let Some(o) = ops {
            o.switch_post(from, to);
        }
    }

    fn transition_restore(
        &mut self,
        info: &SwitchInfo,
        members: &[ClkId],
        params: &[u32],
        ops: Option<&dyn TransOps>,
        (from, to): (u32, u32),
    ) {
        self.enter(TransitionPhase::ReconfigureMainPll);
        self.set_clk_by_type(members, params, ClkType::Pll, TransOpt::FORCE, ops);
        self.enter(TransitionPhase::SwitchBack);
        if !ops.is_some_and(|o| o.restore_trans(from, to)) {
            self.set_clk_by_type(members, params, ClkType::Div, TransOpt::HIGH, ops);
            self.select_switch_pll(info, false);
            self.set_clk_by_type(members, params, ClkType::Mux, TransOpt::FORCE, ops);
            self.set_clk_by_type(members, params, ClkType::Div, TransOpt::LOW, ops);
        }
        if let Some(o) = ops {
            o.trans_post(from, to);
        }
    }

    // -----------------------------------------------------------------------
    // Vclk operations
    // -----------------------------------------------------------------------

    /// Moves `vclk` to `rate` kHz and records it as the current rate.
    ///
    /// A non-empty `cmd` on a vclk with a switch path runs the requested
    /// halves of the switch transition; otherwise the sequence table or the
    /// direct order applies.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] if no LUT row covers `rate`. Register
    /// timeouts are counted in the report, not returned.
    pub fn set_rate(
        &mut self,
        vclk: &mut Vclk,
        rate: u32,
        cmd: TransCmd,
    ) -> Result<TransitionReport, CalError> {
        let Some(row) = vclk.get_lut(rate) else {
            kerr!(target: LOG, "{}: no LUT row for {} kHz", vclk.name, rate);
            return Err(CalError::InvalidArgument);
        };
        let params = row.params.clone();
        let ops = vclk.ops.clone();
        let ops = ops.as_deref();
        let from = vclk.vrate;
        self.phases.clear();
        let timeouts = self.timeouts;
        kdebug!(target: LOG, "{}: {} -> {} kHz ({:?})", vclk.name, from, rate, cmd);

        match &vclk.switch {
            Some(info) if !cmd.is_empty() => {
                if cmd.contains(TransCmd::SWITCH) {
                    let max_rate = if cmd == TransCmd::ONESHOT { from.max(rate) } else { rate };
                    let switch_rate = self.set_rate_switch(info, max_rate).unwrap_or(rate);
                    let switch_params = vclk
                        .get_lut(switch_rate)
                        .map_or_else(|| params.clone(), |r| r.params.clone());
                    self.transition_switch(info, &vclk.members, &switch_params, ops, (from, switch_rate));
                }
                if cmd.contains(TransCmd::RESTORE) {
                    self.transition_restore(info, &vclk.members, &params, ops, (from, rate));
                }
            }
            _ => {
                if let Some(o) = ops {
                    o.trans_pre(from, rate);
                }
                if vclk.seq.is_empty() {
                    self.transition_direct(&vclk.members, &params, ops);
                } else {
                    self.transition_seq(&vclk.seq, &vclk.members, &params, ops);
                }
                if let Some(o) = ops {
                    o.trans_post(from, rate);
                }
            }
        }
        self.enter(TransitionPhase::Idle);
        vclk.vrate = rate;
        Ok(TransitionReport {
            from,
            to: rate,
            phases: core::mem::take(&mut self.phases),
            timeouts: self.timeouts - timeouts,
        })
    }

    fn compare(&self, members: &[ClkId], params: &[u32]) -> bool {
        members
            .iter()
            .zip(params)
            .filter(|(id, _)| id.is_valid())
            .all(|(&id, &v)| match id.ty() {
                Some(ClkType::Pll) => self.pll_matches(id, v),
                Some(ClkType::Mux | ClkType::Div) => self.get_value(id) == Some(v),
                _ => true,
            })
    }

    /// Returns the rate of the first LUT row that matches the live
    /// registers, or zero.
    #[must_use]
    pub fn recalc_rate(&self, vclk: &Vclk) -> u32 {
        vclk.lut
            .iter()
            .find(|row| self.compare(&vclk.members, &row.params))
            .map_or(0, |row| row.rate)
    }

    fn set_gate(&mut self, id: ClkId, on: bool) {
        let tree = self.tree;
        match tree.get(id).map(|c| &c.kind) {
            Some(ClockKind::Pll(p)) => self.enable_pll(p, on),
            Some(ClockKind::Mux { user: true, .. } | ClockKind::Gate { .. }) => {
                self.set_value(id, u32::from(on));
            }
            _ => {}
        }
    }

    /// Turns on every clock of `list`, first to last.
    pub fn set_enable(&mut self, list: &[ClkId]) {
        for &id in list {
            self.set_gate(id, true);
        }
    }

    /// Turns off every clock of `list`, last to first.
    pub fn set_disable(&mut self, list: &[ClkId]) {
        for &id in list.iter().rev() {
            self.set_gate(id, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalConfig;
    use crate::override_engine;
    use crate::regs::{RecordingRegisters, RegisterFile};
    use crate::soc;
    use crate::testutil;
    use crate::vclk::VclkId;
    use alloc::sync::Arc;
    use alloc::vec;
    use core::sync::atomic::{AtomicU32, Ordering};

    fn setup(switch: bool) -> (ClockTree, Vclk) {
        let mut ect = testutil::g3d_ect();
        let cfg = CalConfig::default();
        override_engine::apply(&mut ect, &cfg);
        let mut tree = soc::g3d_clock_tree();
        let pll = tree.id_by_name("PLL_G3D").unwrap();
        if let Some(ClockKind::Pll(p)) = tree.get_mut(pll).map(|c| &mut c.kind) {
            p.rate_table = cfg.pll_table.clone();
        }
        let spec = soc::g3d_vclk_spec(&tree, switch);
        let v = Vclk::build(VclkId::new(0), &spec, &ect, &tree, 0, &cfg.extra_gpu_rates).unwrap();
        (tree, v)
    }

    fn recorder() -> RecordingRegisters {
        let r = RecordingRegisters::new();
        soc::pin_status(r.file());
        r
    }

    #[test]
    fn direction_of_a_move() {
        assert_eq!(trans_opt(5, 5), TransOpt::empty());
        assert_eq!(trans_opt(6, 5), TransOpt::HIGH);
        assert_eq!(trans_opt(4, 5), TransOpt::LOW);
        assert!(TransOpt::FORCE.contains(TransOpt::HIGH | TransOpt::LOW));
        assert_eq!(TransCmd::ONESHOT, TransCmd::SWITCH | TransCmd::RESTORE);
    }

    #[test]
    fn raise_divider_before_pll_going_up() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 200_000, TransCmd::empty()).unwrap();
        regs.clear();

        let report = t.set_rate(&mut v, 806_000, TransCmd::empty()).unwrap();
        assert_eq!(report.timeouts, 0);
        let div = regs.position(soc::DIV_G3D_BUS_CON, 0).unwrap();
        let pll = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        assert!(div < pll, "divider {div} pll {pll}");
        assert_eq!(v.vrate, 806_000);
        assert_eq!(t.get_value(tree.id_by_name("DIV_G3D_BUS").unwrap()), Some(1));
    }

    #[test]
    fn lower_divider_after_pll_going_down() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 806_000, TransCmd::empty()).unwrap();
        regs.clear();

        let report = t.set_rate(&mut v, 200_000, TransCmd::empty()).unwrap();
        let pll = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        let div = regs.position(soc::DIV_G3D_BUS_CON, 0).unwrap();
        assert!(pll < div, "pll {pll} divider {div}");
        assert_eq!(
            report.phases,
            vec![
                TransitionPhase::RaiseDividers,
                TransitionPhase::SwitchSource,
                TransitionPhase::LowerDividers,
                TransitionPhase::Idle,
            ]
        );
    }

    #[test]
    fn unchanged_members_are_skipped() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 650_000, TransCmd::empty()).unwrap();
        regs.clear();
        t.set_rate(&mut v, 650_000, TransCmd::empty()).unwrap();
        // Only the forced mux write remains.
        assert!(regs.writes().iter().all(|w| w.addr == soc::MUX_G3D_CON));
        assert_eq!(regs.position(soc::PLL_G3D_CON0, 0), None);
    }

    #[test]
    fn pll_programming() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 910_000, TransCmd::empty()).unwrap();
        let con0 = regs.read(soc::PLL_G3D_CON0);
        assert_eq!((con0 >> 8) & 0x3f, 4);
        assert_eq!((con0 >> 16) & 0x3ff, 140);
        assert_eq!(con0 & 0x7, 0);
        assert_ne!(con0 & (1 << 31), 0);
        assert_ne!(con0 & (1 << 4), 0);
        assert_eq!(regs.read(soc::PLL_G3D_LOCK), 4 * 200);
        let pll = tree.id_by_name("PLL_G3D").unwrap();
        assert_eq!(t.get_value(pll), Some(910_000));
    }

    #[test]
    fn pll_timeout_is_counted_not_fatal() {
        let (tree, mut v) = setup(false);
        let regs = RegisterFile::new();
        let mut t = Transition::new(&tree, &regs);
        let report = t.set_rate(&mut v, 650_000, TransCmd::empty()).unwrap();
        assert_eq!(report.timeouts, 1);
        assert_eq!(regs.delayed_us(), u64::from(PLL_LOCK_POLL_US));
        assert_eq!(v.vrate, 650_000);
    }

    #[test]
    fn rate_without_row_is_rejected() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        assert_eq!(
            t.set_rate(&mut v, 50_000, TransCmd::empty()),
            Err(CalError::InvalidArgument)
        );
        assert!(regs.writes().is_empty());
    }

    #[test]
    fn switch_path_parks_while_pll_relocks() {
        let (tree, mut v) = setup(true);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        let report = t.set_rate(&mut v, 702_000, TransCmd::ONESHOT).unwrap();
        assert_eq!(
            report.phases,
            vec![
                TransitionPhase::SwitchToAuxPll,
                TransitionPhase::ReconfigureMainPll,
                TransitionPhase::SwitchBack,
                TransitionPhase::Idle,
            ]
        );
        let park = regs.position(soc::MUX_G3D_BUSD_CON, 0).unwrap();
        let pll = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        let back = regs.position(soc::MUX_G3D_BUSD_CON, park + 1).unwrap();
        assert!(park < pll && pll < back);
        assert_eq!(regs.read_field(soc::MUX_G3D_BUSD_CON, 0, 1), 0);
        // max(0, 702000) picks the 666 MHz source: mux 1, divider 0.
        assert_eq!(regs.read_field(soc::MUX_TOP_G3D_SWITCH_CON, 0, 2), 1);
        // Gate, then user mux, then switch mux on the way in.
        let gate = regs.position(soc::GATE_TOP_G3D_SWITCH_CON, 0).unwrap();
        let umux = regs.position(soc::MUX_G3D_SWITCH_USER_CON, 0).unwrap();
        assert!(gate < umux && umux < park);
    }

    #[test]
    fn split_switch_and_restore() {
        let (tree, mut v) = setup(true);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        let r = t.set_rate(&mut v, 377_000, TransCmd::SWITCH).unwrap();
        assert_eq!(r.phases, vec![TransitionPhase::SwitchToAuxPll, TransitionPhase::Idle]);
        assert_eq!(regs.position(soc::PLL_G3D_CON0, 0), None);
        assert_eq!(regs.read_field(soc::MUX_G3D_BUSD_CON, 0, 1), 1);
        // 377000 picks the 200 MHz entry: divider 3.
        assert_eq!(regs.read_field(soc::DIV_TOP_G3D_SWITCH_CON, 0, 3), 3);

        let r = t.set_rate(&mut v, 377_000, TransCmd::RESTORE).unwrap();
        assert_eq!(
            r.phases,
            vec![
                TransitionPhase::ReconfigureMainPll,
                TransitionPhase::SwitchBack,
                TransitionPhase::Idle,
            ]
        );
        assert_eq!(regs.read_field(soc::MUX_G3D_BUSD_CON, 0, 1), 0);
        assert_eq!(t.recalc_rate(&v), 377_000);
    }

    #[test]
    fn sequence_table_order() {
        let (tree, mut v) = setup(false);
        // PLL in either direction first, then the divider, then the mux.
        v.seq = vec![
            SeqEntry { idx: 0, opt: TransOpt::FORCE },
            SeqEntry { idx: 2, opt: TransOpt::FORCE },
            SeqEntry { idx: 1, opt: TransOpt::HIGH },
        ];
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 806_000, TransCmd::empty()).unwrap();
        let pll = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        let div = regs.position(soc::DIV_G3D_BUS_CON, 0).unwrap();
        let mux = regs.position(soc::MUX_G3D_CON, 0).unwrap();
        assert!(pll < div && div < mux);
    }

    #[test]
    fn recalc_matches_live_registers() {
        let (tree, mut v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        assert_eq!(t.recalc_rate(&v), 0);
        t.set_rate(&mut v, 433_000, TransCmd::empty()).unwrap();
        assert_eq!(t.recalc_rate(&v), 433_000);
        t.set_rate(&mut v, 100_000, TransCmd::empty()).unwrap();
        assert_eq!(t.recalc_rate(&v), 100_000);
    }

    #[test]
    fn gate_lists_enable_forward_disable_backward() {
        let (tree, v) = setup(false);
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_enable(&v.gates);
        let en = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        let gate = regs.position(soc::GATE_G3D_CON, 0).unwrap();
        assert!(en < gate);
        assert_eq!(regs.read_field(soc::GATE_G3D_CON, 21, 1), 1);

        regs.clear();
        t.set_disable(&v.gates);
        let gate = regs.position(soc::GATE_G3D_CON, 0).unwrap();
        let mux = regs.position(soc::MUX_G3D_CON, 0).unwrap();
        let off = regs.position(soc::PLL_G3D_CON0, 0).unwrap();
        assert!(gate < mux && mux < off);
        assert_eq!(regs.read_field(soc::PLL_G3D_CON0, 31, 1), 0);
    }

    #[derive(Default)]
    struct CountingOps {
        pre: AtomicU32,
        post: AtomicU32,
        set_pll: AtomicU32,
    }

    impl TransOps for CountingOps {
        fn trans_pre(&self, _from: u32, _to: u32) {
            self.pre.fetch_add(1, Ordering::Relaxed);
        }

        fn trans_post(&self, _from: u32, _to: u32) {
            self.post.fetch_add(1, Ordering::Relaxed);
        }

        fn set_pll(&self, _pll: ClkId, rate_khz: u32) -> bool {
            self.set_pll.store(rate_khz, Ordering::Relaxed);
            true
        }
    }

    #[test]
    fn hooks_wrap_transition_and_may_own_pll() {
        let (tree, mut v) = setup(false);
        let ops = Arc::new(CountingOps::default());
        v.ops = Some(ops.clone());
        let regs = recorder();
        let mut t = Transition::new(&tree, &regs);
        t.set_rate(&mut v, 754_000, TransCmd::empty()).unwrap();
        assert_eq!(ops.pre.load(Ordering::Relaxed), 1);
        assert_eq!(ops.post.load(Ordering::Relaxed), 1);
        assert_eq!(ops.set_pll.load(Ordering::Relaxed), 754_000);
        assert_eq!(regs.position(soc::PLL_G3D_CON0, 0), None);
    }
}

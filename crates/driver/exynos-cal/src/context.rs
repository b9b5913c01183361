//! Calibration context: the owner of every stage's state.
//!
//! [`CalibrationContext::init`] runs the boot pipeline once: parse the ECT
//! blob, apply the overrides, load PLL tables into the clock tree, build one
//! vclk per domain and derive its limits from the ASV table. Once the
//! firmware SRAM FVMAP is available, [`CalibrationContext::init_fvmap`]
//! reconciles it into the DRAM copy. After that the context serves rate
//! changes and table queries for the lifetime of the driver.
//!
//! Each vclk sits in its own [`SpinLock`]; a rate change holds it for the
//! whole register sequence.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use exynos_core::sync::SpinLock;
use exynos_core::{kdebug, kerr, kinfo, kwarn};
use exynos_ect::Ect;

use crate::asv::{self, SsaInfo};
use crate::clk::ClockTree;
use crate::config::CalConfig;
use crate::error::CalError;
use crate::fvmap::{FvmapImage, Reconciler};
use crate::margin::{MarginCategory, MarginTunables};
use crate::override_engine::{self, OverrideReport};
use crate::regs::RegisterAccess;
use crate::transition::{TransCmd, TransOps, Transition, TransitionReport};
use crate::vclk::{Vclk, VclkId, VclkSpec};

const LOG: &str = "cal";

/// What the calibration needs from the SoC around it.
pub trait Platform {
    /// Returns the fused calibration id.
    fn calibration_id(&self) -> u32;

    /// Returns the ASV table version for this chip.
    ///
    /// The default takes the low byte of the calibration id.
    fn asv_table_version(&self) -> u32 {
        self.calibration_id() & 0xff
    }
}

struct FvmapState {
    sram: FvmapImage,
    dram: FvmapImage,
    /// DRAM image as reconciled, before any tunable was applied.
    base: FvmapImage,
}

/// Calibration state for one SoC.
pub struct CalibrationContext<R: RegisterAccess> {
    ect: Ect,
    tree: ClockTree,
    config: CalConfig,
    regs: R,
    vclks: Vec<SpinLock<Vclk>>,
    asv_version: AtomicU32,
    tunables: MarginTunables,
    fvmap: SpinLock<Option<FvmapState>>,
    report: OverrideReport,
}

impl<R: RegisterAccess> CalibrationContext<R> {
    /// Runs the boot pipeline over `blob`.
    ///
    /// Vclks whose domain cannot be built are logged and left out. The ASV
    /// table version comes from `config` if set, else from `platform`; a
    /// domain that falls back to another table version makes that version
    /// the global one.
    ///
    /// # Errors
    ///
    /// [`CalError::Format`] if the blob header does not parse; no vclk is
    /// configured in that case.
    pub fn init(
        blob: &[u8],
        platform: &dyn Platform,
        mut tree: ClockTree,
        specs: &[VclkSpec],
        config: CalConfig,
        regs: R,
    ) -> Result<Self, CalError> {
        let mut ect = Ect::parse(blob).inspect_err(|e| {
            kerr!(target: LOG, "ECT: {}", e);
        })?;
        let report = override_engine::apply(&mut ect, &config);
        let loaded = tree.load_pll_tables(&ect);
        kdebug!(target: LOG, "{} PLL tables loaded", loaded);

        let id = platform.calibration_id();
        let version = config
            .asv_table_version
            .unwrap_or_else(|| platform.asv_table_version());
        kinfo!(target: LOG, "calibration id {:#x}, ASV table version {}", id, version);
        let asv_version = AtomicU32::new(version);

        let mut vclks = Vec::new();
        vclks.try_reserve_exact(specs.len())?;
        for (domain, spec) in specs.iter().enumerate() {
            let vid = VclkId::new(u32::try_from(vclks.len()).map_err(|_| CalError::Range)?);
            let current = asv_version.load(Ordering::Relaxed);
            let mut vclk = match Vclk::build(vid, spec, &ect, &tree, current, &config.extra_gpu_rates) {
                Ok(v) => v,
                Err(e) => {
                    kerr!(target: LOG, "{}: not configured: {}", spec.name, e);
                    continue;
                }
            };
            vclk.fvmap_domain = domain;
            match vclk.apply_asv_info(&ect, current) {
                Ok(Some(fallback)) => {
                    kwarn!(target: LOG, "ASV table version {} adopted", fallback);
                    asv_version.store(fallback, Ordering::Relaxed);
                }
                Ok(None) => {}
                Err(e) => kwarn!(target: LOG, "{}: no ASV limits: {}", vclk.name, e),
            }
            kinfo!(
                target: LOG,
                "{} {}: {} levels, {}..{} kHz",
                vclk.id, vclk.name, vclk.lv_num(), vclk.min_freq, vclk.max_freq
            );
            vclks.push(SpinLock::named("vclk", vclk));
        }

        let tunables = MarginTunables::new();
        if let Err(e) = tunables.set_volt_offset_percent(config.volt_offset_percent) {
            kwarn!(target: LOG, "volt offset {}%: {}, ignored", config.volt_offset_percent, e);
        }

        Ok(Self {
            ect,
            tree,
            config,
            regs,
            vclks,
            asv_version,
            tunables,
            fvmap: SpinLock::named("fvmap", None),
            report,
        })
    }

    /// Reconciles the firmware FVMAP in `sram` into the DRAM copy.
    ///
    /// Returns the number of domains reconciled. Domains that fail keep
    /// their firmware tables.
    ///
    /// # Errors
    ///
    /// [`CalError::Format`] if `sram` is larger than an FVMAP image.
    pub fn init_fvmap(&self, sram: &[u8]) -> Result<usize, CalError> {
        let mut sram = FvmapImage::from_bytes(sram)?;
        let mut vclks: Vec<Vclk> = self.vclks.iter().map(|v| v.lock().clone()).collect();
        let reconciler = Reconciler {
            tree: &self.tree,
            config: &self.config,
            volt_offset_percent: self.tunables.volt_offset_percent(),
        };
        let (dram, outcomes) = reconciler.run(&mut sram, &mut vclks);
        for (slot, vclk) in self.vclks.iter().zip(vclks) {
            *slot.lock() = vclk;
        }
        let done = outcomes.iter().filter(|r| r.is_ok()).count();
        kinfo!(target: LOG, "FVMAP: {}/{} domains reconciled", done, outcomes.len());
        *self.fvmap.lock() = Some(FvmapState {
            sram,
            base: dram.clone(),
            dram,
        });
        Ok(done)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Returns the overridden ECT.
    #[must_use]
    pub fn ect(&self) -> &Ect {
        &self.ect
    }

    /// Returns the clock tree.
    #[must_use]
    pub fn tree(&self) -> &ClockTree {
        &self.tree
    }

    /// Returns the register collaborator.
    #[must_use]
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Returns what the override engine changed at init.
    #[must_use]
    pub fn override_report(&self) -> &OverrideReport {
        &self.report
    }

    /// Returns the ASV table version in use.
    #[must_use]
    pub fn asv_table_version(&self) -> u32 {
        self.asv_version.load(Ordering::Relaxed)
    }

    /// Returns the margin tunables.
    #[must_use]
    pub fn tunables(&self) -> &MarginTunables {
        &self.tunables
    }

    /// Returns the number of configured vclks.
    #[must_use]
    pub fn vclk_count(&self) -> usize {
        self.vclks.len()
    }

    /// Finds the vclk built for DVFS domain `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<VclkId> {
        self.vclks.iter().map(|v| v.lock()).find(|v| v.name == name).map(|v| v.id)
    }

    fn vclk(&self, id: VclkId) -> Result<&SpinLock<Vclk>, CalError> {
        self.vclks.get(id.index()).ok_or_else(|| {
            kerr!(target: LOG, "unknown vclk {}", id);
            CalError::InvalidArgument
        })
    }

    /// Runs `f` on a snapshot of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn with_vclk<T>(&self, id: VclkId, f: impl FnOnce(&Vclk) -> T) -> Result<T, CalError> {
        Ok(f(&self.vclk(id)?.lock()))
    }

    // -----------------------------------------------------------------------
    // Rate control
    // -----------------------------------------------------------------------

    fn run_transition(&self, id: VclkId, rate: u32, cmd: TransCmd) -> Result<TransitionReport, CalError> {
        let mut vclk = self.vclk(id)?.lock();
        let mut t = Transition::new(&self.tree, &self.regs);
        let report = t.set_rate(&mut vclk, rate, cmd)?;
        if report.timeouts != 0 {
            kwarn!(target: LOG, "{}: {} register timeouts", vclk.name, report.timeouts);
        }
        Ok(report)
    }

    /// Moves vclk `id` to `rate` kHz.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id or a rate below every
    /// LUT row.
    pub fn set_rate(&self, id: VclkId, rate: u32) -> Result<TransitionReport, CalError> {
        self.run_transition(id, rate, TransCmd::ONESHOT)
    }

    /// Runs only the switch half of a rate change.
    ///
    /// # Errors
    ///
    /// As [`CalibrationContext::set_rate`].
    pub fn set_rate_switch(&self, id: VclkId, rate: u32) -> Result<TransitionReport, CalError> {
        self.run_transition(id, rate, TransCmd::SWITCH)
    }

    /// Runs only the restore half of a rate change.
    ///
    /// # Errors
    ///
    /// As [`CalibrationContext::set_rate`].
    pub fn set_rate_restore(&self, id: VclkId, rate: u32) -> Result<TransitionReport, CalError> {
        self.run_transition(id, rate, TransCmd::RESTORE)
    }

    /// Returns the last rate set on vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn get_rate(&self, id: VclkId) -> Result<u32, CalError> {
        self.with_vclk(id, |v| v.vrate)
    }

    /// Reads the rate of vclk `id` back from the registers; zero if no row
    /// matches.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn recalc_rate(&self, id: VclkId) -> Result<u32, CalError> {
        let vclk = self.vclk(id)?.lock();
        Ok(Transition::new(&self.tree, &self.regs).recalc_rate(&vclk))
    }

    /// Installs transition hooks on vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn register_ops(&self, id: VclkId, ops: Arc<dyn TransOps>) -> Result<(), CalError> {
        self.vclk(id)?.lock().ops = Some(ops);
        Ok(())
    }

    /// Turns on the gate list of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn set_enable(&self, id: VclkId) -> Result<(), CalError> {
        let vclk = self.vclk(id)?.lock();
        Transition::new(&self.tree, &self.regs).set_enable(&vclk.gates);
        Ok(())
    }

    /// Turns off the gate list of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn set_disable(&self, id: VclkId) -> Result<(), CalError> {
        let vclk = self.vclk(id)?.lock();
        Transition::new(&self.tree, &self.regs).set_disable(&vclk.gates);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Limits
    // -----------------------------------------------------------------------

    /// Returns the boot rate, or the live rate when none was derived.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn boot_freq(&self, id: VclkId) -> Result<u32, CalError> {
        match self.with_vclk(id, |v| v.boot_freq)? {
            0 => self.recalc_rate(id),
            f => Ok(f),
        }
    }

    /// Returns the resume rate, or the live rate when none was derived.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn resume_freq(&self, id: VclkId) -> Result<u32, CalError> {
        match self.with_vclk(id, |v| v.resume_freq)? {
            0 => self.recalc_rate(id),
            f => Ok(f),
        }
    }

    /// Returns the highest enabled rate.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn max_freq(&self, id: VclkId) -> Result<u32, CalError> {
        self.with_vclk(id, |v| v.max_freq)
    }

    /// Returns the lowest enabled rate.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn min_freq(&self, id: VclkId) -> Result<u32, CalError> {
        self.with_vclk(id, |v| v.min_freq)
    }

    /// Returns the LUT rates of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn rate_table(&self, id: VclkId) -> Result<Vec<u32>, CalError> {
        self.with_vclk(id, Vclk::rate_table)
    }

    /// Returns the LUT row count of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id.
    pub fn lv_num(&self, id: VclkId) -> Result<usize, CalError> {
        self.with_vclk(id, Vclk::lv_num)
    }

    // -----------------------------------------------------------------------
    // Voltage tables
    // -----------------------------------------------------------------------

    fn with_fvmap<T>(&self, f: impl FnOnce(&mut FvmapState) -> Result<T, CalError>) -> Result<T, CalError> {
        let mut guard = self.fvmap.lock();
        let state = guard.as_mut().ok_or_else(|| {
            kerr!(target: LOG, "FVMAP not initialized");
            CalError::NotFound
        })?;
        f(state)
    }

    /// Returns the DRAM voltages of vclk `id`.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id, [`CalError::NotFound`]
    /// before [`CalibrationContext::init_fvmap`].
    pub fn voltage_table(&self, id: VclkId) -> Result<Vec<u32>, CalError> {
        let domain = self.with_vclk(id, |v| v.fvmap_domain)?;
        self.with_fvmap(|s| s.dram.voltage_table(domain))
    }

    /// Returns the DRAM `(kHz, uV)` pairs of vclk `id`.
    ///
    /// # Errors
    ///
    /// As [`CalibrationContext::voltage_table`].
    pub fn rate_asv_table(&self, id: VclkId) -> Result<Vec<(u32, u32)>, CalError> {
        let domain = self.with_vclk(id, |v| v.fvmap_domain)?;
        self.with_fvmap(|s| s.dram.rate_asv_table(domain))
    }

    /// Adds `delta_uv` to the firmware SRAM voltages of vclk `id`.
    ///
    /// # Errors
    ///
    /// As [`CalibrationContext::voltage_table`].
    pub fn set_raw_voltage_table(&self, id: VclkId, delta_uv: i32) -> Result<(), CalError> {
        let domain = self.with_vclk(id, |v| v.fvmap_domain)?;
        self.with_fvmap(|s| s.sram.add_voltage(domain, i64::from(delta_uv)))
    }

    /// Returns the firmware SRAM image as it stands.
    ///
    /// # Errors
    ///
    /// [`CalError::NotFound`] before [`CalibrationContext::init_fvmap`].
    pub fn sram_image(&self) -> Result<FvmapImage, CalError> {
        self.with_fvmap(|s| Ok(s.sram.clone()))
    }

    /// Returns the DRAM image as it stands.
    ///
    /// # Errors
    ///
    /// [`CalError::NotFound`] before [`CalibrationContext::init_fvmap`].
    pub fn dram_image(&self) -> Result<FvmapImage, CalError> {
        self.with_fvmap(|s| Ok(s.dram.clone()))
    }

    /// Sets the margin percentage of `category` and reapplies it to the
    /// DRAM voltages of every vclk in that category.
    ///
    /// # Errors
    ///
    /// [`CalError::Range`] outside `-100..=100`, with nothing changed.
    pub fn set_percent(&self, category: MarginCategory, percent: i32) -> Result<(), CalError> {
        self.tunables.set_percent(category, percent)?;
        let targets: Vec<usize> = self
            .vclks
            .iter()
            .map(|v| v.lock())
            .filter(|v| v.margin == Some(category))
            .map(|v| v.fvmap_domain)
            .collect();
        let mut guard = self.fvmap.lock();
        let Some(state) = guard.as_mut() else {
            kdebug!(target: LOG, "{}: {}% stored, FVMAP not yet initialized", category, percent);
            return Ok(());
        };
        for idx in targets {
            if let Err(e) = state.dram.rescale_from(&state.base, idx, percent) {
                kerr!(target: LOG, "{}: domain {}: {}", category, idx, e);
            }
        }
        kinfo!(target: LOG, "{} margin {}%", category, percent);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // ASV
    // -----------------------------------------------------------------------

    /// Returns group `group` of the ASV voltages of vclk `id` for the
    /// current table version.
    ///
    /// # Errors
    ///
    /// [`CalError::InvalidArgument`] for an unknown id, [`CalError::NotFound`]
    /// without an ASV table.
    pub fn asv_table(&self, id: VclkId, group: usize) -> Result<Vec<u32>, CalError> {
        let name = self.with_vclk(id, |v| v.name.clone())?;
        asv::asv_table(&self.ect, &name, self.asv_table_version(), group)
    }

    /// Returns the SSA parameters of vclk `id`.
    ///
    /// # Errors
    ///
    /// As [`CalibrationContext::asv_table`].
    pub fn ssa_info(&self, id: VclkId) -> Result<SsaInfo, CalError> {
        let name = self.with_vclk(id, |v| v.name.clone())?;
        asv::ssa_info(&self.ect, &name, self.asv_table_version())
    }

    /// Returns the big-cluster turbo row for the current table version.
    #[must_use]
    pub fn bigturbo_table(&self) -> Option<Vec<u32>> {
        asv::bigturbo_table(&self.ect, self.asv_table_version()).map(<[u32]>::to_vec)
    }
}

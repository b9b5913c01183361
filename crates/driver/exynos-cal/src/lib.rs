//! DVFS calibration pipeline for Exynos SoCs.
//!
//! Takes a parsed ECT (see `exynos-ect`) from boot to runtime:
//!
//! 1. [`override_engine`] patches the GPU tables to the curated operating
//!    points;
//! 2. [`vclk`] builds one lookup table per DVFS domain, resolved against the
//!    [`clk`] tree;
//! 3. [`fvmap`] reconciles the firmware's SRAM frequency/voltage map into the
//!    kernel's DRAM copy and back into the lookup tables;
//! 4. [`transition`] moves a domain between levels with the register writes
//!    in a glitch-free order.
//!
//! [`CalibrationContext`] owns the state of all four stages. Register access
//! goes through [`RegisterAccess`], so the whole pipeline runs on the host
//! against [`regs::RegisterFile`].
//!
//! # Usage
//!
//! ```ignore
//! let tree = soc::g3d_clock_tree();
//! let specs = [soc::g3d_vclk_spec(&tree, true)];
//! let ctx = CalibrationContext::init(blob, &platform, tree, &specs, CalConfig::default(), mmio)?;
//! ctx.init_fvmap(sram)?;
//! ctx.set_rate(VclkId::new(0), 806_000)?;
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod asv;
pub mod clk;
pub mod config;
pub mod context;
pub mod error;
pub mod fvmap;
pub mod margin;
pub mod override_engine;
pub mod pll;
pub mod regs;
pub mod soc;
pub mod transition;
pub mod vclk;

#[cfg(test)]
mod testutil;

pub use clk::{ClkId, ClkType, ClockTree};
pub use config::{CalConfig, OperatingPoint, OverrideValuePolicy};
pub use context::{CalibrationContext, Platform};
pub use error::CalError;
pub use fvmap::{FvmapHeader, FvmapImage, Reconciler};
pub use margin::{MarginCategory, MarginTunables};
pub use override_engine::OverrideReport;
pub use regs::{RegField, RegisterAccess};
pub use transition::{TransCmd, TransOps, TransOpt, Transition, TransitionReport};
pub use vclk::{LutRow, Vclk, VclkId, VclkSpec};

//! Host tool for ECT blobs.
//!
//! Dumps a blob as text or JSON, and dry-runs the calibration pipeline
//! against an in-memory register file: `lut` prints the GPU lookup table
//! after override and FVMAP reconciliation, `set-rate` prints the register
//! writes of one rate change.

mod cli;
mod config;
mod summary;

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use exynos_cal::regs::{RecordingRegisters, RegisterFile};
use exynos_cal::{CalibrationContext, FvmapImage, Platform, RegisterAccess, VclkId, soc};
use exynos_core::log::{self, LogLevel};
use exynos_ect::Ect;

fn stderr_log(level: LogLevel, target: &'static str, args: fmt::Arguments<'_>) {
    if target.is_empty() {
        eprintln!("[{}] {args}", level.name());
    } else {
        eprintln!("[{}] {target}: {args}", level.name());
    }
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    log::set_max_level(LogLevel::from_verbosity(cli.verbose));
    // SAFETY: `stderr_log` only formats to stderr and takes no locks of ours.
    unsafe { log::set_log_fn(stderr_log) };

    match cli.command {
        cli::Command::Dump(ref args) => cmd_dump(&args.blob),
        cli::Command::Json(ref args) => cmd_json(&args.blob),
        cli::Command::Lut(ref args) => cmd_lut(args),
        cli::Command::SetRate(ref args) => cmd_set_rate(args),
    }
}

// ===========================================================================
// Blob inspection
// ===========================================================================

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn parse_blob(path: &Path) -> Result<Ect> {
    let blob = read_blob(path)?;
    Ect::parse(&blob).with_context(|| format!("parsing {}", path.display()))
}

fn cmd_dump(path: &Path) -> Result<()> {
    let ect = parse_blob(path)?;
    let mut out = String::new();
    exynos_ect::dump::dump(&ect, &mut out).context("formatting dump")?;
    print!("{out}");
    Ok(())
}

fn cmd_json(path: &Path) -> Result<()> {
    let ect = parse_blob(path)?;
    let json = serde_json::to_string_pretty(&summary::EctSummary::new(&ect))?;
    println!("{json}");
    Ok(())
}

// ===========================================================================
// Pipeline dry runs
// ===========================================================================

struct Chip(u32);

impl Platform for Chip {
    fn calibration_id(&self) -> u32 {
        self.0
    }
}

const G3D: VclkId = VclkId::new(0);

/// Runs init and FVMAP reconciliation for the GPU domain.
fn boot<R: RegisterAccess>(args: &cli::PipelineArgs, regs: R) -> Result<CalibrationContext<R>> {
    let blob = read_blob(&args.blob)?;
    let config = config::load(args.config.as_deref())?;
    let tree = soc::g3d_clock_tree();
    let specs = [soc::g3d_vclk_spec(&tree, args.switch)];
    let ctx = CalibrationContext::init(&blob, &Chip(args.calibration_id), tree, &specs, config, regs)
        .with_context(|| format!("calibrating from {}", args.blob.display()))?;

    let sram = match &args.fvmap {
        Some(path) => FvmapImage::from_bytes(&read_blob(path)?)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let firmware = Ect::parse(&blob)?;
            soc::reference_fvmap(&firmware, ctx.asv_table_version())
                .context("building the firmware FVMAP from the blob")?
        }
    };
    let done = ctx.init_fvmap(sram.as_bytes())?;
    if done != ctx.vclk_count() {
        eprintln!("warning: {done} of {} domains reconciled", ctx.vclk_count());
    }
    Ok(ctx)
}

fn cmd_lut(args: &cli::PipelineArgs) -> Result<()> {
    let regs = RegisterFile::new();
    soc::pin_status(&regs);
    let ctx = boot(args, regs)?;

    let volts = ctx.voltage_table(G3D)?;
    let (names, rows) = ctx.with_vclk(G3D, |v| {
        let names: Vec<String> = v.members.iter().map(|&id| ctx.tree().name(id).to_owned()).collect();
        let rows: Vec<_> = v.lut.iter().map(|r| (r.rate, r.params.clone())).collect();
        (names, rows)
    })?;

    println!("ASV table version {}", ctx.asv_table_version());
    println!("{:>4} {:>8} {:>8}  {}", "lv", "kHz", "uV", names.join(" "));
    for (lv, (rate, params)) in rows.iter().enumerate() {
        let volt = volts.get(lv).map_or_else(|| "-".to_owned(), u32::to_string);
        let params: Vec<String> = params.iter().map(u32::to_string).collect();
        println!("{lv:>4} {rate:>8} {volt:>8}  {}", params.join(" "));
    }
    println!(
        "max {} kHz, min {} kHz, boot {} kHz",
        ctx.max_freq(G3D)?,
        ctx.min_freq(G3D)?,
        ctx.boot_freq(G3D)?
    );
    Ok(())
}

fn cmd_set_rate(args: &cli::SetRateArgs) -> Result<()> {
    let regs = RecordingRegisters::new();
    soc::pin_status(regs.file());
    let ctx = boot(&args.pipeline, regs)?;

    if let Some(from) = args.from {
        ctx.set_rate(G3D, from)
            .with_context(|| format!("setting the starting rate {from} kHz"))?;
    }
    ctx.regs().clear();
    let report = ctx
        .set_rate(G3D, args.rate)
        .with_context(|| format!("setting {} kHz", args.rate))?;

    for w in ctx.regs().writes() {
        println!("{:#010x}: {:#010x} -> {:#010x}", w.addr, w.old, w.new);
    }
    println!("{} -> {} kHz, phases {:?}", report.from, report.to, report.phases);
    if report.timeouts != 0 {
        println!("{} register timeouts", report.timeouts);
    }
    println!("read back {} kHz", ctx.recalc_rate(G3D)?);
    Ok(())
}

//! Command-line interface definitions for ectool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Exynos ECT inspector and calibration dry-run tool.
#[derive(Parser)]
#[command(name = "ectool", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log detail (-v info, -vv debug, -vvv register trace).
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Print every block of an ECT blob.
    Dump(BlobArgs),
    /// Print a JSON summary of an ECT blob.
    Json(BlobArgs),
    /// Run the boot pipeline and print the GPU lookup table.
    Lut(PipelineArgs),
    /// Run the boot pipeline, then a rate change, and print the register writes.
    SetRate(SetRateArgs),
}

/// A blob to read.
#[derive(Args)]
pub struct BlobArgs {
    /// Path to the ECT blob.
    pub blob: PathBuf,
}

/// Inputs of the boot pipeline.
#[derive(Args)]
pub struct PipelineArgs {
    /// Path to the ECT blob.
    pub blob: PathBuf,

    /// Calibration settings (TOML).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Firmware FVMAP image; built from the blob when omitted.
    #[arg(long)]
    pub fvmap: Option<PathBuf>,

    /// Calibration id reported by the chip.
    #[arg(long, default_value_t = 0, value_parser = parse_u32)]
    pub calibration_id: u32,

    /// Route GPU rate changes through the switch PLL.
    #[arg(long)]
    pub switch: bool,
}

/// Arguments for the `set-rate` subcommand.
#[derive(Args)]
pub struct SetRateArgs {
    /// Pipeline inputs.
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Target rate in kHz.
    pub rate: u32,

    /// Rate to start from, in kHz.
    #[arg(long)]
    pub from: Option<u32>,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    r.map_err(|e| e.to_string())
}

//! Core primitives for the Exynos calibration crates.
//!
//! This crate holds the pieces every other crate in the workspace leans on:
//! tagged leveled logging, a spin lock for per-domain state, and the kernel
//! errno values that calibration errors are reported as.
//!
//! Everything here is `no_std` and host-testable with `cargo test`.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod errno;
pub mod log;
pub mod sync;

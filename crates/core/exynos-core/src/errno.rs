//! Kernel errno values.
//!
//! Calibration errors surface to callers as negated errno codes, the same
//! way the rest of the clock framework reports failure.

/// `ENOENT`: no such file or directory.
pub const ENOENT: i32 = 2;
/// `ENOMEM`: out of memory.
pub const ENOMEM: i32 = 12;
/// `EINVAL`: invalid argument.
pub const EINVAL: i32 = 22;
/// `ERANGE`: result out of range.
pub const ERANGE: i32 = 34;
/// `ETIMEDOUT`: connection timed out.
pub const ETIMEDOUT: i32 = 110;

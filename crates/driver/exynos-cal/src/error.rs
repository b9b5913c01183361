//! Calibration pipeline errors.

use core::fmt;

use exynos_core::errno;
use exynos_ect::EctError;

/// Errors produced by the calibration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalError {
    /// The ECT blob or one of its blocks failed to decode.
    Format(EctError),
    /// A block, domain, table, or clock the operation needs is absent.
    NotFound,
    /// A table could not be grown.
    NoMemory,
    /// A register did not reach its expected value in time.
    Timeout,
    /// A value lies outside its accepted range.
    Range,
    /// Unknown vclk, empty domain, or a rate with no LUT row.
    InvalidArgument,
}

impl CalError {
    /// Returns the negated kernel errno for this error.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Format(e) => e.errno(),
            Self::NotFound => -errno::ENOENT,
            Self::NoMemory => -errno::ENOMEM,
            Self::Timeout => -errno::ETIMEDOUT,
            Self::Range => -errno::ERANGE,
            Self::InvalidArgument => -errno::EINVAL,
        }
    }
}

impl From<EctError> for CalError {
    fn from(e: EctError) -> Self {
        Self::Format(e)
    }
}

impl From<alloc::collections::TryReserveError> for CalError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::NoMemory
    }
}

impl fmt::Display for CalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "ECT format error: {e}"),
            Self::NotFound => write!(f, "not found"),
            Self::NoMemory => write!(f, "out of memory"),
            Self::Timeout => write!(f, "register wait timed out"),
            Self::Range => write!(f, "value out of range"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

impl core::error::Error for CalError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Format(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    #[test]
    fn display_all_variants() {
        assert_eq!(
            CalError::Format(EctError::Truncated).to_string(),
            "ECT format error: ECT data truncated"
        );
        assert_eq!(CalError::NotFound.to_string(), "not found");
        assert_eq!(CalError::NoMemory.to_string(), "out of memory");
        assert_eq!(CalError::Timeout.to_string(), "register wait timed out");
        assert_eq!(CalError::Range.to_string(), "value out of range");
        assert_eq!(CalError::InvalidArgument.to_string(), "invalid argument");
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(CalError::NotFound.errno(), -errno::ENOENT);
        assert_eq!(CalError::NoMemory.errno(), -errno::ENOMEM);
        assert_eq!(CalError::Timeout.errno(), -errno::ETIMEDOUT);
        assert_eq!(CalError::Range.errno(), -errno::ERANGE);
        assert_eq!(CalError::InvalidArgument.errno(), -errno::EINVAL);
        assert_eq!(CalError::from(EctError::BadSignature).errno(), -errno::EINVAL);
    }

    #[test]
    fn try_reserve_failure_is_no_memory() {
        let mut v: Vec<u64> = Vec::new();
        let err = v.try_reserve_exact(usize::MAX).unwrap_err();
        assert_eq!(CalError::from(err), CalError::NoMemory);
    }
}

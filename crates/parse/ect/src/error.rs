//! ECT parse errors.

use exynos_core::errno;

/// Errors that can occur while decoding an ECT blob or one of its sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EctError {
    /// The blob does not start with the `"PARA"` signature.
    BadSignature,
    /// A read ran past the end of the blob (or its declared total size).
    Truncated,
    /// An entry offset points before its section's name table or past the blob.
    BadOffset,
    /// A name string is not valid UTF-8.
    InvalidUtf8,
    /// A count field exceeds the parser's sanity limit.
    TooLarge,
}

impl EctError {
    /// Returns the negated kernel errno this error is reported as.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::TooLarge => -errno::ERANGE,
            Self::BadSignature | Self::Truncated | Self::BadOffset | Self::InvalidUtf8 => {
                -errno::EINVAL
            }
        }
    }
}

impl core::fmt::Display for EctError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadSignature => write!(f, "bad ECT signature"),
            Self::Truncated => write!(f, "ECT data truncated"),
            Self::BadOffset => write!(f, "ECT entry offset out of bounds"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in ECT name"),
            Self::TooLarge => write!(f, "ECT count field too large"),
        }
    }
}

impl core::error::Error for EctError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_variants() {
        assert_eq!(EctError::BadSignature.to_string(), "bad ECT signature");
        assert_eq!(EctError::Truncated.to_string(), "ECT data truncated");
        assert_eq!(EctError::BadOffset.to_string(), "ECT entry offset out of bounds");
        assert_eq!(EctError::InvalidUtf8.to_string(), "invalid UTF-8 in ECT name");
        assert_eq!(EctError::TooLarge.to_string(), "ECT count field too large");
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(EctError::Truncated.errno(), -22);
        assert_eq!(EctError::TooLarge.errno(), -34);
    }
}

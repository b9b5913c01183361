//! Group-major value arrays stored either raw or as compact step bytes.
//!
//! ASV voltages, RCC values and margin offsets all come in two encodings
//! depending on the section's parser version: full `i32` words, or one byte
//! per value that is multiplied by a fixed step.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use crate::error::EctError;
use crate::reader::Reader;

/// PMIC voltage step, in microvolts, for compact voltage encodings.
pub const PMIC_VOLTAGE_STEP: u32 = 6250;

/// A flat `[level * groups + group]` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupValues {
    /// One signed word per value.
    Raw(Vec<i32>),
    /// One byte per value, scaled by `step`.
    Compact {
        /// Unscaled step counts.
        steps: Vec<u8>,
        /// Multiplier applied to each step count.
        step: u32,
    },
}

impl GroupValues {
    pub(crate) fn read(
        r: &mut Reader<'_>,
        compact: bool,
        count: usize,
        step: u32,
    ) -> Result<Self, EctError> {
        if compact {
            Ok(Self::Compact {
                steps: r.read_u8_array(count)?,
                step,
            })
        } else {
            r.read_i32_array(count).map(Self::Raw)
        }
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(v) => v.len(),
            Self::Compact { steps, .. } => steps.len(),
        }
    }

    /// Returns `true` if no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for the compact step encoding.
    #[must_use]
    pub fn is_compact(&self) -> bool {
        matches!(self, Self::Compact { .. })
    }

    /// Returns the decoded value at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<i64> {
        match self {
            Self::Raw(v) => v.get(idx).map(|&x| i64::from(x)),
            Self::Compact { steps, step } => steps
                .get(idx)
                .map(|&s| i64::from(s) * i64::from(*step)),
        }
    }

    /// Returns the decoded value for `(level, group)` with `groups` values per level.
    #[must_use]
    pub fn at(&self, level: usize, group: usize, groups: usize) -> Option<i64> {
        if group >= groups {
            return None;
        }
        self.get(level.checked_mul(groups)?.checked_add(group)?)
    }

    /// Inserts `count` copies of the first `row_len` values at the front,
    /// keeping the encoding.
    ///
    /// # Errors
    ///
    /// Returns the allocation error if the buffer cannot grow; the values
    /// are left untouched in that case.
    pub fn try_prepend_first_row(
        &mut self,
        row_len: usize,
        count: usize,
    ) -> Result<(), TryReserveError> {
        match self {
            Self::Raw(v) => prepend_rows(v, row_len, count),
            Self::Compact { steps, .. } => prepend_rows(steps, row_len, count),
        }
    }
}

/// Rebuilds `v` as `count` copies of its first `row_len` items followed by
/// the original contents.
pub(crate) fn prepend_rows<T: Copy>(
    v: &mut Vec<T>,
    row_len: usize,
    count: usize,
) -> Result<(), TryReserveError> {
    let row_len = row_len.min(v.len());
    let mut out = Vec::new();
    out.try_reserve_exact(row_len * count + v.len())?;
    for _ in 0..count {
        out.extend_from_slice(&v[..row_len]);
    }
    out.extend_from_slice(v);
    *v = out;
    Ok(())
}

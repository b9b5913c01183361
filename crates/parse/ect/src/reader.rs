//! Bounds-checked little-endian cursor over the ECT blob.
//!
//! All positions are absolute offsets into the blob. The blob slice handed to
//! [`Reader`] is already clamped to the header's declared total size, so no
//! read can escape it.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::EctError;

/// ECT records are padded to this alignment.
pub const ALIGNMENT: usize = 4;

/// Maximum number of entries in any name table.
pub const MAX_ENTRIES: usize = 4096;

/// Rounds `len` up to the next multiple of [`ALIGNMENT`].
#[must_use]
pub const fn align4(len: usize) -> usize {
    (len + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// A forward-only cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a reader positioned at `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::BadOffset`] if `pos` is past the end of `data`.
    pub fn at(data: &'a [u8], pos: usize) -> Result<Self, EctError> {
        if pos > data.len() {
            return Err(EctError::BadOffset);
        }
        Ok(Self { data, pos })
    }

    /// Returns the current absolute position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Consumes `len` bytes and returns them.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], EctError> {
        let end = self.pos.checked_add(len).ok_or(EctError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(EctError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Reads a little-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] at end of data.
    pub fn read_u32(&mut self) -> Result<u32, EctError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] at end of data.
    pub fn read_i32(&mut self) -> Result<i32, EctError> {
        self.read_u32().map(|v| v as i32)
    }

    /// Reads a 64-bit value stored as two words, low word first.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] at end of data.
    pub fn read_u64(&mut self) -> Result<u64, EctError> {
        let low = self.read_u32()?;
        let high = self.read_u32()?;
        Ok((u64::from(high) << 32) | u64::from(low))
    }

    /// Reads a 4-byte version tag.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] at end of data.
    pub fn read_tag(&mut self) -> Result<[u8; 4], EctError> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Reads a count field and checks that `count * elem_size` bytes remain.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the implied array does not fit.
    pub fn read_count(&mut self, elem_size: usize) -> Result<usize, EctError> {
        let count = self.read_u32()? as usize;
        self.check_array(count, elem_size)?;
        Ok(count)
    }

    /// Reads a length-prefixed, NUL-terminated, 4-byte aligned string.
    ///
    /// The stored length excludes the terminator; the cursor advances past
    /// `length + 1` rounded up to [`ALIGNMENT`].
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the padded string does not fit, or
    /// [`EctError::InvalidUtf8`] if the name is not UTF-8.
    pub fn read_string_aligned(&mut self) -> Result<String, EctError> {
        let len = self.read_u32()? as usize;
        let padded = len
            .checked_add(1)
            .map(align4)
            .ok_or(EctError::Truncated)?;
        let bytes = self.read_bytes(padded)?;
        let name = core::str::from_utf8(&bytes[..len]).map_err(|_| EctError::InvalidUtf8)?;
        Ok(String::from(name))
    }

    /// Reads `count` little-endian `u32` values.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the array does not fit.
    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>, EctError> {
        let bytes = self.read_bytes(Self::array_len(count, 4)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Reads `count` little-endian `i32` values.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the array does not fit.
    pub fn read_i32_array(&mut self, count: usize) -> Result<Vec<i32>, EctError> {
        let bytes = self.read_bytes(Self::array_len(count, 4)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Reads `count` 64-bit values (low word first).
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the array does not fit.
    pub fn read_u64_array(&mut self, count: usize) -> Result<Vec<u64>, EctError> {
        self.check_array(count, 8)?;
        (0..count).map(|_| self.read_u64()).collect()
    }

    /// Reads `count` bytes into an owned vector.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::Truncated`] if the array does not fit.
    pub fn read_u8_array(&mut self, count: usize) -> Result<Vec<u8>, EctError> {
        self.read_bytes(count).map(<[u8]>::to_vec)
    }

    /// Reads a section's name table: a count followed by `(name, offset)`
    /// pairs, with offsets relative to `base`.
    ///
    /// Returns each name with its absolute body position. Every body must
    /// start at or after the end of the table and inside the blob.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::TooLarge`] if the count exceeds [`MAX_ENTRIES`],
    /// [`EctError::BadOffset`] for an out-of-range offset, or any read error.
    pub fn read_name_table(&mut self, base: usize) -> Result<Vec<(String, usize)>, EctError> {
        // Smallest possible entry: empty name (len + NUL padded) and an offset.
        let count = self.read_count(12)?;
        if count > MAX_ENTRIES {
            return Err(EctError::TooLarge);
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.read_string_aligned()?;
            let offset = self.read_u32()? as usize;
            let pos = base.checked_add(offset).ok_or(EctError::BadOffset)?;
            entries.push((name, pos));
        }

        self.check_bodies(entries.iter().map(|&(_, pos)| pos))?;
        Ok(entries)
    }

    /// Checks that every body position lies after the cursor (the end of the
    /// table just read) and inside the blob.
    ///
    /// # Errors
    ///
    /// Returns [`EctError::BadOffset`] on the first position out of range.
    pub fn check_bodies(&self, mut positions: impl Iterator<Item = usize>) -> Result<(), EctError> {
        if positions.any(|pos| pos < self.pos || pos >= self.data.len()) {
            return Err(EctError::BadOffset);
        }
        Ok(())
    }

    fn array_len(count: usize, elem_size: usize) -> Result<usize, EctError> {
        count.checked_mul(elem_size).ok_or(EctError::Truncated)
    }

    fn check_array(&self, count: usize, elem_size: usize) -> Result<(), EctError> {
        if Self::array_len(count, elem_size)? > self.remaining() {
            return Err(EctError::Truncated);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_scalars() {
        let data = [1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0, 1, 0, 0, 0];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_u32(), Ok(1));
        assert_eq!(r.read_i32(), Ok(-1));
        assert_eq!(r.read_u64(), Ok(0x1_0000_0002));
        assert_eq!(r.read_u32(), Err(EctError::Truncated));
    }

    #[test]
    fn string_alignment() {
        // len 4 -> 5 bytes with NUL -> padded to 8
        let mut data = Vec::new();
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(b"DVFS\0\0\0\0");
        data.extend_from_slice(&7u32.to_le_bytes());
        let mut r = Reader::new(&data);
        assert_eq!(r.read_string_aligned().as_deref(), Ok("DVFS"));
        assert_eq!(r.position(), 12);
        assert_eq!(r.read_u32(), Ok(7));
    }

    #[test]
    fn string_len_three_fills_one_word() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"ASV\0");
        let mut r = Reader::new(&data);
        assert_eq!(r.read_string_aligned().as_deref(), Ok("ASV"));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn string_invalid_utf8() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[0xc3, 0x28, 0, 0]);
        assert_eq!(
            Reader::new(&data).read_string_aligned(),
            Err(EctError::InvalidUtf8)
        );
    }

    #[test]
    fn huge_string_length_is_truncated() {
        let data = u32::MAX.to_le_bytes();
        assert_eq!(
            Reader::new(&data).read_string_aligned(),
            Err(EctError::Truncated)
        );
    }

    #[test]
    fn count_exceeding_blob() {
        let mut data = Vec::new();
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[0; 16]);
        assert_eq!(Reader::new(&data).read_count(4), Err(EctError::Truncated));
    }

    #[test]
    fn at_rejects_past_end() {
        let data = [0u8; 4];
        assert!(Reader::at(&data, 4).is_ok());
        assert_eq!(Reader::at(&data, 5).err(), Some(EctError::BadOffset));
    }

    #[test]
    fn name_table_rejects_offset_into_table() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(b"a\0\0\0");
        // Table ends at 16; offset 4 points back into it.
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        let mut r = Reader::new(&data);
        assert_eq!(r.read_name_table(0), Err(EctError::BadOffset));
    }

    #[test]
    fn name_table_accepts_body_after_table() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(b"a\0\0\0");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        let mut r = Reader::new(&data);
        let entries = r.read_name_table(0).unwrap();
        assert_eq!(entries, [(String::from("a"), 16)]);
    }
}

//! Entry - a stored key plus its occurrence count.

use crate::common::config::ENTRY_SIZE;
use crate::common::{Error, Result};

/// A key and the number of times it has been inserted.
///
/// Entries are what the tree stores: inserting a key that is already
/// present merges into the existing entry's count instead of storing a
/// duplicate. The key is immutable; the count only ever grows.
///
/// # Layout (12 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       8     key (i64, little-endian)
/// 8       4     count (i32, little-endian)
/// ```
///
/// A count is always at least 1, so an all-zero 12-byte block can never be
/// a real entry; it is reserved to mean "empty slot" in serialized nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    key: i64,
    count: i32,
}

impl Entry {
    /// Size of a serialized entry in bytes.
    pub const SIZE: usize = ENTRY_SIZE;

    /// Offset of each field within the block.
    pub const OFFSET_KEY: usize = 0;
    pub const OFFSET_COUNT: usize = 8;

    /// Create an entry for the first occurrence of a key (count 1).
    #[inline]
    pub fn new(key: i64) -> Self {
        Self { key, count: 1 }
    }

    /// Create an entry with an explicit occurrence count.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCount`] if `count < 1`.
    pub fn with_count(key: i64, count: i32) -> Result<Self> {
        if count < 1 {
            return Err(Error::InvalidCount(count));
        }
        Ok(Self { key, count })
    }

    /// The stored key.
    #[inline]
    pub fn key(&self) -> i64 {
        self.key
    }

    /// The occurrence count.
    #[inline]
    pub fn count(&self) -> i32 {
        self.count
    }

    /// Record one more occurrence.
    ///
    /// Saturates at `i32::MAX` rather than wrapping; the count stays >= 1.
    #[inline]
    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Fold another entry for the same key into this one.
    ///
    /// Saturates at `i32::MAX`, like [`Entry::increment`].
    #[inline]
    pub(crate) fn merge_from(&mut self, other: &Entry) {
        debug_assert_eq!(self.key, other.key);
        self.count = self.count.saturating_add(other.count);
    }

    /// Write this entry to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < Entry::SIZE`.
    pub(crate) fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for Entry");

        data[Self::OFFSET_KEY..Self::OFFSET_KEY + 8].copy_from_slice(&self.key.to_le_bytes());
        data[Self::OFFSET_COUNT..Self::OFFSET_COUNT + 4]
            .copy_from_slice(&self.count.to_le_bytes());
    }

    /// Read an entry from the beginning of a byte slice.
    ///
    /// Returns `Ok(None)` for an all-zero block (empty slot).
    ///
    /// # Errors
    /// Returns [`Error::InvalidCount`] if the block is occupied but its
    /// count is below 1 - a real entry can never serialize that way, so
    /// the caller should treat it as corruption.
    ///
    /// # Panics
    /// Panics if `data.len() < Entry::SIZE`.
    pub(crate) fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        assert!(data.len() >= Self::SIZE, "buffer too small for Entry");

        if data[..Self::SIZE].iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let key = i64::from_le_bytes([
            data[Self::OFFSET_KEY],
            data[Self::OFFSET_KEY + 1],
            data[Self::OFFSET_KEY + 2],
            data[Self::OFFSET_KEY + 3],
            data[Self::OFFSET_KEY + 4],
            data[Self::OFFSET_KEY + 5],
            data[Self::OFFSET_KEY + 6],
            data[Self::OFFSET_KEY + 7],
        ]);

        let count = i32::from_le_bytes([
            data[Self::OFFSET_COUNT],
            data[Self::OFFSET_COUNT + 1],
            data[Self::OFFSET_COUNT + 2],
            data[Self::OFFSET_COUNT + 3],
        ]);

        if count < 1 {
            return Err(Error::InvalidCount(count));
        }

        Ok(Some(Self { key, count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_new() {
        let entry = Entry::new(42);
        assert_eq!(entry.key(), 42);
        assert_eq!(entry.count(), 1);
    }

    #[test]
    fn test_entry_with_count() {
        let entry = Entry::with_count(7, 12).unwrap();
        assert_eq!(entry.key(), 7);
        assert_eq!(entry.count(), 12);
    }

    #[test]
    fn test_entry_rejects_count_below_one() {
        assert!(matches!(
            Entry::with_count(7, 0),
            Err(Error::InvalidCount(0))
        ));
        assert!(matches!(
            Entry::with_count(7, -3),
            Err(Error::InvalidCount(-3))
        ));
    }

    #[test]
    fn test_entry_increment() {
        let mut entry = Entry::new(5);
        entry.increment();
        entry.increment();
        assert_eq!(entry.count(), 3);
    }

    #[test]
    fn test_entry_increment_saturates() {
        let mut entry = Entry::with_count(5, i32::MAX).unwrap();
        entry.increment();
        assert_eq!(entry.count(), i32::MAX);
    }

    #[test]
    fn test_entry_merge_from() {
        let mut entry = Entry::with_count(5, 3).unwrap();
        entry.merge_from(&Entry::with_count(5, 4).unwrap());
        assert_eq!(entry.count(), 7);

        entry.merge_from(&Entry::with_count(5, i32::MAX).unwrap());
        assert_eq!(entry.count(), i32::MAX);
    }

    #[test]
    fn test_entry_roundtrip() {
        let original = Entry::with_count(-987_654_321, 1_234).unwrap();

        let mut buffer = [0u8; Entry::SIZE];
        original.write_to(&mut buffer);

        let recovered = Entry::from_bytes(&buffer).unwrap().unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_entry_byte_layout() {
        let entry = Entry::with_count(0x0807060504030201, 0x0D0C0B0A).unwrap();

        let mut buffer = [0u8; Entry::SIZE];
        entry.write_to(&mut buffer);

        assert_eq!(buffer[0], 0x01); // key byte 0 (LSB)
        assert_eq!(buffer[7], 0x08); // key byte 7 (MSB)
        assert_eq!(buffer[8], 0x0A); // count byte 0 (LSB)
        assert_eq!(buffer[11], 0x0D); // count byte 3 (MSB)
    }

    #[test]
    fn test_all_zero_block_is_absent() {
        let buffer = [0u8; Entry::SIZE];
        assert_eq!(Entry::from_bytes(&buffer).unwrap(), None);
    }

    #[test]
    fn test_zero_key_with_count_is_present() {
        // Key 0 is a legal key; only a fully zero block means "absent".
        let entry = Entry::new(0);
        let mut buffer = [0u8; Entry::SIZE];
        entry.write_to(&mut buffer);

        let recovered = Entry::from_bytes(&buffer).unwrap().unwrap();
        assert_eq!(recovered.key(), 0);
        assert_eq!(recovered.count(), 1);
    }

    #[test]
    fn test_occupied_block_with_bad_count_rejected() {
        let mut buffer = [0u8; Entry::SIZE];
        buffer[0] = 0x2A; // key 42, count 0
        assert!(matches!(
            Entry::from_bytes(&buffer),
            Err(Error::InvalidCount(0))
        ));
    }
}

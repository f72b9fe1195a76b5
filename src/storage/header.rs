//! Tree file header.
//!
//! The first [`HEADER_SIZE`] bytes of every tree file hold a [`TreeHeader`]:
//! the degree, the root node's address, the total key count and the height.
//!
//! The header is written at creation and at finalize, never in between;
//! until finalize runs, the on-disk header describes the tree as of the
//! last durable point, not the live in-memory state.

use crate::common::config::{node_disk_size, HEADER_SIZE};
use crate::common::{Error, NodeAddress, Result};

/// Metadata stored at the beginning of the tree file.
///
/// # Layout (20 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     degree (u32, little-endian)
/// 4       8     root address (u64, little-endian)
/// 12      4     key count (u32, little-endian)
/// 16      4     height (u32, little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    /// Minimum degree `t` of the tree.
    pub degree: u32,
    /// Address of the current root node.
    pub root: NodeAddress,
    /// Number of stored entries (distinct keys).
    pub key_count: u32,
    /// Height of the tree; a lone leaf root has height 1.
    pub height: u32,
}

impl TreeHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = HEADER_SIZE;

    /// Offset of each field within the header.
    pub const OFFSET_DEGREE: usize = 0;
    pub const OFFSET_ROOT: usize = 4;
    pub const OFFSET_KEY_COUNT: usize = 12;
    pub const OFFSET_HEIGHT: usize = 16;

    /// Create a header for a freshly created tree whose root is the given
    /// empty leaf.
    pub fn new(degree: u32, root: NodeAddress) -> Self {
        Self {
            degree,
            root,
            key_count: 0,
            height: 1,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Errors
    /// Returns [`Error::CorruptHeader`] if `data` is shorter than
    /// [`TreeHeader::SIZE`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::CorruptHeader(format!(
                "truncated: {} of {} bytes",
                data.len(),
                Self::SIZE
            )));
        }

        let degree = u32::from_le_bytes([
            data[Self::OFFSET_DEGREE],
            data[Self::OFFSET_DEGREE + 1],
            data[Self::OFFSET_DEGREE + 2],
            data[Self::OFFSET_DEGREE + 3],
        ]);

        let root = u64::from_le_bytes([
            data[Self::OFFSET_ROOT],
            data[Self::OFFSET_ROOT + 1],
            data[Self::OFFSET_ROOT + 2],
            data[Self::OFFSET_ROOT + 3],
            data[Self::OFFSET_ROOT + 4],
            data[Self::OFFSET_ROOT + 5],
            data[Self::OFFSET_ROOT + 6],
            data[Self::OFFSET_ROOT + 7],
        ]);

        let key_count = u32::from_le_bytes([
            data[Self::OFFSET_KEY_COUNT],
            data[Self::OFFSET_KEY_COUNT + 1],
            data[Self::OFFSET_KEY_COUNT + 2],
            data[Self::OFFSET_KEY_COUNT + 3],
        ]);

        let height = u32::from_le_bytes([
            data[Self::OFFSET_HEIGHT],
            data[Self::OFFSET_HEIGHT + 1],
            data[Self::OFFSET_HEIGHT + 2],
            data[Self::OFFSET_HEIGHT + 3],
        ]);

        Ok(Self {
            degree,
            root: NodeAddress::new(root),
            key_count,
            height,
        })
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < TreeHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for TreeHeader");

        data[Self::OFFSET_DEGREE..Self::OFFSET_DEGREE + 4]
            .copy_from_slice(&self.degree.to_le_bytes());
        data[Self::OFFSET_ROOT..Self::OFFSET_ROOT + 8]
            .copy_from_slice(&self.root.get().to_le_bytes());
        data[Self::OFFSET_KEY_COUNT..Self::OFFSET_KEY_COUNT + 4]
            .copy_from_slice(&self.key_count.to_le_bytes());
        data[Self::OFFSET_HEIGHT..Self::OFFSET_HEIGHT + 4]
            .copy_from_slice(&self.height.to_le_bytes());
    }

    /// Check this header against the file it was read from.
    ///
    /// # Errors
    /// Returns [`Error::CorruptHeader`] if the degree is below 2, the
    /// height is 0, the root address is misaligned or falls outside the
    /// node region, or the file length is not header + whole node blocks.
    pub fn validate(&self, file_len: u64) -> Result<()> {
        if self.degree < 2 {
            return Err(Error::CorruptHeader(format!(
                "degree {} out of range",
                self.degree
            )));
        }
        if self.height == 0 {
            return Err(Error::CorruptHeader("height 0".to_string()));
        }

        let node_size = node_disk_size(self.degree) as u64;
        let header = Self::SIZE as u64;
        let root = self.root.get();

        let root_in_range = root >= header
            && (root - header) % node_size == 0
            && root
                .checked_add(node_size)
                .is_some_and(|end| end <= file_len);
        if !root_in_range {
            return Err(Error::CorruptHeader(format!(
                "root address {} outside node region",
                self.root
            )));
        }
        if (file_len - header) % node_size != 0 {
            return Err(Error::CorruptHeader(format!(
                "file length {} is not header + whole node blocks",
                file_len
            )));
        }

        Ok(())
    }
}

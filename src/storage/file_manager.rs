//! File manager - low-level file I/O for tree nodes.
//!
//! The [`FileManager`] handles all direct file operations:
//! - Reading and writing the header
//! - Reading, writing and allocating fixed-size node regions
//! - Deriving the node count from the file size

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::trace;

use crate::common::config::node_disk_size;
use crate::common::{Error, NodeAddress, Result};
use crate::storage::header::TreeHeader;
use crate::tree::Node;

/// Manages disk I/O for a single tree file.
///
/// # File Layout
/// The tree is stored as a single file: a fixed header followed by
/// equally sized node regions laid out sequentially:
/// ```text
/// ┌────────┬──────────┬──────────┬──────────┬──────────┐
/// │ Header │  Node 0  │  Node 1  │   ...    │  Node N  │
/// │ (20B)  │          │          │          │          │
/// └────────┴──────────┴──────────┴──────────┴──────────┘
/// Offset:  0   20      20+S       ...        20+N×S      S = node_disk_size(t)
/// ```
///
/// Nodes are addressed by absolute byte offset. Allocation is append-only:
/// regions are never reclaimed or reused, so the node count is always
/// `(file_size - 20) / S`.
///
/// # Durability
/// Individual writes are not synced; persistence is deferred to the
/// engine's finalize step, which calls [`FileManager::sync`] once after
/// flushing everything. Until then the file may lag the in-memory tree.
pub struct FileManager {
    file: File,
    /// File offset one past the last allocated node region.
    end_offset: u64,
}

impl FileManager {
    /// Create a new tree file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            end_offset: TreeHeader::SIZE as u64,
        })
    }

    /// Open an existing tree file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or is
    /// shorter than the header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_len = file.metadata()?.len();
        if file_len < TreeHeader::SIZE as u64 {
            return Err(Error::CorruptHeader(format!(
                "file is {} bytes, shorter than the header",
                file_len
            )));
        }

        Ok(Self {
            file,
            end_offset: file_len,
        })
    }

    /// Read the header from the start of the file.
    pub fn read_header(&mut self) -> Result<TreeHeader> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; TreeHeader::SIZE];
        self.file.read_exact(&mut buf)?;
        TreeHeader::from_bytes(&buf)
    }

    /// Write the header to the start of the file.
    pub fn write_header(&mut self, header: &TreeHeader) -> Result<()> {
        let mut buf = [0u8; TreeHeader::SIZE];
        header.write_to(&mut buf);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Read a node from disk.
    ///
    /// # Errors
    /// Returns [`Error::AddressOutOfRange`] if the address falls inside the
    /// header region, is misaligned, or runs past the end of the file;
    /// [`Error::CorruptNode`] if the block decodes to an invalid node.
    pub fn read_node(&mut self, address: NodeAddress, degree: u32) -> Result<Node> {
        let size = node_disk_size(degree);
        self.check_node_range(address, size)?;

        self.file.seek(SeekFrom::Start(address.get()))?;
        let mut buf = vec![0u8; size];
        self.file.read_exact(&mut buf)?;

        trace!(%address, "node read");
        Node::from_bytes(&buf, degree, address)
    }

    /// Write a node to disk.
    ///
    /// The region must have been previously allocated with
    /// [`FileManager::allocate`].
    ///
    /// # Errors
    /// Returns [`Error::AddressOutOfRange`] if the address falls inside the
    /// header region, is misaligned, or names an unallocated region.
    pub fn write_node(&mut self, address: NodeAddress, node: &Node, degree: u32) -> Result<()> {
        let size = node_disk_size(degree);
        self.check_node_range(address, size)?;

        let mut buf = vec![0u8; size];
        node.write_to(&mut buf, degree);

        self.file.seek(SeekFrom::Start(address.get()))?;
        self.file.write_all(&buf)?;

        trace!(%address, keys = node.entry_count(), "node written");
        Ok(())
    }

    /// Allocate a new node region at the end of the file.
    ///
    /// Returns the address of the newly allocated region. The region is
    /// zero-filled, which decodes as an empty leaf.
    pub fn allocate(&mut self, degree: u32) -> Result<NodeAddress> {
        let size = node_disk_size(degree);
        let address = NodeAddress::new(self.end_offset);

        self.file.seek(SeekFrom::Start(self.end_offset))?;
        let zeros = vec![0u8; size];
        self.file.write_all(&zeros)?;

        self.end_offset += size as u64;
        trace!(%address, "node region allocated");
        Ok(address)
    }

    /// Number of node regions in the file.
    #[inline]
    pub fn node_count(&self, degree: u32) -> u64 {
        (self.end_offset - TreeHeader::SIZE as u64) / node_disk_size(degree) as u64
    }

    /// Total size of the tree file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.end_offset
    }

    /// Flush all buffered writes to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Reject node I/O aimed inside the header region, at a misaligned
    /// offset, or past the allocated end of the file.
    fn check_node_range(&self, address: NodeAddress, size: usize) -> Result<()> {
        let header = TreeHeader::SIZE as u64;
        let offset = address.get();

        let in_range = offset >= header
            && (offset - header) % size as u64 == 0
            && offset
                .checked_add(size as u64)
                .is_some_and(|end| end <= self.end_offset);
        if !in_range {
            return Err(Error::AddressOutOfRange(address));
        }
        Ok(())
    }
}

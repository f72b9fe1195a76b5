//! Configuration constants for tallytree.

use crate::common::error::{Error, Result};

/// Size of the file header in bytes.
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
///
/// Node regions start immediately after the header, so no valid node
/// address is ever smaller than this.
pub const HEADER_SIZE: usize = 20;

/// Size of a serialized [`Entry`](crate::tree::Entry) in bytes
/// (8-byte key + 4-byte count).
pub const ENTRY_SIZE: usize = 12;

/// Size of a serialized child address in bytes (u64 file offset).
pub const ADDRESS_SIZE: usize = 8;

/// Upper bound on the node block size used for automatic degree selection.
///
/// Chosen to match the OS page size on most systems (4096 bytes), so one
/// node fetch costs at most one disk block.
pub const MAX_NODE_SIZE: usize = 4096;

/// Degree value that requests automatic selection at tree creation.
pub const AUTO_DEGREE: u32 = 0;

/// Size in bytes of one node region for the given degree `t`.
///
/// A node stores `2t-1` fixed entry slots followed by `2t` fixed child
/// address slots:
/// ```text
/// +------------------------+------------------+
/// |      Entry slots       |  Child addresses |
/// |      12B x (2t-1)      |     8B x 2t      |
/// +------------------------+------------------+
/// ```
pub fn node_disk_size(degree: u32) -> usize {
    let t = degree as usize;
    (2 * t - 1) * ENTRY_SIZE + 2 * t * ADDRESS_SIZE
}

/// The largest degree whose node block still fits in [`MAX_NODE_SIZE`] bytes.
///
/// Solving `(2t-1)*ENTRY_SIZE + 2t*ADDRESS_SIZE <= MAX_NODE_SIZE` for `t`
/// gives the closed form below; it maximizes fan-out per disk block.
pub fn optimal_degree() -> u32 {
    ((MAX_NODE_SIZE + ENTRY_SIZE) / (2 * (ENTRY_SIZE + ADDRESS_SIZE))) as u32
}

/// Validate a caller-supplied degree, resolving [`AUTO_DEGREE`].
///
/// # Errors
/// Returns [`Error::InvalidDegree`] for degree 1; a B-tree of minimum
/// degree 1 cannot hold a key in a non-root node.
pub fn resolve_degree(degree: u32) -> Result<u32> {
    match degree {
        AUTO_DEGREE => Ok(optimal_degree()),
        1 => Err(Error::InvalidDegree(1)),
        t => Ok(t),
    }
}

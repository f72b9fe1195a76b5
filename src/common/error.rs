//! Error types for tallytree.

use crate::common::NodeAddress;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in tallytree.
///
/// A single error type keeps error handling consistent across the whole
/// crate: construction failures, corrupt on-disk data, invalid arguments
/// and underlying I/O all surface through this enum.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from disk operations.
    ///
    /// This wraps `std::io::Error` from file read/write/sync operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested degree cannot form a valid tree.
    ///
    /// Degree 0 requests automatic selection; degree 1 is rejected because
    /// a minimum degree of 1 leaves non-root nodes with zero keys.
    #[error("invalid degree {0}: must be 0 (automatic) or at least 2")]
    InvalidDegree(u32),

    /// The file header is unreadable or internally inconsistent.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A node block is undersized or ill-formed.
    #[error("corrupt node block at {address}: {reason}")]
    CorruptNode {
        address: NodeAddress,
        reason: String,
    },

    /// An occurrence count below 1 was supplied.
    ///
    /// A valid count is always at least 1; zero is reserved so an all-zero
    /// entry slot can mean "absent".
    #[error("invalid occurrence count {0}: must be at least 1")]
    InvalidCount(i32),

    /// Node I/O was aimed at the header region or past the end of the file.
    #[error("node address {0} is out of range")]
    AddressOutOfRange(NodeAddress),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidDegree(1);
        assert_eq!(
            format!("{}", err),
            "invalid degree 1: must be 0 (automatic) or at least 2"
        );

        let err = Error::InvalidCount(0);
        assert_eq!(
            format!("{}", err),
            "invalid occurrence count 0: must be at least 1"
        );

        let err = Error::AddressOutOfRange(NodeAddress::new(4));
        assert_eq!(format!("{}", err), "node address Addr(4) is out of range");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_io_error_source() {
        use std::error::Error as _;

        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: Error = io_err.into();
        assert!(err.source().is_some());
        assert!(Error::InvalidDegree(1).source().is_none());
    }

    #[test]
    fn test_result_type_alias() {
        // This function returns our Result type
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}

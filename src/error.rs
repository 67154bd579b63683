//! Error types for pivot-knn operations.
//!
//! Construction of an index, loading of matrices and configuration checks
//! report failures through [`PivotKnnError`]. The query path only fails on
//! a query whose length does not match the indexed dimension.

use std::io;
use thiserror::Error;

/// Result type alias using [`PivotKnnError`].
pub type Result<T> = std::result::Result<T, PivotKnnError>;

/// Errors that can occur during pivot-knn operations.
#[derive(Error, Debug)]
pub enum PivotKnnError {
    /// Vector or matrix dimensions do not match the expected dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        actual: usize,
    },

    /// The dataset has no rows or zero-width rows.
    #[error("empty dataset: index construction requires at least one row of non-zero width")]
    EmptyDataset,

    /// Invalid parameter value provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A matrix file is truncated or otherwise malformed.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// A buffer owned by the index could not be allocated.
    #[error("allocation failed: could not reserve {bytes} bytes for {what}")]
    AllocationFailed {
        /// Buffer being allocated.
        what: &'static str,
        /// Requested size in bytes (saturated on overflow).
        bytes: usize,
    },

    /// Error while serializing a report.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The requested sketch kernel is not available on this CPU.
    #[error("sketch kernel not supported on this CPU: {0}")]
    UnsupportedKernel(String),
}

impl PivotKnnError {
    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Creates a new `InvalidFormat` error.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Creates a new `AllocationFailed` error.
    pub fn allocation_failed(what: &'static str, bytes: usize) -> Self {
        Self::AllocationFailed { what, bytes }
    }
}

impl From<serde_json::Error> for PivotKnnError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Allocate a buffer of `len` default values, reporting failure instead of aborting.
pub(crate) fn try_zeroed<T: Copy + Default>(what: &'static str, len: usize) -> Result<Vec<T>> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| PivotKnnError::allocation_failed(what, bytes))?;
    buf.resize(len, T::default());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PivotKnnError::dimension_mismatch(128, 256);
        assert_eq!(err.to_string(), "dimension mismatch: expected 128, got 256");

        let err = PivotKnnError::invalid_parameter("h must be > 0");
        assert_eq!(err.to_string(), "invalid parameter: h must be > 0");

        let err = PivotKnnError::allocation_failed("distance table", 64);
        assert_eq!(
            err.to_string(),
            "allocation failed: could not reserve 64 bytes for distance table"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: PivotKnnError = io_err.into();
        assert!(matches!(err, PivotKnnError::Io(_)));
    }

    #[test]
    fn test_try_zeroed() {
        let buf: Vec<i32> = try_zeroed("test", 16).unwrap();
        assert_eq!(buf, vec![0; 16]);

        let err = try_zeroed::<u64>("huge", usize::MAX).unwrap_err();
        assert!(matches!(err, PivotKnnError::AllocationFailed { what: "huge", .. }));
    }
}

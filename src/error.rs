//! Error taxonomy for index operations.
//!
//! Every public operation fails with exactly one of these variants.
//! Synchronous operations surface the error directly; background
//! operations record it in the last-result slot, where
//! [`get_last_result`](crate::index::VectorIndex::get_last_result)
//! re-raises it.

use thiserror::Error;

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors surfaced by the index facade.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Input buffer is missing, empty, misaligned, or not a whole number
    /// of elements.
    #[error("buffer error: {0}")]
    Buffer(String),

    /// Vector element count does not match the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// Key is already present; use `update` to replace a live vector.
    #[error("key {0} already present")]
    Duplicate(i64),

    /// Key is not present in the index.
    #[error("key {0} not found")]
    KeyMissing(i64),

    /// Invalid construction argument.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A conflicting background operation is in progress.
    #[error("a background operation is already in progress")]
    Busy,

    /// The index has been deleted; no further operations are possible.
    #[error("index has been deleted")]
    DeletedState,

    /// Path was empty, contained a `..` segment, or was otherwise rejected.
    #[error("path rejected: {0}")]
    Path(String),

    /// On-disk magic, version, or size check failed.
    #[error("invalid on-disk format: {0}")]
    Format(String),

    /// A CRC32 check failed; the file is damaged.
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// Underlying file-system failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The host denied a memory request.
    #[error("allocation of {0} bytes failed")]
    Allocation(usize),

    /// Internal invariant violation. Treat as a defect: destroy and
    /// rebuild the index.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

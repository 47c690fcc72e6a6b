//! Error taxonomy.
//!
//! Every fallible operation returns [`Result`]. Fewer-than-`k` search results are
//! not an error; they are logged as a warning and returned as-is.

use thiserror::Error;

/// Errors reported by the index.
#[derive(Debug, Error)]
pub enum HnswError {
    /// The arena is full. Rebuild with a larger `max_elements` to recover.
    #[error("index capacity exceeded: all {capacity} slots are in use")]
    CapacityExceeded { capacity: usize },

    /// The label is already bound to a live point.
    #[error("label {0} is already present in the index")]
    DuplicateLabel(u64),

    /// The label is not bound to any point.
    #[error("label {0} not found")]
    LabelNotFound(u64),

    /// A snapshot failed validation while loading.
    #[error("corrupt snapshot: {0}")]
    CorruptFormat(String),

    /// A vector's length disagrees with the index dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// `init_new_index` was called on an index that already has a graph.
    #[error("the index is already initialized")]
    AlreadyInitialized,

    /// An item operation was called before `init_new_index` or `load`.
    #[error("the index is not initialized")]
    NotInitialized,

    /// Build parameters or dimension are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, HnswError>;

impl HnswError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        HnswError::CorruptFormat(msg.into())
    }
}

//! Error types for the machoscope crate.
//!
//! Structural parse problems are recorded as warnings on the parsed model;
//! the variants here are reserved for operations that cannot proceed.

use thiserror::Error;

/// Main error type for machoscope operations.
#[derive(Debug, Error)]
pub enum MachoError {
    /// Unrecognized magic, truncated fixed header, or unreadable fat table
    #[error("Malformed header at offset {offset:#x}: {message}")]
    MalformedHeader { offset: u64, message: String },

    /// CPU type that the requested operation cannot handle
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// Byte range that falls outside the container
    #[error("Offset {offset:#x} (+{len}) is outside the container of {size} bytes")]
    OutOfBoundsOffset { offset: u64, len: u64, size: u64 },

    /// New value width differs from the fixed field width
    #[error("Size mismatch: field is {expected} bytes, new value is {found} bytes")]
    SizeMismatch { expected: usize, found: usize },

    /// The edited binary no longer parsed; the edit was rolled back
    #[error("Edit {edit_id} failed verification and was rolled back: {reason}")]
    ValidationFailure { edit_id: u64, reason: String },

    /// A later applied edit overlaps the range being undone or redone
    #[error("Edit {edit_id} conflicts with later edit {conflicting_id}")]
    ConcurrentEditConflict { edit_id: u64, conflicting_id: u64 },

    /// Edit target does not resolve to an entity or field in the model
    #[error("Edit target not found: {0}")]
    TargetNotFound(String),

    /// Edit target lies inside a region the configuration protects
    #[error("Range {offset:#x}+{len} is protected")]
    ProtectedRegion { offset: u64, len: u64 },

    /// Unknown edit id
    #[error("Edit record {0} not found")]
    EditNotFound(u64),

    /// Undo/redo requested on a record in the wrong state
    #[error("Edit record {edit_id} is {status}, expected {expected}")]
    InvalidEditState {
        edit_id: u64,
        status: String,
        expected: String,
    },

    /// Writing the backup bytes back failed; the container may be corrupt
    #[error("Rollback of edit {edit_id} failed, container may be corrupt: {message}")]
    RollbackFailed { edit_id: u64, message: String },

    /// Input larger than the configured cap
    #[error("File size of {found} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { limit: u64, found: u64 },

    /// File I/O errors
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Long scan stopped by its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timeout at the caller boundary
    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Metadata store failures
    #[error("Store error: {0}")]
    Store(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MachoError {
    /// The edit was refused before any byte was written.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MachoError::SizeMismatch { .. }
                | MachoError::OutOfBoundsOffset { .. }
                | MachoError::TargetNotFound(_)
                | MachoError::ProtectedRegion { .. }
        )
    }

    /// The edit was written, failed verification, and the original bytes were restored.
    pub fn is_rollback(&self) -> bool {
        matches!(self, MachoError::ValidationFailure { .. })
    }

    pub(crate) fn malformed(offset: u64, message: impl Into<String>) -> Self {
        MachoError::MalformedHeader {
            offset,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MachoError {
    fn from(err: serde_json::Error) -> Self {
        MachoError::Serialization(err.to_string())
    }
}

/// Result type alias for machoscope operations
pub type Result<T> = std::result::Result<T, MachoError>;

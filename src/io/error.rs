//! Custom error types for the I/O module.

use thiserror::Error;

use crate::error::MachoError;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("File size of {found} bytes exceeds the maximum allowed size of {limit} bytes.")]
    FileTooLarge { limit: u64, found: u64 },

    #[error("Range {offset:#x}+{len} lies outside the {size}-byte source.")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("The byte source was opened read-only.")]
    ReadOnly,

    #[error("An underlying I/O error occurred: {0}")]
    StdIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IoError>;

impl From<IoError> for MachoError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::FileTooLarge { limit, found } => MachoError::FileTooLarge { limit, found },
            IoError::OutOfBounds { offset, len, size } => {
                MachoError::OutOfBoundsOffset { offset, len, size }
            }
            IoError::ReadOnly => MachoError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "byte source is read-only",
            )),
            IoError::StdIo(e) => MachoError::Io(e),
        }
    }
}

//! Bounds-checked access to a container's bytes.
//!
//! `ByteSource` is the foundation every parser reads through. It is either
//! an owned buffer or a memory-mapped file; the writable variants are what
//! the edit engine mutates in place.

pub mod error;

use crate::config::IoConfig;
use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::{Mmap, MmapMut};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// A half-open byte range `[offset, offset + len)` within a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Two ranges overlap when they share at least one byte.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.offset < other.end() && other.offset < self.end()
    }

    pub fn contains(&self, other: &ByteRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// True when the whole range fits in a buffer of `size` bytes.
    pub fn fits_within(&self, size: u64) -> bool {
        self.offset.checked_add(self.len).is_some_and(|end| end <= size)
    }
}

/// Resource limits for a byte source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum container size that can be opened.
    pub max_file_size: u64,
    /// The largest slice a single chunked read returns.
    pub max_chunk_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        IOLimits::from(&IoConfig::default())
    }
}

impl From<&IoConfig> for IOLimits {
    fn from(cfg: &IoConfig) -> Self {
        Self {
            max_file_size: cfg.max_file_size,
            max_chunk_size: cfg.max_chunk_size,
        }
    }
}

enum Storage {
    Owned(Vec<u8>),
    Mapped(Mmap),
    MappedMut(MmapMut),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mapped(m) => &m[..],
            Storage::MappedMut(m) => &m[..],
        }
    }
}

/// Bounds-checked view over a binary's bytes.
pub struct ByteSource {
    path: Option<PathBuf>,
    storage: Storage,
    limits: IOLimits,
    /// Number of upcoming flushes to fail, for exercising error paths
    #[cfg(test)]
    failing_flushes: std::sync::atomic::AtomicU32,
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("path", &self.path)
            .field("len", &self.len())
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl ByteSource {
    /// Wraps an in-memory buffer. The buffer is writable.
    pub fn from_vec(data: Vec<u8>, limits: IOLimits) -> Result<Self> {
        let size = data.len() as u64;
        if size > limits.max_file_size {
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: size,
            });
        }
        Ok(Self {
            path: None,
            storage: Storage::Owned(data),
            limits,
            #[cfg(test)]
            failing_flushes: Default::default(),
        })
    }

    /// Memory-maps a file read-only.
    pub fn open<P: AsRef<Path>>(path: P, limits: IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = Self::checked_size(path, &file, &limits)?;

        let storage = if file_size == 0 {
            // memmap cannot map empty files
            Storage::Owned(Vec::new())
        } else {
            // Safety: read-only map of a regular file; callers must not truncate it underneath us.
            Storage::Mapped(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            storage,
            limits,
            #[cfg(test)]
            failing_flushes: Default::default(),
        })
    }

    /// Memory-maps a file for in-place editing.
    pub fn open_rw<P: AsRef<Path>>(path: P, limits: IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_size = Self::checked_size(path, &file, &limits)?;

        let storage = if file_size == 0 {
            Storage::Owned(Vec::new())
        } else {
            // Safety: shared writable map; the edit engine is the single writer for this file.
            Storage::MappedMut(unsafe { MmapMut::map_mut(&file)? })
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            storage,
            limits,
            #[cfg(test)]
            failing_flushes: Default::default(),
        })
    }

    fn checked_size(path: &Path, file: &File, limits: &IOLimits) -> Result<u64> {
        let file_size = file.metadata()?.len();
        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening byte source"
        );
        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }
        Ok(file_size)
    }

    pub fn len(&self) -> u64 {
        self.storage.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn limits(&self) -> &IOLimits {
        &self.limits
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self.storage, Storage::Mapped(_))
    }

    /// The whole container.
    pub fn as_bytes(&self) -> &[u8] {
        self.storage.bytes()
    }

    /// Exact read; the full range must be in bounds.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let range = ByteRange::new(offset, len);
        let size = self.len();
        if !range.fits_within(size) {
            return Err(IoError::OutOfBounds { offset, len, size });
        }
        Ok(&self.as_bytes()[offset as usize..range.end() as usize])
    }

    /// Capped read for presentation: at most `max_chunk_size` bytes, clamped at EOF.
    ///
    /// Reads starting at or past EOF return an empty buffer.
    pub fn read_chunk(&self, offset: u64, len: u64) -> Bytes {
        let data = self.as_bytes();
        let size = data.len() as u64;
        if offset >= size {
            return Bytes::new();
        }
        let capped = len.min(self.limits.max_chunk_size);
        let end = offset.saturating_add(capped).min(size);
        trace!(offset, requested = len, returned = end - offset, "Chunk read");
        Bytes::copy_from_slice(&data[offset as usize..end as usize])
    }

    /// Overwrites `data.len()` bytes at `offset` in place.
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        let size = self.len();
        if !ByteRange::new(offset, len).fits_within(size) {
            return Err(IoError::OutOfBounds { offset, len, size });
        }
        let start = offset as usize;
        let end = start + data.len();
        match &mut self.storage {
            Storage::Owned(v) => v[start..end].copy_from_slice(data),
            Storage::MappedMut(m) => m[start..end].copy_from_slice(data),
            Storage::Mapped(_) => return Err(IoError::ReadOnly),
        }
        trace!(offset, len, "Wrote bytes");
        Ok(())
    }

    /// Flushes a writable mapping's range to disk. No-op for owned buffers.
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let pending = &self.failing_flushes;
            if pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IoError::StdIo(std::io::Error::other("flush failed")));
            }
        }
        if let Storage::MappedMut(m) = &self.storage {
            m.flush_range(offset as usize, len as usize)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_next_flushes(&self, count: u32) {
        self.failing_flushes
            .store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

//! Configuration for parsing and editing.
//!
//! A single `AnalyzerConfig` value is threaded through the parsers and the
//! edit engine; nothing reads ambient global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::io::ByteRange;

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Input size and read caps.
    pub io: IoConfig,
    /// Structural parser limits.
    pub parser: ParserConfig,
    /// Edit engine behaviour.
    pub edit: EditConfig,
}

impl AnalyzerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// I/O configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Maximum container size accepted (default: 52428800 = 50MB).
    pub max_file_size: u64,
    /// Maximum bytes returned by one hex-range read (default: 65536).
    pub max_chunk_size: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_chunk_size: 64 * 1024,
        }
    }
}

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Upper bound on load commands iterated per slice.
    pub max_load_commands: u32,
    /// Upper bound on section records read per segment.
    pub max_sections_per_segment: u32,
    /// Upper bound on symbol records read per slice.
    pub max_symbols: u32,
    /// Upper bound on fat arch descriptors.
    pub max_fat_arches: u32,
    /// Parse fat slices on the rayon pool.
    pub parallel: bool,
    /// Loop iterations between cancellation checks.
    pub scan_chunk: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_load_commands: 4096,
            max_sections_per_segment: 1024,
            max_symbols: 1_000_000,
            max_fat_arches: 64,
            parallel: true,
            scan_chunk: 4096,
        }
    }
}

/// Regions that edits may never touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectedRegionPolicy {
    #[default]
    None,
    /// The fat header and its arch descriptor table.
    FatHeader,
    /// Explicit container byte ranges.
    Custom(Vec<ByteRange>),
}

/// Edit engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// Re-parse the touched structure after writing and roll back on failure.
    pub verify_after_apply: bool,
    /// Copy file-backed containers aside before every write.
    pub file_backups: bool,
    /// Directory for backup copies; defaults to the container's directory.
    pub backup_dir: Option<PathBuf>,
    pub protected_regions: ProtectedRegionPolicy,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            verify_after_apply: true,
            file_backups: true,
            backup_dir: None,
            protected_regions: ProtectedRegionPolicy::None,
        }
    }
}

//! Fat (universal) container detection and arch table parsing

use crate::config::ParserConfig;
use crate::error::{MachoError, Result};
use crate::formats::macho::types::*;
use crate::formats::macho::utils::EndianRead;
use crate::io::ByteRange;
use tracing::{debug, warn};

/// Result of splitting a container into slices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatLayout {
    pub kind: ContainerKind,
    /// Descriptors exactly as read, including ones later rejected
    pub arches: Vec<FatArch>,
    /// Slices to parse, in descriptor order
    pub slices: Vec<SliceDescriptor>,
    pub warnings: Vec<ParseWarning>,
    /// Set when the arch table could not be read in full or a descriptor was rejected
    pub partially_malformed: bool,
}

impl FatLayout {
    /// Bytes occupied by the fat header and the arch table actually read
    pub fn header_range(&self) -> Option<ByteRange> {
        match self.kind {
            ContainerKind::Thin => None,
            ContainerKind::Fat { is_64, .. } => {
                let record = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };
                let len = FAT_HEADER_SIZE + record * self.arches.len();
                Some(ByteRange::new(0, len as u64))
            }
        }
    }
}

/// Fat magic, read big-endian, and the field byte order it implies
pub fn fat_magic(data: &[u8]) -> Option<(u32, bool, Endianness)> {
    let magic = data.read_u32(0, Endianness::Big).ok()?;
    match magic {
        FAT_MAGIC => Some((magic, false, Endianness::Big)),
        FAT_MAGIC_64 => Some((magic, true, Endianness::Big)),
        FAT_CIGAM => Some((magic, false, Endianness::Little)),
        FAT_CIGAM_64 => Some((magic, true, Endianness::Little)),
        _ => None,
    }
}

pub fn is_fat(data: &[u8]) -> bool {
    fat_magic(data).is_some()
}

fn read_arch(data: &[u8], at: usize, is_64: bool, endian: Endianness) -> Result<FatArch> {
    let cpu_type = data.read_u32(at, endian)?;
    let cpu_subtype = data.read_u32(at + 4, endian)?;
    if is_64 {
        Ok(FatArch {
            cpu_type,
            cpu_subtype,
            offset: data.read_u64(at + 8, endian)?,
            size: data.read_u64(at + 16, endian)?,
            align: data.read_u32(at + 24, endian)?,
            reserved: Some(data.read_u32(at + 28, endian)?),
        })
    } else {
        Ok(FatArch {
            cpu_type,
            cpu_subtype,
            offset: u64::from(data.read_u32(at + 8, endian)?),
            size: u64::from(data.read_u32(at + 12, endian)?),
            align: data.read_u32(at + 16, endian)?,
            reserved: None,
        })
    }
}

/// Split the container into architecture slices.
///
/// Fails only when nothing can be read: fewer than four bytes, or a fat
/// magic without a complete count. A count that runs past the buffer keeps
/// the descriptors that fit and records a `MalformedHeader` warning.
pub fn read_container(data: &[u8], config: &ParserConfig) -> Result<FatLayout> {
    if data.len() < 4 {
        return Err(MachoError::malformed(0, "container shorter than a magic number"));
    }

    let Some((magic, is_64, endian)) = fat_magic(data) else {
        debug!(size = data.len(), "Thin container");
        return Ok(FatLayout {
            kind: ContainerKind::Thin,
            arches: Vec::new(),
            slices: vec![SliceDescriptor {
                index: 0,
                range: ByteRange::new(0, data.len() as u64),
                cpu_type: None,
                cpu_subtype: None,
                align: None,
                in_fat: false,
            }],
            warnings: Vec::new(),
            partially_malformed: false,
        });
    };

    let nfat_arch = data
        .read_u32(4, endian)
        .map_err(|_| MachoError::malformed(4, "fat header truncated before nfat_arch"))?;

    let record = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };
    let mut warnings = Vec::new();
    let mut partially_malformed = false;

    let mut count = nfat_arch as usize;
    if nfat_arch > config.max_fat_arches {
        warnings.push(ParseWarning::new(
            4,
            WarningKind::LimitReached,
            format!(
                "nfat_arch {} exceeds limit {}; reading the first {}",
                nfat_arch, config.max_fat_arches, config.max_fat_arches
            ),
        ));
        count = config.max_fat_arches as usize;
        partially_malformed = true;
    }

    let available = data.len().saturating_sub(FAT_HEADER_SIZE) / record;
    if count > available {
        let err = MachoError::malformed(
            (FAT_HEADER_SIZE + available * record) as u64,
            format!(
                "nfat_arch {} needs {} bytes of descriptors but only {} fit",
                nfat_arch,
                count * record,
                available * record
            ),
        );
        warn!(nfat_arch, available, "Fat arch table runs past the container");
        warnings.push(ParseWarning::new(
            (FAT_HEADER_SIZE + available * record) as u64,
            WarningKind::MalformedHeader,
            err.to_string(),
        ));
        count = available;
        partially_malformed = true;
    }

    let size = data.len() as u64;
    let mut arches = Vec::with_capacity(count);
    let mut slices: Vec<SliceDescriptor> = Vec::with_capacity(count);

    for i in 0..count {
        let at = FAT_HEADER_SIZE + i * record;
        let arch = read_arch(data, at, is_64, endian)?;
        arches.push(arch);

        let range = ByteRange::new(arch.offset, arch.size);
        if !range.fits_within(size) || range.is_empty() {
            warnings.push(ParseWarning::new(
                at as u64,
                WarningKind::OutOfBounds,
                format!(
                    "arch {} range {:#x}+{:#x} lies outside the {}-byte container",
                    i, arch.offset, arch.size, size
                ),
            ));
            partially_malformed = true;
            continue;
        }
        if range.offset < (FAT_HEADER_SIZE + count * record) as u64 {
            warnings.push(ParseWarning::new(
                at as u64,
                WarningKind::Overlap,
                format!("arch {} overlaps the fat arch table", i),
            ));
            partially_malformed = true;
            continue;
        }
        if let Some(prev) = slices.iter().find(|s| s.range.overlaps(&range)) {
            warnings.push(ParseWarning::new(
                at as u64,
                WarningKind::Overlap,
                format!("arch {} overlaps arch {}", i, prev.index),
            ));
            partially_malformed = true;
            continue;
        }

        slices.push(SliceDescriptor {
            index: i,
            range,
            cpu_type: Some(arch.cpu_type),
            cpu_subtype: Some(arch.cpu_subtype),
            align: Some(arch.align),
            in_fat: true,
        });
    }

    debug!(
        nfat_arch,
        slices = slices.len(),
        is_64,
        "Parsed fat arch table"
    );

    Ok(FatLayout {
        kind: ContainerKind::Fat {
            magic,
            is_64,
            nfat_arch,
        },
        arches,
        slices,
        warnings,
        partially_malformed,
    })
}

//! Labelled hex-range reads.
//!
//! Returns a capped window of raw bytes together with one interpretation
//! record for every known fixed field overlapping the window.

use serde::{Deserialize, Serialize};

use crate::error::{MachoError, Result};
use crate::formats::macho::fields::{self, FieldDef};
use crate::formats::macho::{
    Container, ContainerKind, Endianness, MachoSlice, FAT_ARCH_64_SIZE, FAT_ARCH_SIZE, FAT_CIGAM,
    FAT_CIGAM_64, FAT_HEADER_SIZE,
};
use crate::io::{ByteRange, ByteSource, IOLimits};
use crate::timeout::{CancellationToken, ScanGuard};

/// One labelled field inside a hex window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub name: String,
    /// Absolute container offset of the whole field
    pub offset: u64,
    pub length: u64,
    pub decoded_value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HexRange {
    pub offset: u64,
    pub requested: u64,
    pub raw: Vec<u8>,
    pub interpretations: Vec<Interpretation>,
}

impl HexRange {
    /// Space-separated lowercase hex of the raw bytes
    pub fn hex_string(&self) -> String {
        self.raw
            .chunks(1)
            .map(hex::encode)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when the cap or EOF cut the read short
    pub fn is_truncated(&self) -> bool {
        (self.raw.len() as u64) < self.requested
    }
}

/// Read at most `limits.max_chunk_size` bytes at `offset` and label them.
pub fn read_bytes(
    data: &[u8],
    model: &Container,
    offset: u64,
    length: u64,
    limits: &IOLimits,
) -> Result<HexRange> {
    read_bytes_with(data, model, offset, length, limits, &CancellationToken::new(), 4096)
}

/// As `read_bytes`, polling `cancel` every `scan_chunk` records.
pub fn read_bytes_with(
    data: &[u8],
    model: &Container,
    offset: u64,
    length: u64,
    limits: &IOLimits,
    cancel: &CancellationToken,
    scan_chunk: usize,
) -> Result<HexRange> {
    check_start(offset, length, data.len() as u64)?;
    let end = offset
        .saturating_add(length.min(limits.max_chunk_size))
        .min(data.len() as u64);
    let raw = data[offset as usize..end as usize].to_vec();
    label(data, model, offset, length, raw, cancel, scan_chunk)
}

/// Labelled read straight from a byte source, capped by the source's own limits.
pub fn read_source(source: &ByteSource, model: &Container, offset: u64, length: u64) -> Result<HexRange> {
    check_start(offset, length, source.len())?;
    let raw = source.read_chunk(offset, length).to_vec();
    label(source.as_bytes(), model, offset, length, raw, &CancellationToken::new(), 4096)
}

fn check_start(offset: u64, length: u64, size: u64) -> Result<()> {
    if offset > size || (offset == size && length > 0) {
        return Err(MachoError::OutOfBoundsOffset {
            offset,
            len: length,
            size,
        });
    }
    Ok(())
}

fn label(
    data: &[u8],
    model: &Container,
    offset: u64,
    length: u64,
    raw: Vec<u8>,
    cancel: &CancellationToken,
    scan_chunk: usize,
) -> Result<HexRange> {
    let window = ByteRange::new(offset, raw.len() as u64);

    let mut labeller = Labeller {
        data,
        window,
        out: Vec::new(),
        guard: ScanGuard::new(cancel, scan_chunk),
    };

    if !window.is_empty() {
        labeller.fat(model)?;
        for slice in &model.slices {
            labeller.slice(slice)?;
        }
    }

    let mut interpretations = labeller.out;
    interpretations.sort_by(|a, b| a.offset.cmp(&b.offset).then(a.name.cmp(&b.name)));

    Ok(HexRange {
        offset,
        requested: length,
        raw,
        interpretations,
    })
}

struct Labeller<'a> {
    data: &'a [u8],
    window: ByteRange,
    out: Vec<Interpretation>,
    guard: ScanGuard<'a>,
}

impl Labeller<'_> {
    fn record(
        &mut self,
        base: u64,
        record_len: u64,
        defs: &'static [FieldDef],
        endian: Endianness,
        prefix: &str,
    ) -> Result<()> {
        self.guard.tick()?;
        if !ByteRange::new(base, record_len).overlaps(&self.window) {
            return Ok(());
        }
        for def in defs {
            if def.offset as u64 + def.width as u64 > record_len {
                break;
            }
            let range = ByteRange::new(base + def.offset as u64, def.width as u64);
            if !range.overlaps(&self.window) || !range.fits_within(self.data.len() as u64) {
                continue;
            }
            let bytes = &self.data[range.offset as usize..range.end() as usize];
            self.out.push(Interpretation {
                name: format!("{}.{}", prefix, def.name),
                offset: range.offset,
                length: range.len,
                decoded_value: fields::decode(def, bytes, endian),
                description: def.description.to_string(),
            });
        }
        Ok(())
    }

    fn fat(&mut self, model: &Container) -> Result<()> {
        let ContainerKind::Fat { magic, is_64, .. } = model.kind else {
            return Ok(());
        };
        let endian = if magic == FAT_CIGAM || magic == FAT_CIGAM_64 {
            Endianness::Little
        } else {
            Endianness::Big
        };
        self.record(0, FAT_HEADER_SIZE as u64, fields::fat_header_fields(), endian, "fat")?;
        let arch_size = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };
        for i in 0..model.fat_arches.len() {
            let base = (FAT_HEADER_SIZE + i * arch_size) as u64;
            self.record(
                base,
                arch_size as u64,
                fields::fat_arch_fields(is_64),
                endian,
                &format!("fat.arch[{}]", i),
            )?;
        }
        Ok(())
    }

    fn slice(&mut self, slice: &MachoSlice) -> Result<()> {
        let start = slice.slice.range.offset;
        if !slice.slice.range.overlaps(&self.window) {
            return Ok(());
        }
        let endian = slice.header.endianness;
        let bitness = slice.header.bitness;
        let prefix = format!("slice[{}]", slice.slice.index);

        self.record(
            start,
            slice.header.size() as u64,
            fields::header_fields(bitness),
            endian,
            &format!("{}.header", prefix),
        )?;

        for cmd in &slice.load_commands.commands {
            self.record(
                start + cmd.offset,
                cmd.payload.len() as u64,
                fields::command_fields(cmd.cmd),
                endian,
                &format!("{}.{}[{}]", prefix, cmd.name(), cmd.index),
            )?;
        }

        let section_size = bitness.section_size() as u64;
        for seg in &slice.segments.segments {
            for sec in &seg.sections {
                self.record(
                    start + sec.record_offset,
                    section_size,
                    fields::section_fields(bitness),
                    endian,
                    &format!("{}.{},{}", prefix, seg.name, sec.name),
                )?;
            }
        }

        if let Some(table) = &slice.symtab {
            let entry = bitness.nlist_size() as u64;
            let base = start + u64::from(table.command.symoff);
            let count = table.symbols.len() as u64;
            let first = self.window.offset.saturating_sub(base) / entry;
            let last = (self.window.end().saturating_sub(base)).div_ceil(entry).min(count);
            for i in first..last {
                let name = &table.symbols[i as usize].name;
                self.record(
                    base + i * entry,
                    entry,
                    fields::nlist_fields(bitness),
                    endian,
                    &format!("{}.symbol[{}]({})", prefix, i, name),
                )?;
            }
        }
        Ok(())
    }
}

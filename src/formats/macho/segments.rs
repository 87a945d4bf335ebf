//! Segment and section model

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ParserConfig;
use crate::error::Result;
use crate::formats::macho::load_commands::LoadCommandTable;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{fixed_name, read_word, EndianRead};
use crate::io::ByteRange;
use crate::timeout::{CancellationToken, ScanGuard};

/// Segments of one slice, in load-command order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTable {
    pub segments: Vec<Segment>,
}

impl SegmentTable {
    /// Build segments and their sections from the parsed load commands.
    ///
    /// `slice` is the slice's range inside the container and `container_len`
    /// the container size; section file ranges are checked against both.
    pub fn parse(
        data: &[u8],
        header: &Header,
        commands: &LoadCommandTable,
        slice: ByteRange,
        container_len: u64,
        config: &ParserConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let seg_cmds: Vec<(&LoadCommand, &SegmentCommand)> = commands
            .commands
            .iter()
            .filter_map(|c| match &c.view {
                CommandView::Segment(s) => Some((c, s)),
                _ => None,
            })
            .collect();

        // ordinals run across the whole slice, so compute each segment's first one up front
        let mut first_ordinals = Vec::with_capacity(seg_cmds.len());
        let mut next = 1u32;
        for (_, seg) in &seg_cmds {
            first_ordinals.push(next);
            // declared count, so capped or short segments don't shift later ordinals
            next = next.saturating_add(seg.nsects);
        }

        let build = |(i, (cmd, seg)): (usize, &(&LoadCommand, &SegmentCommand))| {
            build_segment(
                data,
                header,
                cmd,
                seg,
                i,
                first_ordinals[i],
                slice,
                container_len,
                config,
                cancel,
            )
        };

        let segments: Result<Vec<Segment>> = if config.parallel && seg_cmds.len() > 1 {
            seg_cmds.par_iter().enumerate().map(build).collect()
        } else {
            seg_cmds.iter().enumerate().map(build).collect()
        };

        Ok(Self {
            segments: segments?,
        })
    }

    pub fn by_index(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// All sections in ordinal order
    pub fn sections(&self) -> impl Iterator<Item = (&Segment, &Section)> {
        self.segments
            .iter()
            .flat_map(|seg| seg.sections.iter().map(move |sec| (seg, sec)))
    }

    /// Section by its 1-based slice-wide ordinal (nlist n_sect)
    pub fn section_by_ordinal(&self, ordinal: u32) -> Option<(&Segment, &Section)> {
        self.sections().find(|(_, s)| s.ordinal == ordinal)
    }

    pub fn segment_for_addr(&self, addr: u64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.vmsize > 0 && s.contains_vm_range(addr, 1))
    }
}

/// Section records that fit inside the command, capped by configuration
fn readable_sections(cmd: &LoadCommand, header: &Header, nsects: u32, config: &ParserConfig) -> u32 {
    let bitness = segment_bitness(cmd, header);
    let room = (cmd.payload.len().saturating_sub(bitness.segment_command_size())
        / bitness.section_size()) as u32;
    nsects.min(room).min(config.max_sections_per_segment)
}

fn segment_bitness(cmd: &LoadCommand, header: &Header) -> Bitness {
    match cmd.cmd {
        LC_SEGMENT_64 => Bitness::Bits64,
        LC_SEGMENT => Bitness::Bits32,
        _ => header.bitness,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_segment(
    data: &[u8],
    header: &Header,
    cmd: &LoadCommand,
    seg: &SegmentCommand,
    index: usize,
    first_ordinal: u32,
    slice: ByteRange,
    container_len: u64,
    config: &ParserConfig,
    cancel: &CancellationToken,
) -> Result<Segment> {
    let endian = header.endianness;
    let bitness = segment_bitness(cmd, header);
    let mut warnings = Vec::new();

    let max_prot = VmProt::from_bits_truncate(seg.maxprot);
    let init_prot = VmProt::from_bits_truncate(seg.initprot);

    if !ByteRange::new(seg.fileoff, seg.filesize).fits_within(slice.len) {
        warnings.push(ParseWarning::new(
            cmd.offset,
            WarningKind::OutOfBounds,
            format!(
                "segment {} file range {:#x}+{:#x} exceeds the {}-byte slice",
                seg.segname, seg.fileoff, seg.filesize, slice.len
            ),
        ));
    }
    if seg.filesize > seg.vmsize {
        warnings.push(ParseWarning::new(
            cmd.offset,
            WarningKind::InvalidRange,
            format!(
                "segment {} filesize {:#x} exceeds vmsize {:#x}",
                seg.segname, seg.filesize, seg.vmsize
            ),
        ));
    }

    let readable = readable_sections(cmd, header, seg.nsects, config);
    if readable < seg.nsects {
        let fits = (cmd.payload.len().saturating_sub(bitness.segment_command_size())
            / bitness.section_size()) as u32;
        let (kind, message) = if fits < seg.nsects {
            (
                WarningKind::MalformedCommand,
                format!(
                    "nsects {} needs more room than cmdsize {} provides",
                    seg.nsects, cmd.cmdsize
                ),
            )
        } else {
            (
                WarningKind::LimitReached,
                format!(
                    "nsects {} exceeds limit {}",
                    seg.nsects, config.max_sections_per_segment
                ),
            )
        };
        warnings.push(ParseWarning::new(cmd.offset, kind, message));
    }

    let mut guard = ScanGuard::new(cancel, config.scan_chunk);
    let mut sections = Vec::with_capacity(readable as usize);
    let base = cmd.offset as usize + bitness.segment_command_size();

    for i in 0..readable as usize {
        guard.tick()?;
        let at = base + i * bitness.section_size();
        let section = parse_section(data, at, bitness, endian, i, first_ordinal + i as u32)?;
        sections.push(validate_section(section, seg, slice, container_len));
    }

    Ok(Segment {
        index,
        command_index: cmd.index,
        command_offset: cmd.offset,
        name: seg.segname.clone(),
        vmaddr: seg.vmaddr,
        vmsize: seg.vmsize,
        fileoff: seg.fileoff,
        filesize: seg.filesize,
        maxprot: seg.maxprot,
        initprot: seg.initprot,
        nsects: seg.nsects,
        flags: seg.flags,
        max_protection: max_prot.rwx(),
        init_protection: init_prot.rwx(),
        sections,
        warnings,
    })
}

fn parse_section(
    data: &[u8],
    at: usize,
    bitness: Bitness,
    endian: Endianness,
    index: usize,
    ordinal: u32,
) -> Result<Section> {
    let w = bitness.word_size();
    let name = data.get(at..at + 16).map(fixed_name).unwrap_or_default();
    let segment_name = data.get(at + 16..at + 32).map(fixed_name).unwrap_or_default();
    let addr = read_word(data, at + 32, bitness, endian)?;
    let size = read_word(data, at + 32 + w, bitness, endian)?;
    let rest = at + 32 + 2 * w;

    Ok(Section {
        index,
        ordinal,
        record_offset: at as u64,
        name,
        segment_name,
        addr,
        size,
        offset: data.read_u32(rest, endian)?,
        align: data.read_u32(rest + 4, endian)?,
        reloff: data.read_u32(rest + 8, endian)?,
        nreloc: data.read_u32(rest + 12, endian)?,
        flags: data.read_u32(rest + 16, endian)?,
        reserved1: data.read_u32(rest + 20, endian)?,
        reserved2: data.read_u32(rest + 24, endian)?,
        reserved3: match bitness {
            Bitness::Bits64 => Some(data.read_u32(rest + 28, endian)?),
            Bitness::Bits32 => None,
        },
        warnings: Vec::new(),
    })
}

fn validate_section(
    mut section: Section,
    seg: &SegmentCommand,
    slice: ByteRange,
    container_len: u64,
) -> Section {
    if !section.is_zerofill() && section.size > 0 {
        let absolute = slice.offset.saturating_add(u64::from(section.offset));
        if !ByteRange::new(absolute, section.size).fits_within(container_len) {
            section.warnings.push(ParseWarning::new(
                section.record_offset,
                WarningKind::OutOfBounds,
                format!(
                    "section {},{} file range {:#x}+{:#x} exceeds the {}-byte container",
                    section.segment_name, section.name, absolute, section.size, container_len
                ),
            ));
        }
    }

    let seg_end = seg.vmaddr.saturating_add(seg.vmsize);
    if section.addr < seg.vmaddr || section.addr.saturating_add(section.size) > seg_end {
        section.warnings.push(ParseWarning::new(
            section.record_offset,
            WarningKind::InvalidRange,
            format!(
                "section {},{} [{:#x}, {:#x}) outside segment {} [{:#x}, {:#x})",
                section.segment_name,
                section.name,
                section.addr,
                section.addr.saturating_add(section.size),
                seg.segname,
                seg.vmaddr,
                seg_end
            ),
        ));
    }

    if section.segment_name != seg.segname {
        section.warnings.push(ParseWarning::new(
            section.record_offset,
            WarningKind::InvalidRange,
            format!(
                "section {} names segment {} but lives in {}",
                section.name, section.segment_name, seg.segname
            ),
        ));
    }

    section
}

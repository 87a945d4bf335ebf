//! Mach-O parser
//!
//! Splits a container into architecture slices and builds a structural
//! model for each: header, load commands, segments with sections, symbol
//! tables, and derived cross-references. Malformed structures are recorded
//! as warnings on the model wherever parsing can continue.

pub mod fat;
pub mod fields;
pub mod headers;
pub mod load_commands;
pub mod segments;
pub mod symbols;
pub mod types;
pub mod utils;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::analysis::xrefs::{self, XRef};
use crate::config::ParserConfig;
use crate::error::{MachoError, Result};
use crate::io::ByteRange;
use crate::timeout::CancellationToken;
use headers::parse_header;
use load_commands::LoadCommandTable;
use segments::SegmentTable;
pub use types::*;

/// A slice that could not be parsed at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceError {
    pub index: usize,
    pub range: ByteRange,
    pub message: String,
}

/// Everything parsed from one architecture slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachoSlice {
    pub slice: BinarySlice,
    pub header: Header,
    pub load_commands: LoadCommandTable,
    pub segments: SegmentTable,
    pub symtab: Option<SymbolTable>,
    pub dysymtab: Option<DySymTabInfo>,
    pub xrefs: Vec<XRef>,
    /// Slice-level problems not owned by a single entity
    pub warnings: Vec<ParseWarning>,
}

impl MachoSlice {
    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.by_index(index)
    }

    pub fn section(&self, segment: usize, index: usize) -> Option<&Section> {
        self.segment(segment)?.sections.get(index)
    }

    pub fn load_command(&self, index: usize) -> Option<&LoadCommand> {
        self.load_commands.by_index(index)
    }

    pub fn symbols(&self) -> &[Symbol] {
        self.symtab.as_ref().map(|t| t.symbols.as_slice()).unwrap_or(&[])
    }

    pub fn dylibs(&self) -> impl Iterator<Item = (usize, &DylibCommand)> {
        self.load_commands.dylibs()
    }

    pub fn entry_point(&self) -> Option<&EntryPointCommand> {
        self.load_commands.entry_point()
    }

    /// Absolute container range of a section's file bytes; None for zero-fill
    pub fn section_file_range(&self, section: &Section) -> Option<ByteRange> {
        if section.is_zerofill() {
            return None;
        }
        Some(ByteRange::new(
            self.slice.range.offset + u64::from(section.offset),
            section.size,
        ))
    }

    /// Every warning in the slice, entity-level ones included
    pub fn all_warnings(&self) -> Vec<&ParseWarning> {
        let mut out: Vec<&ParseWarning> = self.warnings.iter().collect();
        out.extend(self.load_commands.warnings.iter());
        out.extend(self.load_commands.commands.iter().flat_map(|c| c.warnings.iter()));
        for seg in &self.segments.segments {
            out.extend(seg.warnings.iter());
            out.extend(seg.sections.iter().flat_map(|s| s.warnings.iter()));
        }
        if let Some(t) = &self.symtab {
            out.extend(t.warnings.iter());
        }
        if let Some(d) = &self.dysymtab {
            out.extend(d.warnings.iter());
        }
        out
    }

    /// Number of warnings meaning some structure failed to parse
    pub fn structural_faults(&self) -> usize {
        self.all_warnings()
            .iter()
            .filter(|w| w.kind.is_structural())
            .count()
    }

    /// Number of warnings that break the structure or a layout invariant
    pub fn layout_faults(&self) -> usize {
        self.all_warnings()
            .iter()
            .filter(|w| w.kind.breaks_layout())
            .count()
    }
}

/// Parsed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub kind: ContainerKind,
    pub size: u64,
    /// Fat arch descriptors as read; empty for thin containers
    pub fat_arches: Vec<FatArch>,
    pub slices: Vec<MachoSlice>,
    pub slice_errors: Vec<SliceError>,
    /// Container-level problems (fat table)
    pub warnings: Vec<ParseWarning>,
    pub partially_malformed: bool,
}

impl Container {
    pub fn is_fat(&self) -> bool {
        matches!(self.kind, ContainerKind::Fat { .. })
    }

    /// Slice by its position in the container (fat arch index)
    pub fn slice(&self, index: usize) -> Option<&MachoSlice> {
        self.slices.iter().find(|s| s.slice.index == index)
    }

    /// Bytes of the fat header and arch table
    pub fn fat_header_range(&self) -> Option<ByteRange> {
        match self.kind {
            ContainerKind::Thin => None,
            ContainerKind::Fat { is_64, .. } => {
                let record = if is_64 { FAT_ARCH_64_SIZE } else { FAT_ARCH_SIZE };
                Some(ByteRange::new(
                    0,
                    (FAT_HEADER_SIZE + record * self.fat_arches.len()) as u64,
                ))
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Main Mach-O parser
pub struct MachoParser<'data> {
    data: &'data [u8],
    config: ParserConfig,
    cancel: CancellationToken,
}

impl<'data> MachoParser<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            config: ParserConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a token so another thread can stop the scan
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get raw data
    pub fn data(&self) -> &'data [u8] {
        self.data
    }

    pub fn is_fat(&self) -> bool {
        fat::is_fat(self.data)
    }

    /// Split into slices without parsing them
    pub fn layout(&self) -> Result<fat::FatLayout> {
        fat::read_container(self.data, &self.config)
    }

    pub fn parse(&self) -> Result<Container> {
        parse_container_with(self.data, &self.config, &self.cancel)
    }
}

/// Parse a container with default cancellation (never cancelled)
pub fn parse_container(data: &[u8], config: &ParserConfig) -> Result<Container> {
    parse_container_with(data, config, &CancellationToken::new())
}

/// Parse a container, polling `cancel` during long scans.
///
/// A thin container whose header cannot be read is an error. Fat slices
/// that fail are recorded in `slice_errors` and the rest still parse.
pub fn parse_container_with(
    data: &[u8],
    config: &ParserConfig,
    cancel: &CancellationToken,
) -> Result<Container> {
    let span = info_span!("parse_container", size = data.len());
    let _enter = span.enter();

    let layout = fat::read_container(data, config)?;
    let container_len = data.len() as u64;

    fn annotate<F>(f: F) -> F
    where
        F: for<'a> Fn(&'a SliceDescriptor) -> (&'a SliceDescriptor, Result<MachoSlice>) + Sync + Send,
    {
        f
    }

    let parse_one = annotate(|desc: &SliceDescriptor| {
        let bytes = &data[desc.range.offset as usize..desc.range.end() as usize];
        (desc, parse_slice(bytes, desc, container_len, config, cancel))
    });

    let results: Vec<_> = if config.parallel && layout.slices.len() > 1 {
        layout.slices.par_iter().map(parse_one).collect()
    } else {
        layout.slices.iter().map(parse_one).collect()
    };

    let mut slices = Vec::with_capacity(results.len());
    let mut slice_errors = Vec::new();
    for (desc, result) in results {
        match result {
            Ok(slice) => slices.push(slice),
            Err(MachoError::Cancelled) => return Err(MachoError::Cancelled),
            Err(e) if layout.kind == ContainerKind::Thin => return Err(e),
            Err(e) => {
                warn!(slice = desc.index, error = %e, "Slice failed to parse");
                slice_errors.push(SliceError {
                    index: desc.index,
                    range: desc.range,
                    message: e.to_string(),
                });
            }
        }
    }

    let partially_malformed = layout.partially_malformed || !slice_errors.is_empty();
    info!(
        slices = slices.len(),
        failed = slice_errors.len(),
        fat = layout.kind != ContainerKind::Thin,
        partially_malformed,
        "Parsed container"
    );

    Ok(Container {
        kind: layout.kind,
        size: container_len,
        fat_arches: layout.arches,
        slices,
        slice_errors,
        warnings: layout.warnings,
        partially_malformed,
    })
}

/// Parse one slice. `data` is exactly the slice's bytes.
pub fn parse_slice(
    data: &[u8],
    desc: &SliceDescriptor,
    container_len: u64,
    config: &ParserConfig,
    cancel: &CancellationToken,
) -> Result<MachoSlice> {
    let header = parse_header(data).map_err(|e| match e {
        MachoError::MalformedHeader { offset, message } => MachoError::MalformedHeader {
            offset: desc.range.offset + offset,
            message,
        },
        other => other,
    })?;

    let mut warnings = Vec::new();
    if let Some(cpu) = desc.cpu_type {
        if cpu != header.cpu_type {
            warnings.push(ParseWarning::new(
                4,
                WarningKind::InvalidRange,
                format!(
                    "fat descriptor says {} but header says {}",
                    CpuType::from(cpu),
                    header.cpu()
                ),
            ));
        }
    }

    let slice = BinarySlice {
        index: desc.index,
        arch: header.cpu(),
        range: desc.range,
        bitness: header.bitness,
        endianness: header.endianness,
        in_fat: desc.in_fat,
        align: desc.align,
    };
    debug!(
        slice = slice.index,
        arch = %slice.arch,
        bits = slice.bitness.bits(),
        ncmds = header.ncmds,
        "Parsing slice"
    );

    let load_commands = LoadCommandTable::parse(data, &header, config, cancel)?;

    // segments and the symbol table are independent; xrefs wait for both
    let (segments, symtab) = rayon::join(
        || SegmentTable::parse(data, &header, &load_commands, desc.range, container_len, config, cancel),
        || {
            load_commands
                .symtab()
                .map(|cmd| SymbolTable::parse(data, &header, cmd, config, cancel))
                .transpose()
        },
    );
    let segments = segments?;
    let symtab = symtab?;

    let dysymtab = match load_commands.dysymtab() {
        Some(cmd) => {
            // ranges are checked against the declared count; accessors clamp to what parsed
            let nsyms = load_commands.symtab().map(|t| t.nsyms).unwrap_or(0);
            Some(DySymTabInfo::parse(data, &header, cmd, nsyms, config, cancel)?)
        }
        None => None,
    };

    let xrefs = xrefs::resolve(desc.index, &segments, symtab.as_ref(), &load_commands);

    Ok(MachoSlice {
        slice,
        header,
        load_commands,
        segments,
        symtab,
        dysymtab,
        xrefs,
        warnings,
    })
}

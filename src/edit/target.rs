//! Typed edit targets.
//!
//! Every editable field is a variant of a closed enum; resolving a target
//! against a parsed container yields the absolute byte range it occupies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MachoError, Result};
use crate::formats::macho::fields::{self, FieldDef, FieldKind};
use crate::formats::macho::utils::{encode_fixed_name, encode_uint};
use crate::formats::macho::{Bitness, Container, Endianness, MachoSlice, LC_SEGMENT, LC_SEGMENT_64};
use crate::io::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderField {
    Magic,
    CpuType,
    CpuSubtype,
    FileType,
    Ncmds,
    SizeOfCmds,
    Flags,
    /// 64-bit headers only
    Reserved,
}

impl HeaderField {
    /// Layout entry in the header record; None for `reserved` on 32-bit slices
    pub fn def(&self, bitness: Bitness) -> Option<&'static FieldDef> {
        let at = match self {
            HeaderField::Magic => 0,
            HeaderField::CpuType => 1,
            HeaderField::CpuSubtype => 2,
            HeaderField::FileType => 3,
            HeaderField::Ncmds => 4,
            HeaderField::SizeOfCmds => 5,
            HeaderField::Flags => 6,
            HeaderField::Reserved => 7,
        };
        fields::header_fields(bitness).get(at)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            HeaderField::Magic => "magic",
            HeaderField::CpuType => "cputype",
            HeaderField::CpuSubtype => "cpusubtype",
            HeaderField::FileType => "filetype",
            HeaderField::Ncmds => "ncmds",
            HeaderField::SizeOfCmds => "sizeofcmds",
            HeaderField::Flags => "flags",
            HeaderField::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCommandField {
    Cmd,
    CmdSize,
}

impl LoadCommandField {
    pub fn def(&self) -> Option<&'static FieldDef> {
        let at = match self {
            LoadCommandField::Cmd => 0,
            LoadCommandField::CmdSize => 1,
        };
        fields::load_command_fields().get(at)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            LoadCommandField::Cmd => "cmd",
            LoadCommandField::CmdSize => "cmdsize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentField {
    SegName,
    VmAddr,
    VmSize,
    FileOff,
    FileSize,
    MaxProt,
    InitProt,
    NSects,
    Flags,
}

impl SegmentField {
    /// Layout entry in the segment command; the first two entries are cmd/cmdsize
    pub fn def(&self, bitness: Bitness) -> Option<&'static FieldDef> {
        let at = match self {
            SegmentField::SegName => 2,
            SegmentField::VmAddr => 3,
            SegmentField::VmSize => 4,
            SegmentField::FileOff => 5,
            SegmentField::FileSize => 6,
            SegmentField::MaxProt => 7,
            SegmentField::InitProt => 8,
            SegmentField::NSects => 9,
            SegmentField::Flags => 10,
        };
        fields::segment_fields(bitness).get(at)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            SegmentField::SegName => "segname",
            SegmentField::VmAddr => "vmaddr",
            SegmentField::VmSize => "vmsize",
            SegmentField::FileOff => "fileoff",
            SegmentField::FileSize => "filesize",
            SegmentField::MaxProt => "maxprot",
            SegmentField::InitProt => "initprot",
            SegmentField::NSects => "nsects",
            SegmentField::Flags => "flags",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionField {
    SectName,
    SegName,
    Addr,
    Size,
    Offset,
    Align,
    RelOff,
    NReloc,
    Flags,
    Reserved1,
    Reserved2,
    /// 64-bit sections only
    Reserved3,
}

impl SectionField {
    /// Layout entry in the section record; None for `reserved3` on 32-bit slices
    pub fn def(&self, bitness: Bitness) -> Option<&'static FieldDef> {
        let at = match self {
            SectionField::SectName => 0,
            SectionField::SegName => 1,
            SectionField::Addr => 2,
            SectionField::Size => 3,
            SectionField::Offset => 4,
            SectionField::Align => 5,
            SectionField::RelOff => 6,
            SectionField::NReloc => 7,
            SectionField::Flags => 8,
            SectionField::Reserved1 => 9,
            SectionField::Reserved2 => 10,
            SectionField::Reserved3 => 11,
        };
        fields::section_fields(bitness).get(at)
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            SectionField::SectName => "sectname",
            SectionField::SegName => "segname",
            SectionField::Addr => "addr",
            SectionField::Size => "size",
            SectionField::Offset => "offset",
            SectionField::Align => "align",
            SectionField::RelOff => "reloff",
            SectionField::NReloc => "nreloc",
            SectionField::Flags => "flags",
            SectionField::Reserved1 => "reserved1",
            SectionField::Reserved2 => "reserved2",
            SectionField::Reserved3 => "reserved3",
        }
    }
}

/// An editable field, addressed by structural ids within a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditTarget {
    Header {
        slice: usize,
        field: HeaderField,
    },
    LoadCommand {
        slice: usize,
        index: usize,
        field: LoadCommandField,
    },
    Segment {
        slice: usize,
        segment: usize,
        field: SegmentField,
    },
    Section {
        slice: usize,
        segment: usize,
        section: usize,
        field: SectionField,
    },
}

/// A target pinned to container bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub range: ByteRange,
    pub def: &'static FieldDef,
    pub endianness: Endianness,
}

impl EditTarget {
    pub fn slice_index(&self) -> usize {
        match *self {
            EditTarget::Header { slice, .. }
            | EditTarget::LoadCommand { slice, .. }
            | EditTarget::Segment { slice, .. }
            | EditTarget::Section { slice, .. } => slice,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            EditTarget::Header { .. } => "header",
            EditTarget::LoadCommand { .. } => "load_command",
            EditTarget::Segment { .. } => "segment",
            EditTarget::Section { .. } => "section",
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            EditTarget::Header { field, .. } => field.field_name(),
            EditTarget::LoadCommand { field, .. } => field.field_name(),
            EditTarget::Segment { field, .. } => field.field_name(),
            EditTarget::Section { field, .. } => field.field_name(),
        }
    }

    /// Absolute byte range and layout of the field in `model`.
    pub fn resolve(&self, model: &Container) -> Result<ResolvedTarget> {
        let slice_index = self.slice_index();
        let slice = model
            .slice(slice_index)
            .ok_or_else(|| self.not_found(format!("slice {} not parsed", slice_index)))?;
        let bitness = slice.header.bitness;

        let (record_offset, record_len, def) = match *self {
            EditTarget::Header { field, .. } => (0, slice.header.size() as u64, field.def(bitness)),
            EditTarget::LoadCommand { index, field, .. } => {
                let cmd = slice
                    .load_command(index)
                    .ok_or_else(|| self.not_found(format!("load command {} missing", index)))?;
                (cmd.offset, cmd.payload.len() as u64, field.def())
            }
            EditTarget::Segment { segment, field, .. } => {
                let seg = slice
                    .segment(segment)
                    .ok_or_else(|| self.not_found(format!("segment {} missing", segment)))?;
                let cmd = self.segment_command(slice, seg.command_index)?;
                (cmd.0, cmd.1, field.def(bitness))
            }
            EditTarget::Section {
                segment,
                section,
                field,
                ..
            } => {
                let sec = slice.section(segment, section).ok_or_else(|| {
                    self.not_found(format!("section {} of segment {} missing", section, segment))
                })?;
                (sec.record_offset, bitness.section_size() as u64, field.def(bitness))
            }
        };

        let def = def.ok_or_else(|| self.not_found(format!("no {} field for {}-bit slices", self.field_name(), bitness.bits())))?;
        if (def.offset + def.width) as u64 > record_len {
            return Err(self.not_found("record is truncated before the field".to_string()));
        }

        Ok(ResolvedTarget {
            range: ByteRange::new(
                slice.slice.range.offset + record_offset + def.offset as u64,
                def.width as u64,
            ),
            def,
            endianness: slice.header.endianness,
        })
    }

    fn segment_command(&self, slice: &MachoSlice, index: usize) -> Result<(u64, u64)> {
        let cmd = slice
            .load_command(index)
            .filter(|c| c.cmd == LC_SEGMENT || c.cmd == LC_SEGMENT_64)
            .ok_or_else(|| self.not_found(format!("segment command {} missing", index)))?;
        Ok((cmd.offset, cmd.payload.len() as u64))
    }

    fn not_found(&self, reason: String) -> MachoError {
        MachoError::TargetNotFound(format!("{}: {}", self, reason))
    }
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::Header { slice, field } => {
                write!(f, "slice[{}].header.{}", slice, field.field_name())
            }
            EditTarget::LoadCommand { slice, index, field } => write!(
                f,
                "slice[{}].load_command[{}].{}",
                slice,
                index,
                field.field_name()
            ),
            EditTarget::Segment {
                slice,
                segment,
                field,
            } => write!(
                f,
                "slice[{}].segment[{}].{}",
                slice,
                segment,
                field.field_name()
            ),
            EditTarget::Section {
                slice,
                segment,
                section,
                field,
            } => write!(
                f,
                "slice[{}].segment[{}].section[{}].{}",
                slice,
                segment,
                section,
                field.field_name()
            ),
        }
    }
}

/// A new value for a field, encoded against the field's layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Raw bytes, written verbatim
    Bytes(Vec<u8>),
    /// Integer in the slice's byte order (magic is always little-endian)
    Uint(u64),
    /// Segment or section name, NUL padded to 16 bytes
    Name(String),
}

impl FieldValue {
    pub fn encode(&self, target: &ResolvedTarget) -> Result<Vec<u8>> {
        let width = target.def.width;
        match self {
            FieldValue::Bytes(b) => Ok(b.clone()),
            FieldValue::Uint(v) => {
                let needed = ((64 - v.leading_zeros()) as usize).div_ceil(8).max(1);
                if target.def.kind == FieldKind::Name || needed > width {
                    return Err(MachoError::SizeMismatch {
                        expected: width,
                        found: needed,
                    });
                }
                let endian = match target.def.kind {
                    FieldKind::Magic => Endianness::Little,
                    _ => target.endianness,
                };
                Ok(encode_uint(*v, width, endian))
            }
            FieldValue::Name(name) => {
                if target.def.kind != FieldKind::Name {
                    return Err(MachoError::SizeMismatch {
                        expected: width,
                        found: name.len(),
                    });
                }
                encode_fixed_name(name)
                    .map(|b| b.to_vec())
                    .ok_or(MachoError::SizeMismatch {
                        expected: width,
                        found: name.len(),
                    })
            }
        }
    }
}

//! Fixed-width field layouts of the on-disk records.
//!
//! Edit targets resolve their byte ranges through these tables and the
//! hex-range view uses them to label raw bytes.

use crate::formats::macho::types::*;
use crate::formats::macho::utils::{fixed_name, EndianRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer in the record's byte order
    Uint,
    /// NUL-padded fixed name
    Name,
    /// Magic read little-endian regardless of the slice's byte order
    Magic,
}

/// One field of a fixed record, offset relative to the record start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub kind: FieldKind,
    pub description: &'static str,
}

const fn uint(name: &'static str, offset: usize, width: usize, description: &'static str) -> FieldDef {
    FieldDef {
        name,
        offset,
        width,
        kind: FieldKind::Uint,
        description,
    }
}

const fn fname(name: &'static str, offset: usize, description: &'static str) -> FieldDef {
    FieldDef {
        name,
        offset,
        width: 16,
        kind: FieldKind::Name,
        description,
    }
}

const HEADER_32: &[FieldDef] = &[
    FieldDef {
        name: "magic",
        offset: 0,
        width: 4,
        kind: FieldKind::Magic,
        description: "Magic number selecting bit-width and byte order",
    },
    uint("cputype", 4, 4, "CPU type"),
    uint("cpusubtype", 8, 4, "CPU subtype"),
    uint("filetype", 12, 4, "File type"),
    uint("ncmds", 16, 4, "Number of load commands"),
    uint("sizeofcmds", 20, 4, "Total size of load commands"),
    uint("flags", 24, 4, "Header flags"),
];

const HEADER_64: &[FieldDef] = &[
    FieldDef {
        name: "magic",
        offset: 0,
        width: 4,
        kind: FieldKind::Magic,
        description: "Magic number selecting bit-width and byte order",
    },
    uint("cputype", 4, 4, "CPU type"),
    uint("cpusubtype", 8, 4, "CPU subtype"),
    uint("filetype", 12, 4, "File type"),
    uint("ncmds", 16, 4, "Number of load commands"),
    uint("sizeofcmds", 20, 4, "Total size of load commands"),
    uint("flags", 24, 4, "Header flags"),
    uint("reserved", 28, 4, "Reserved (64-bit only)"),
];

const LOAD_COMMAND: &[FieldDef] = &[
    uint("cmd", 0, 4, "Load command type"),
    uint("cmdsize", 4, 4, "Load command size"),
];

const SEGMENT_32: &[FieldDef] = &[
    uint("cmd", 0, 4, "Load command type"),
    uint("cmdsize", 4, 4, "Load command size"),
    fname("segname", 8, "Segment name"),
    uint("vmaddr", 24, 4, "Virtual memory address"),
    uint("vmsize", 28, 4, "Virtual memory size"),
    uint("fileoff", 32, 4, "File offset"),
    uint("filesize", 36, 4, "Bytes mapped from the file"),
    uint("maxprot", 40, 4, "Maximum VM protection"),
    uint("initprot", 44, 4, "Initial VM protection"),
    uint("nsects", 48, 4, "Number of sections"),
    uint("flags", 52, 4, "Segment flags"),
];

const SEGMENT_64: &[FieldDef] = &[
    uint("cmd", 0, 4, "Load command type"),
    uint("cmdsize", 4, 4, "Load command size"),
    fname("segname", 8, "Segment name"),
    uint("vmaddr", 24, 8, "Virtual memory address"),
    uint("vmsize", 32, 8, "Virtual memory size"),
    uint("fileoff", 40, 8, "File offset"),
    uint("filesize", 48, 8, "Bytes mapped from the file"),
    uint("maxprot", 56, 4, "Maximum VM protection"),
    uint("initprot", 60, 4, "Initial VM protection"),
    uint("nsects", 64, 4, "Number of sections"),
    uint("flags", 68, 4, "Segment flags"),
];

const SECTION_32: &[FieldDef] = &[
    fname("sectname", 0, "Section name"),
    fname("segname", 16, "Owning segment name"),
    uint("addr", 32, 4, "Virtual memory address"),
    uint("size", 36, 4, "Size in bytes"),
    uint("offset", 40, 4, "File offset"),
    uint("align", 44, 4, "Alignment (power of two)"),
    uint("reloff", 48, 4, "Relocation entries offset"),
    uint("nreloc", 52, 4, "Number of relocation entries"),
    uint("flags", 56, 4, "Section type and attributes"),
    uint("reserved1", 60, 4, "Reserved (index or offset)"),
    uint("reserved2", 64, 4, "Reserved (count or sizeof)"),
];

const SECTION_64: &[FieldDef] = &[
    fname("sectname", 0, "Section name"),
    fname("segname", 16, "Owning segment name"),
    uint("addr", 32, 8, "Virtual memory address"),
    uint("size", 40, 8, "Size in bytes"),
    uint("offset", 48, 4, "File offset"),
    uint("align", 52, 4, "Alignment (power of two)"),
    uint("reloff", 56, 4, "Relocation entries offset"),
    uint("nreloc", 60, 4, "Number of relocation entries"),
    uint("flags", 64, 4, "Section type and attributes"),
    uint("reserved1", 68, 4, "Reserved (index or offset)"),
    uint("reserved2", 72, 4, "Reserved (count or sizeof)"),
    uint("reserved3", 76, 4, "Reserved"),
];

const SYMTAB: &[FieldDef] = &[
    uint("cmd", 0, 4, "Load command type"),
    uint("cmdsize", 4, 4, "Load command size"),
    uint("symoff", 8, 4, "Symbol table offset"),
    uint("nsyms", 12, 4, "Number of symbols"),
    uint("stroff", 16, 4, "String table offset"),
    uint("strsize", 20, 4, "String table size"),
];

const ENTRY_POINT: &[FieldDef] = &[
    uint("cmd", 0, 4, "Load command type"),
    uint("cmdsize", 4, 4, "Load command size"),
    uint("entryoff", 8, 8, "Entry point file offset"),
    uint("stacksize", 16, 8, "Initial stack size"),
];

const FAT_HEADER: &[FieldDef] = &[
    uint("fat_magic", 0, 4, "Fat magic number"),
    uint("nfat_arch", 4, 4, "Number of architectures"),
];

const FAT_ARCH_32: &[FieldDef] = &[
    uint("cputype", 0, 4, "CPU type"),
    uint("cpusubtype", 4, 4, "CPU subtype"),
    uint("offset", 8, 4, "Slice file offset"),
    uint("size", 12, 4, "Slice size"),
    uint("align", 16, 4, "Slice alignment (power of two)"),
];

const FAT_ARCH_64: &[FieldDef] = &[
    uint("cputype", 0, 4, "CPU type"),
    uint("cpusubtype", 4, 4, "CPU subtype"),
    uint("offset", 8, 8, "Slice file offset"),
    uint("size", 16, 8, "Slice size"),
    uint("align", 24, 4, "Slice alignment (power of two)"),
    uint("reserved", 28, 4, "Reserved"),
];

const NLIST_32: &[FieldDef] = &[
    uint("n_strx", 0, 4, "String table index"),
    uint("n_type", 4, 1, "Type flags"),
    uint("n_sect", 5, 1, "Section ordinal"),
    uint("n_desc", 6, 2, "Description"),
    uint("n_value", 8, 4, "Value"),
];

const NLIST_64: &[FieldDef] = &[
    uint("n_strx", 0, 4, "String table index"),
    uint("n_type", 4, 1, "Type flags"),
    uint("n_sect", 5, 1, "Section ordinal"),
    uint("n_desc", 6, 2, "Description"),
    uint("n_value", 8, 8, "Value"),
];

pub fn header_fields(bitness: Bitness) -> &'static [FieldDef] {
    match bitness {
        Bitness::Bits32 => HEADER_32,
        Bitness::Bits64 => HEADER_64,
    }
}

pub fn load_command_fields() -> &'static [FieldDef] {
    LOAD_COMMAND
}

pub fn segment_fields(bitness: Bitness) -> &'static [FieldDef] {
    match bitness {
        Bitness::Bits32 => SEGMENT_32,
        Bitness::Bits64 => SEGMENT_64,
    }
}

pub fn section_fields(bitness: Bitness) -> &'static [FieldDef] {
    match bitness {
        Bitness::Bits32 => SECTION_32,
        Bitness::Bits64 => SECTION_64,
    }
}

pub fn symtab_fields() -> &'static [FieldDef] {
    SYMTAB
}

pub fn entry_point_fields() -> &'static [FieldDef] {
    ENTRY_POINT
}

pub fn fat_header_fields() -> &'static [FieldDef] {
    FAT_HEADER
}

pub fn fat_arch_fields(is_64: bool) -> &'static [FieldDef] {
    if is_64 {
        FAT_ARCH_64
    } else {
        FAT_ARCH_32
    }
}

pub fn nlist_fields(bitness: Bitness) -> &'static [FieldDef] {
    match bitness {
        Bitness::Bits32 => NLIST_32,
        Bitness::Bits64 => NLIST_64,
    }
}

/// Field layout of a typed load command, falling back to the bare command header
pub fn command_fields(cmd: u32) -> &'static [FieldDef] {
    match cmd {
        LC_SEGMENT => SEGMENT_32,
        LC_SEGMENT_64 => SEGMENT_64,
        LC_SYMTAB => SYMTAB,
        LC_MAIN => ENTRY_POINT,
        _ => LOAD_COMMAND,
    }
}

/// Raw integer value of a field; None for names or when `bytes` is short
pub fn read_uint(def: &FieldDef, bytes: &[u8], endian: Endianness) -> Option<u64> {
    match (def.kind, def.width) {
        (FieldKind::Name, _) => None,
        (FieldKind::Magic, _) => bytes.read_u32(0, Endianness::Little).ok().map(u64::from),
        (_, 1) => bytes.first().map(|&b| u64::from(b)),
        (_, 2) => bytes.read_u16(0, endian).ok().map(u64::from),
        (_, 4) => bytes.read_u32(0, endian).ok().map(u64::from),
        (_, 8) => bytes.read_u64(0, endian).ok(),
        _ => None,
    }
}

/// Human-readable value of a field's bytes (`bytes` holds exactly the field)
pub fn decode(def: &FieldDef, bytes: &[u8], endian: Endianness) -> String {
    if def.kind == FieldKind::Name {
        return format!("\"{}\"", fixed_name(bytes));
    }
    let Some(value) = read_uint(def, bytes, endian) else {
        return format!("<{} of {} bytes>", bytes.len(), def.width);
    };
    match def.name {
        "cputype" => format!("{} ({:#x})", CpuType::from(value as u32).name(), value),
        "filetype" => format!("{} ({})", FileType::from(value as u32).name(), value),
        "cmd" => format!("{} ({:#x})", load_command_name(value as u32), value),
        "maxprot" | "initprot" => {
            format!("{} ({:#x})", VmProt::from_bits_truncate(value as u32).rwx(), value)
        }
        "magic" | "fat_magic" | "flags" => format!("{:#010x}", value),
        "ncmds" | "nsects" | "nsyms" | "nfat_arch" | "nreloc" | "align" => value.to_string(),
        _ => format!("{:#x}", value),
    }
}

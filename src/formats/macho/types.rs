//! Core Mach-O types and constants

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::io::ByteRange;

/// Header magics as read little-endian from the first four bytes
pub const MH_MAGIC: u32 = 0xfeedface;
pub const MH_CIGAM: u32 = 0xcefaedfe;
pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_CIGAM_64: u32 = 0xcffaedfe;

/// Fat magics as read big-endian
pub const FAT_MAGIC: u32 = 0xcafebabe;
pub const FAT_CIGAM: u32 = 0xbebafeca;
pub const FAT_MAGIC_64: u32 = 0xcafebabf;
pub const FAT_CIGAM_64: u32 = 0xbfbafeca;

/// Fixed record sizes
pub const HEADER_SIZE_32: usize = 28;
pub const HEADER_SIZE_64: usize = 32;
pub const FAT_HEADER_SIZE: usize = 8;
pub const FAT_ARCH_SIZE: usize = 20;
pub const FAT_ARCH_64_SIZE: usize = 32;
pub const LOAD_COMMAND_HEADER_SIZE: usize = 8;
pub const SEGMENT_COMMAND_SIZE_32: usize = 56;
pub const SEGMENT_COMMAND_SIZE_64: usize = 72;
pub const SECTION_SIZE_32: usize = 68;
pub const SECTION_SIZE_64: usize = 80;
pub const NLIST_SIZE_32: usize = 12;
pub const NLIST_SIZE_64: usize = 16;
pub const SYMTAB_COMMAND_SIZE: usize = 24;
pub const DYSYMTAB_COMMAND_SIZE: usize = 80;
pub const DYLIB_COMMAND_SIZE: usize = 24;
pub const ENTRY_POINT_COMMAND_SIZE: usize = 24;

/// CPU types
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
pub const CPU_ARCH_ABI64_32: u32 = 0x0200_0000;
pub const CPU_TYPE_X86: u32 = 7;
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
pub const CPU_TYPE_ARM: u32 = 12;
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
pub const CPU_TYPE_ARM64_32: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;
pub const CPU_TYPE_POWERPC: u32 = 18;
pub const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;
pub const CPU_SUBTYPE_MASK: u32 = 0xff00_0000;
pub const CPU_SUBTYPE_ARM64E: u32 = 2;

/// File types
pub const MH_OBJECT: u32 = 0x1;
pub const MH_EXECUTE: u32 = 0x2;
pub const MH_FVMLIB: u32 = 0x3;
pub const MH_CORE: u32 = 0x4;
pub const MH_PRELOAD: u32 = 0x5;
pub const MH_DYLIB: u32 = 0x6;
pub const MH_DYLINKER: u32 = 0x7;
pub const MH_BUNDLE: u32 = 0x8;
pub const MH_DYLIB_STUB: u32 = 0x9;
pub const MH_DSYM: u32 = 0xa;
pub const MH_KEXT_BUNDLE: u32 = 0xb;
pub const MH_FILESET: u32 = 0xc;

/// Load command types
pub const LC_REQ_DYLD: u32 = 0x8000_0000;
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_SYMSEG: u32 = 0x3;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_LOAD_DYLIB: u32 = 0xc;
pub const LC_ID_DYLIB: u32 = 0xd;
pub const LC_LOAD_DYLINKER: u32 = 0xe;
pub const LC_ID_DYLINKER: u32 = 0xf;
pub const LC_PREBOUND_DYLIB: u32 = 0x10;
pub const LC_ROUTINES: u32 = 0x11;
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
pub const LC_TWOLEVEL_HINTS: u32 = 0x16;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_ROUTINES_64: u32 = 0x1a;
pub const LC_UUID: u32 = 0x1b;
pub const LC_RPATH: u32 = 0x1c | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1e;
pub const LC_REEXPORT_DYLIB: u32 = 0x1f | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2a;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2b;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2c;
pub const LC_LINKER_OPTION: u32 = 0x2d;
pub const LC_VERSION_MIN_TVOS: u32 = 0x2f;
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
pub const LC_NOTE: u32 = 0x31;
pub const LC_BUILD_VERSION: u32 = 0x32;
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | LC_REQ_DYLD;

/// nlist n_type masks and values
pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;
pub const N_UNDF: u8 = 0x0;
pub const N_ABS: u8 = 0x2;
pub const N_SECT: u8 = 0xe;
pub const N_PBUD: u8 = 0xc;
pub const N_INDR: u8 = 0xa;
pub const NO_SECT: u8 = 0;

/// Indirect symbol table specials
pub const INDIRECT_SYMBOL_LOCAL: u32 = 0x8000_0000;
pub const INDIRECT_SYMBOL_ABS: u32 = 0x4000_0000;

/// Section type lives in the low byte of the flags
pub const SECTION_TYPE: u32 = 0x0000_00ff;
pub const S_ZEROFILL: u32 = 0x1;
pub const S_GB_ZEROFILL: u32 = 0xc;
pub const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;

bitflags! {
    /// VM protection bits of a segment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

impl VmProt {
    /// "rwx"-style rendering, `-` for missing bits
    pub fn rwx(&self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.contains(VmProt::READ) { 'r' } else { '-' });
        s.push(if self.contains(VmProt::WRITE) { 'w' } else { '-' });
        s.push(if self.contains(VmProt::EXECUTE) { 'x' } else { '-' });
        s
    }
}

bitflags! {
    /// mach_header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HeaderFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const WEAK_DEFINES = 0x8000;
        const BINDS_TO_WEAK = 0x10000;
        const ALLOW_STACK_EXECUTION = 0x20000;
        const PIE = 0x200000;
        const HAS_TLV_DESCRIPTORS = 0x800000;
        const NO_HEAP_EXECUTION = 0x1000000;
        const APP_EXTENSION_SAFE = 0x2000000;
        const _ = !0;
    }
}

/// Byte order of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub fn is_little_endian(&self) -> bool {
        matches!(self, Endianness::Little)
    }
}

/// Header bit-width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bitness {
    Bits32,
    Bits64,
}

impl Bitness {
    pub fn bits(&self) -> u8 {
        match self {
            Bitness::Bits32 => 32,
            Bitness::Bits64 => 64,
        }
    }

    pub fn header_size(&self) -> usize {
        match self {
            Bitness::Bits32 => HEADER_SIZE_32,
            Bitness::Bits64 => HEADER_SIZE_64,
        }
    }

    pub fn segment_command_size(&self) -> usize {
        match self {
            Bitness::Bits32 => SEGMENT_COMMAND_SIZE_32,
            Bitness::Bits64 => SEGMENT_COMMAND_SIZE_64,
        }
    }

    pub fn section_size(&self) -> usize {
        match self {
            Bitness::Bits32 => SECTION_SIZE_32,
            Bitness::Bits64 => SECTION_SIZE_64,
        }
    }

    pub fn nlist_size(&self) -> usize {
        match self {
            Bitness::Bits32 => NLIST_SIZE_32,
            Bitness::Bits64 => NLIST_SIZE_64,
        }
    }

    /// Width of address-sized fields (vmaddr, section addr/size, n_value)
    pub fn word_size(&self) -> usize {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }
}

/// CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuType {
    X86,
    X86_64,
    Arm,
    Arm64,
    Arm64_32,
    PowerPC,
    PowerPC64,
    Other(u32),
}

impl From<u32> for CpuType {
    fn from(val: u32) -> Self {
        match val {
            CPU_TYPE_X86 => CpuType::X86,
            CPU_TYPE_X86_64 => CpuType::X86_64,
            CPU_TYPE_ARM => CpuType::Arm,
            CPU_TYPE_ARM64 => CpuType::Arm64,
            CPU_TYPE_ARM64_32 => CpuType::Arm64_32,
            CPU_TYPE_POWERPC => CpuType::PowerPC,
            CPU_TYPE_POWERPC64 => CpuType::PowerPC64,
            other => CpuType::Other(other),
        }
    }
}

impl CpuType {
    pub fn name(&self) -> String {
        match self {
            CpuType::X86 => "x86".to_string(),
            CpuType::X86_64 => "x86_64".to_string(),
            CpuType::Arm => "ARM".to_string(),
            CpuType::Arm64 => "ARM64".to_string(),
            CpuType::Arm64_32 => "ARM64_32".to_string(),
            CpuType::PowerPC => "PowerPC".to_string(),
            CpuType::PowerPC64 => "PowerPC64".to_string(),
            CpuType::Other(v) => format!("Unknown ({})", v),
        }
    }
}

impl fmt::Display for CpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Mach-O file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Object,
    Execute,
    FvmLib,
    Core,
    Preload,
    Dylib,
    Dylinker,
    Bundle,
    DylibStub,
    Dsym,
    KextBundle,
    Fileset,
    Other(u32),
}

impl From<u32> for FileType {
    fn from(val: u32) -> Self {
        match val {
            MH_OBJECT => FileType::Object,
            MH_EXECUTE => FileType::Execute,
            MH_FVMLIB => FileType::FvmLib,
            MH_CORE => FileType::Core,
            MH_PRELOAD => FileType::Preload,
            MH_DYLIB => FileType::Dylib,
            MH_DYLINKER => FileType::Dylinker,
            MH_BUNDLE => FileType::Bundle,
            MH_DYLIB_STUB => FileType::DylibStub,
            MH_DSYM => FileType::Dsym,
            MH_KEXT_BUNDLE => FileType::KextBundle,
            MH_FILESET => FileType::Fileset,
            other => FileType::Other(other),
        }
    }
}

impl FileType {
    pub fn name(&self) -> String {
        match self {
            FileType::Object => "Object file".to_string(),
            FileType::Execute => "Executable".to_string(),
            FileType::FvmLib => "Fixed VM library".to_string(),
            FileType::Core => "Core dump".to_string(),
            FileType::Preload => "Preloaded executable".to_string(),
            FileType::Dylib => "Dynamic library".to_string(),
            FileType::Dylinker => "Dynamic linker".to_string(),
            FileType::Bundle => "Bundle".to_string(),
            FileType::DylibStub => "Dynamic library stub".to_string(),
            FileType::Dsym => "Debug symbols".to_string(),
            FileType::KextBundle => "Kernel extension".to_string(),
            FileType::Fileset => "File set".to_string(),
            FileType::Other(v) => format!("Unknown ({})", v),
        }
    }
}

/// Display name of a raw cputype value
pub fn cpu_type_name(cpu_type: u32) -> String {
    CpuType::from(cpu_type).name()
}

/// Display name of a raw filetype value
pub fn file_type_name(file_type: u32) -> String {
    FileType::from(file_type).name()
}

/// Name of a load command type, `LC_<n>` style
pub fn load_command_name(cmd: u32) -> String {
    let name = match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_SYMSEG => "LC_SYMSEG",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_PREBOUND_DYLIB => "LC_PREBOUND_DYLIB",
        LC_ROUTINES => "LC_ROUTINES",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK",
        LC_TWOLEVEL_HINTS => "LC_TWOLEVEL_HINTS",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_ROUTINES_64 => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        LC_LINKER_OPTION => "LC_LINKER_OPTION",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
        LC_NOTE => "LC_NOTE",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        other => return format!("LC_UNKNOWN({:#x})", other),
    };
    name.to_string()
}

/// Name of a section type (low 8 bits of section flags)
pub fn section_type_name(flags: u32) -> String {
    let name = match flags & SECTION_TYPE {
        0x0 => "Regular",
        0x1 => "ZeroFill",
        0x2 => "CStringLiterals",
        0x3 => "4ByteLiterals",
        0x4 => "8ByteLiterals",
        0x5 => "LiteralPointers",
        0x6 => "NonLazySymbolPointers",
        0x7 => "LazySymbolPointers",
        0x8 => "SymbolStubs",
        0x9 => "ModInitFuncs",
        0xa => "ModTermFuncs",
        0xb => "Coalesced",
        0xc => "GBZeroFill",
        0xd => "Interposing",
        0xe => "16ByteLiterals",
        0xf => "DtraceDOF",
        0x10 => "LazyDylibSymbolPointers",
        0x11 => "ThreadLocalRegular",
        0x12 => "ThreadLocalZerofill",
        0x13 => "ThreadLocalVariables",
        0x14 => "ThreadLocalVariablePointers",
        0x15 => "ThreadLocalInitFunctionPointers",
        other => return format!("Unknown ({:x})", other),
    };
    name.to_string()
}

/// Category of a recorded parse problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Fat table or header could not be read in full
    MalformedHeader,
    /// Load command whose size breaks the command table
    TruncatedCommand,
    /// Typed command payload shorter than its fixed layout
    MalformedCommand,
    /// Command count or total size disagrees with the header
    CommandTableMismatch,
    /// Offset/size pointing outside the container or slice
    OutOfBounds,
    /// Address outside the owning segment, or inconsistent index ranges
    InvalidRange,
    /// Fat descriptors sharing bytes
    Overlap,
    /// String without terminator or with out-of-range index
    BadString,
    /// A configured cap stopped iteration early
    LimitReached,
}

impl WarningKind {
    /// Warnings that mean the structure itself failed to parse
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            WarningKind::MalformedHeader
                | WarningKind::TruncatedCommand
                | WarningKind::MalformedCommand
                | WarningKind::CommandTableMismatch
        )
    }

    /// Structural faults plus broken offset/size or address invariants
    pub fn breaks_layout(&self) -> bool {
        self.is_structural() || matches!(self, WarningKind::OutOfBounds | WarningKind::InvalidRange)
    }
}

/// A parse problem recorded against an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    /// Offset the problem was found at, relative to the slice (or container for fat records)
    pub offset: u64,
    pub kind: WarningKind,
    pub message: String,
}

impl ParseWarning {
    pub fn new(offset: u64, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            offset,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {:#x}: {}", self.kind, self.offset, self.message)
    }
}

/// One architecture's byte range as described by the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDescriptor {
    pub index: usize,
    pub range: ByteRange,
    /// From the fat descriptor; None for thin binaries
    pub cpu_type: Option<u32>,
    pub cpu_subtype: Option<u32>,
    /// Power of two exponent from the fat descriptor
    pub align: Option<u32>,
    pub in_fat: bool,
}

/// A parsed architecture slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySlice {
    pub index: usize,
    pub arch: CpuType,
    pub range: ByteRange,
    pub bitness: Bitness,
    pub endianness: Endianness,
    pub in_fat: bool,
    pub align: Option<u32>,
}

/// Fixed Mach-O header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// First four bytes read little-endian; one of the four `MH_*` magics
    pub magic: u32,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub file_type: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    /// Present only in 64-bit headers
    pub reserved: Option<u32>,
    pub bitness: Bitness,
    pub endianness: Endianness,
}

impl Header {
    pub fn size(&self) -> usize {
        self.bitness.header_size()
    }

    pub fn is_64_bit(&self) -> bool {
        self.bitness == Bitness::Bits64
    }

    pub fn cpu(&self) -> CpuType {
        CpuType::from(self.cpu_type)
    }

    pub fn kind(&self) -> FileType {
        FileType::from(self.file_type)
    }

    pub fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags)
    }

    pub fn is_pie(&self) -> bool {
        self.header_flags().contains(HeaderFlags::PIE)
    }
}

/// Fixed fields of LC_SEGMENT / LC_SEGMENT_64, widened to 64 bits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCommand {
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

/// LC_SYMTAB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

/// LC_DYSYMTAB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DysymtabCommand {
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

/// How a dylib command links its library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DylibKind {
    Load,
    Weak,
    Reexport,
    Lazy,
    Upward,
    /// LC_ID_DYLIB: the library's own install name
    Id,
}

/// Dylib load / id commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DylibCommand {
    pub kind: DylibKind,
    pub name: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
}

impl DylibCommand {
    /// `X.Y.Z` rendering of a packed version
    pub fn version_string(version: u32) -> String {
        format!(
            "{}.{}.{}",
            version >> 16,
            (version >> 8) & 0xff,
            version & 0xff
        )
    }
}

/// LC_MAIN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointCommand {
    pub entryoff: u64,
    pub stacksize: u64,
}

/// Typed payload view of a load command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandView {
    Segment(SegmentCommand),
    Symtab(SymtabCommand),
    Dysymtab(DysymtabCommand),
    Dylib(DylibCommand),
    EntryPoint(EntryPointCommand),
    /// Unrecognized or unreadable; the raw payload is still kept
    Opaque,
}

/// One entry of the load-command table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCommand {
    pub index: usize,
    pub cmd: u32,
    pub cmdsize: u32,
    /// Offset from the start of the slice
    pub offset: u64,
    /// Raw command bytes, header included (possibly cut short when truncated)
    pub payload: Vec<u8>,
    pub view: CommandView,
    /// Set when this command broke the table and iteration stopped here
    pub truncated: bool,
    pub warnings: Vec<ParseWarning>,
}

impl LoadCommand {
    pub fn name(&self) -> String {
        load_command_name(self.cmd)
    }

    pub fn requires_dyld(&self) -> bool {
        self.cmd & LC_REQ_DYLD != 0
    }
}

/// A section record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Position within the owning segment
    pub index: usize,
    /// 1-based ordinal across the slice, as used by nlist n_sect
    pub ordinal: u32,
    /// Offset of the section record from the start of the slice
    pub record_offset: u64,
    pub name: String,
    pub segment_name: String,
    pub addr: u64,
    pub size: u64,
    /// File offset relative to the slice
    pub offset: u32,
    /// Power of two exponent
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    /// 64-bit records only
    pub reserved3: Option<u32>,
    pub warnings: Vec<ParseWarning>,
}

impl Section {
    pub fn section_type(&self) -> u32 {
        self.flags & SECTION_TYPE
    }

    pub fn type_name(&self) -> String {
        section_type_name(self.flags)
    }

    /// Zero-fill sections occupy no file bytes
    pub fn is_zerofill(&self) -> bool {
        matches!(
            self.section_type(),
            S_ZEROFILL | S_GB_ZEROFILL | S_THREAD_LOCAL_ZEROFILL
        )
    }

    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.addr.saturating_add(self.size)
    }

    pub fn alignment_bytes(&self) -> u64 {
        1u64.checked_shl(self.align).unwrap_or(0)
    }
}

/// A segment and its sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position among the slice's segments
    pub index: usize,
    /// Index of the LC_SEGMENT(_64) command
    pub command_index: usize,
    /// Offset of that command from the start of the slice
    pub command_offset: u64,
    pub name: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
    /// "rwx" renderings computed at parse time
    pub max_protection: String,
    pub init_protection: String,
    pub sections: Vec<Section>,
    pub warnings: Vec<ParseWarning>,
}

impl Segment {
    pub fn contains_vm_range(&self, addr: u64, size: u64) -> bool {
        let seg_end = self.vmaddr.saturating_add(self.vmsize);
        addr >= self.vmaddr && addr.saturating_add(size) <= seg_end
    }
}

/// Symbol classification from the n_type bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Undefined,
    Absolute,
    Section,
    Prebound,
    Indirect,
    Debug,
    Unknown(u8),
}

/// An nlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub index: usize,
    pub name: String,
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub value: u64,
    pub kind: SymbolKind,
    pub is_external: bool,
    pub is_private_external: bool,
    pub is_debug: bool,
    pub is_defined: bool,
    pub is_local: bool,
    /// 1-based section ordinal for N_SECT symbols
    pub section: Option<u8>,
}

/// Parsed LC_SYMTAB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    pub command: SymtabCommand,
    pub symbols: Vec<Symbol>,
    pub warnings: Vec<ParseWarning>,
}

impl SymbolTable {
    pub fn by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn defined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_defined)
    }

    pub fn undefined(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|s| !s.is_defined && !s.is_debug)
    }
}

/// `[start, start + count)` over the symbol array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: u32,
    pub count: u32,
}

impl IndexRange {
    pub fn end(&self) -> u64 {
        self.start as u64 + self.count as u64
    }

    pub fn overlaps(&self, other: &IndexRange) -> bool {
        self.count > 0
            && other.count > 0
            && (self.start as u64) < other.end()
            && (other.start as u64) < self.end()
    }
}

/// Parsed LC_DYSYMTAB partitioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DySymTabInfo {
    pub command: DysymtabCommand,
    pub local: IndexRange,
    pub external_defined: IndexRange,
    pub undefined: IndexRange,
    /// Entries of the indirect symbol table (symbol indices or INDIRECT_SYMBOL_* markers)
    pub indirect: Vec<u32>,
    pub warnings: Vec<ParseWarning>,
}

/// Fat or thin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    Thin,
    Fat {
        /// Big-endian read of the first four bytes
        magic: u32,
        is_64: bool,
        nfat_arch: u32,
    },
}

/// A fat arch descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatArch {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
    /// fat_arch_64 only
    pub reserved: Option<u32>,
}

//! Disassembly boundary.
//!
//! Instruction decoding is delegated to a backend behind the `Disassembler`
//! trait; this module only maps Mach-O CPU types to architectures and
//! gathers the bytes of a section for decoding.

#[cfg(feature = "disasm-capstone")]
pub mod capstone;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MachoError, Result};
use crate::formats::macho::{
    MachoSlice, Section, CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_ARM64_32, CPU_TYPE_POWERPC,
    CPU_TYPE_POWERPC64, CPU_TYPE_X86, CPU_TYPE_X86_64,
};

/// Errors that can occur during disassembly operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisassemblerError {
    /// Bytes that do not decode
    InvalidInstruction,
    /// Backend cannot handle the architecture
    UnsupportedArchitecture(Architecture),
    /// Backend failure with message
    InternalError(String),
}

impl fmt::Display for DisassemblerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisassemblerError::InvalidInstruction => write!(f, "InvalidInstruction"),
            DisassemblerError::UnsupportedArchitecture(arch) => {
                write!(f, "UnsupportedArchitecture: {}", arch)
            }
            DisassemblerError::InternalError(msg) => write!(f, "InternalError: {}", msg),
        }
    }
}

impl std::error::Error for DisassemblerError {}

impl From<DisassemblerError> for MachoError {
    fn from(err: DisassemblerError) -> Self {
        match err {
            DisassemblerError::UnsupportedArchitecture(arch) => {
                MachoError::UnsupportedArchitecture(arch.to_string())
            }
            other => MachoError::Internal(other.to_string()),
        }
    }
}

pub type DisassemblerResult<T> = std::result::Result<T, DisassemblerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    X86,
    X86_64,
    ARM,
    ARM64,
    PPC,
    PPC64,
    Unknown,
}

impl Architecture {
    /// Map a Mach-O CPU type; the subtype does not change the instruction set here.
    pub fn from_cpu(cpu_type: u32, _cpu_subtype: u32) -> Self {
        match cpu_type {
            CPU_TYPE_X86 => Architecture::X86,
            CPU_TYPE_X86_64 => Architecture::X86_64,
            CPU_TYPE_ARM => Architecture::ARM,
            // arm64_32 runs the AArch64 instruction set with 32-bit pointers
            CPU_TYPE_ARM64 | CPU_TYPE_ARM64_32 => Architecture::ARM64,
            CPU_TYPE_POWERPC => Architecture::PPC,
            CPU_TYPE_POWERPC64 => Architecture::PPC64,
            _ => Architecture::Unknown,
        }
    }

    pub fn address_bits(&self) -> u8 {
        match self {
            Architecture::X86 | Architecture::ARM | Architecture::PPC => 32,
            Architecture::X86_64 | Architecture::ARM64 | Architecture::PPC64 => 64,
            Architecture::Unknown => 0,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
            Architecture::ARM => "arm",
            Architecture::ARM64 => "arm64",
            Architecture::PPC => "ppc",
            Architecture::PPC64 => "ppc64",
            Architecture::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisassembledInstruction {
    pub address: u64,
    pub mnemonic: String,
    pub operands: String,
    pub raw_bytes: Vec<u8>,
}

/// Decodes a run of bytes starting at a virtual address
pub trait Disassembler {
    fn disassemble(
        &self,
        bytes: &[u8],
        start_address: u64,
        architecture: Architecture,
    ) -> DisassemblerResult<Vec<DisassembledInstruction>>;

    fn name(&self) -> &str;
}

/// Bytes plus the context a backend needs to decode them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassemblyRequest {
    pub bytes: Vec<u8>,
    pub start_address: u64,
    pub architecture: Architecture,
}

impl DisassemblyRequest {
    pub fn run(&self, backend: &dyn Disassembler) -> DisassemblerResult<Vec<DisassembledInstruction>> {
        backend.disassemble(&self.bytes, self.start_address, self.architecture)
    }
}

/// Assemble the request for one section of `slice`. `data` is the whole container.
///
/// Zero-fill sections yield an empty request; `max_bytes` caps the read.
pub fn section_request(
    data: &[u8],
    slice: &MachoSlice,
    section: &Section,
    max_bytes: u64,
) -> Result<DisassemblyRequest> {
    let architecture = Architecture::from_cpu(slice.header.cpu_type, slice.header.cpu_subtype);
    if architecture == Architecture::Unknown {
        return Err(MachoError::UnsupportedArchitecture(slice.header.cpu().name()));
    }
    let bytes = match slice.section_file_range(section) {
        None => Vec::new(),
        Some(range) => {
            if !range.fits_within(data.len() as u64) {
                return Err(MachoError::OutOfBoundsOffset {
                    offset: range.offset,
                    len: range.len,
                    size: data.len() as u64,
                });
            }
            let end = range.offset + range.len.min(max_bytes);
            data[range.offset as usize..end as usize].to_vec()
        }
    };
    Ok(DisassemblyRequest {
        bytes,
        start_address: section.addr,
        architecture,
    })
}

use capstone::{Arch, Capstone, Endian, Mode, NO_EXTRA_MODE};
use tracing::debug;

use super::{Architecture, DisassembledInstruction, Disassembler, DisassemblerError, DisassemblerResult};

/// Capstone-backed decoder. A fresh engine is built per call, keyed by architecture.
#[derive(Debug, Clone)]
pub struct CapstoneDisassembler {
    /// Upper bound on instructions decoded per call
    pub max_instructions: usize,
}

impl Default for CapstoneDisassembler {
    fn default() -> Self {
        Self {
            max_instructions: 100_000,
        }
    }
}

fn cs_arch_mode(arch: Architecture) -> Option<(Arch, Mode, Option<Endian>)> {
    match arch {
        Architecture::X86 => Some((Arch::X86, Mode::Mode32, None)),
        Architecture::X86_64 => Some((Arch::X86, Mode::Mode64, None)),
        Architecture::ARM => Some((Arch::ARM, Mode::Arm, Some(Endian::Little))),
        Architecture::ARM64 => Some((Arch::ARM64, Mode::Arm, Some(Endian::Little))),
        // Mach-O PowerPC slices are big-endian
        Architecture::PPC => Some((Arch::PPC, Mode::Mode32, Some(Endian::Big))),
        Architecture::PPC64 => Some((Arch::PPC, Mode::Mode64, Some(Endian::Big))),
        Architecture::Unknown => None,
    }
}

impl CapstoneDisassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(arch: Architecture) -> bool {
        cs_arch_mode(arch).is_some()
    }

    fn engine(arch: Architecture) -> DisassemblerResult<Capstone> {
        let (a, m, endian) =
            cs_arch_mode(arch).ok_or(DisassemblerError::UnsupportedArchitecture(arch))?;
        Capstone::new_raw(a, m, NO_EXTRA_MODE, endian)
            .map_err(|e| DisassemblerError::InternalError(e.to_string()))
    }
}

impl Disassembler for CapstoneDisassembler {
    fn disassemble(
        &self,
        bytes: &[u8],
        start_address: u64,
        architecture: Architecture,
    ) -> DisassemblerResult<Vec<DisassembledInstruction>> {
        let cs = Self::engine(architecture)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        let insns = cs
            .disasm_count(bytes, start_address, self.max_instructions)
            .map_err(|_| DisassemblerError::InvalidInstruction)?;
        if insns.is_empty() {
            return Err(DisassemblerError::InvalidInstruction);
        }
        let out: Vec<_> = insns
            .iter()
            .map(|insn| DisassembledInstruction {
                address: insn.address(),
                mnemonic: insn.mnemonic().unwrap_or("").to_string(),
                operands: insn.op_str().unwrap_or("").to_string(),
                raw_bytes: insn.bytes().to_vec(),
            })
            .collect();
        debug!(arch = %architecture, start_address, count = out.len(), "Disassembled");
        Ok(out)
    }

    fn name(&self) -> &str {
        "capstone"
    }
}

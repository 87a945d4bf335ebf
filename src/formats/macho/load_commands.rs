//! Load command table iteration and typed payload views

use crate::config::ParserConfig;
use crate::error::Result;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{fixed_name, read_cstring, read_word, EndianRead};
use crate::timeout::{CancellationToken, ScanGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Load commands of one slice, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCommandTable {
    pub commands: Vec<LoadCommand>,
    /// Table-level problems (count or size disagreeing with the header)
    pub warnings: Vec<ParseWarning>,
    /// False when iteration stopped before `ncmds` commands were read
    pub complete: bool,
}

impl LoadCommandTable {
    /// Walk `ncmds` commands starting right after the fixed header.
    ///
    /// Only cancellation is an error; everything else is recorded on the
    /// table or on the offending command.
    pub fn parse(
        data: &[u8],
        header: &Header,
        config: &ParserConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let endian = header.endianness;
        let start = header.size();
        let table_end = start.saturating_add(header.sizeofcmds as usize);
        let limit = table_end.min(data.len());

        let mut guard = ScanGuard::new(cancel, config.scan_chunk);
        let mut commands = Vec::new();
        let mut warnings = Vec::new();
        let mut complete = true;

        let mut ncmds = header.ncmds;
        if ncmds > config.max_load_commands {
            warnings.push(ParseWarning::new(
                16,
                WarningKind::LimitReached,
                format!(
                    "ncmds {} exceeds limit {}",
                    header.ncmds, config.max_load_commands
                ),
            ));
            ncmds = config.max_load_commands;
            complete = false;
        }

        if table_end > data.len() {
            warnings.push(ParseWarning::new(
                20,
                WarningKind::OutOfBounds,
                format!(
                    "sizeofcmds {:#x} runs past the {}-byte slice",
                    header.sizeofcmds,
                    data.len()
                ),
            ));
        }

        let mut offset = start;
        for index in 0..ncmds as usize {
            guard.tick()?;

            if offset + LOAD_COMMAND_HEADER_SIZE > limit {
                let available = limit.saturating_sub(offset);
                warn!(index, offset, "Load command header truncated");
                commands.push(LoadCommand {
                    index,
                    cmd: data.read_u32(offset, endian).unwrap_or(0),
                    cmdsize: 0,
                    offset: offset as u64,
                    payload: data.get(offset..offset + available).unwrap_or(&[]).to_vec(),
                    view: CommandView::Opaque,
                    truncated: true,
                    warnings: vec![ParseWarning::new(
                        offset as u64,
                        WarningKind::TruncatedCommand,
                        format!(
                            "only {} bytes left for a load command header",
                            available
                        ),
                    )],
                });
                complete = false;
                break;
            }

            let cmd = data.read_u32(offset, endian)?;
            let cmdsize = data.read_u32(offset + 4, endian)?;
            let size = cmdsize as usize;

            if size < LOAD_COMMAND_HEADER_SIZE || offset.saturating_add(size) > limit {
                let end = offset.saturating_add(size.max(LOAD_COMMAND_HEADER_SIZE)).min(limit);
                let reason = if size < LOAD_COMMAND_HEADER_SIZE {
                    format!("cmdsize {} below the minimum of 8", cmdsize)
                } else {
                    format!(
                        "cmdsize {:#x} runs past the command table end {:#x}",
                        cmdsize, limit
                    )
                };
                warn!(index, offset, cmd, cmdsize, "Truncated load command");
                commands.push(LoadCommand {
                    index,
                    cmd,
                    cmdsize,
                    offset: offset as u64,
                    payload: data[offset..end].to_vec(),
                    view: CommandView::Opaque,
                    truncated: true,
                    warnings: vec![ParseWarning::new(
                        offset as u64,
                        WarningKind::TruncatedCommand,
                        reason,
                    )],
                });
                complete = false;
                break;
            }

            let payload = &data[offset..offset + size];
            let mut cmd_warnings = Vec::new();
            let view = match decode_view(payload, cmd, header) {
                Ok(view) => view,
                Err(message) => {
                    cmd_warnings.push(ParseWarning::new(
                        offset as u64,
                        WarningKind::MalformedCommand,
                        message,
                    ));
                    CommandView::Opaque
                }
            };

            commands.push(LoadCommand {
                index,
                cmd,
                cmdsize,
                offset: offset as u64,
                payload: payload.to_vec(),
                view,
                truncated: false,
                warnings: cmd_warnings,
            });
            offset += size;
        }

        if complete {
            let total: u64 = commands.iter().map(|c| u64::from(c.cmdsize)).sum();
            if total != u64::from(header.sizeofcmds) {
                warnings.push(ParseWarning::new(
                    20,
                    WarningKind::CommandTableMismatch,
                    format!(
                        "load commands total {:#x} bytes but sizeofcmds is {:#x}",
                        total, header.sizeofcmds
                    ),
                ));
            }
        }

        debug!(
            ncmds = header.ncmds,
            parsed = commands.len(),
            complete,
            "Parsed load commands"
        );

        Ok(Self {
            commands,
            warnings,
            complete,
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn by_index(&self, index: usize) -> Option<&LoadCommand> {
        self.commands.get(index)
    }

    /// First command of the given type
    pub fn find(&self, cmd: u32) -> Option<&LoadCommand> {
        self.commands.iter().find(|c| c.cmd == cmd)
    }

    pub fn symtab(&self) -> Option<&SymtabCommand> {
        self.commands.iter().find_map(|c| match &c.view {
            CommandView::Symtab(s) => Some(s),
            _ => None,
        })
    }

    pub fn dysymtab(&self) -> Option<&DysymtabCommand> {
        self.commands.iter().find_map(|c| match &c.view {
            CommandView::Dysymtab(d) => Some(d),
            _ => None,
        })
    }

    pub fn entry_point(&self) -> Option<&EntryPointCommand> {
        self.commands.iter().find_map(|c| match &c.view {
            CommandView::EntryPoint(e) => Some(e),
            _ => None,
        })
    }

    /// Dylib commands paired with their command index
    pub fn dylibs(&self) -> impl Iterator<Item = (usize, &DylibCommand)> {
        self.commands.iter().filter_map(|c| match &c.view {
            CommandView::Dylib(d) => Some((c.index, d)),
            _ => None,
        })
    }

    /// Count of structural warnings on the table and its commands
    pub fn structural_faults(&self) -> usize {
        self.warnings.iter().filter(|w| w.kind.is_structural()).count()
            + self
                .commands
                .iter()
                .flat_map(|c| c.warnings.iter())
                .filter(|w| w.kind.is_structural())
                .count()
    }
}

fn require(payload: &[u8], needed: usize, what: &str) -> std::result::Result<(), String> {
    if payload.len() < needed {
        Err(format!(
            "{} needs {} bytes but cmdsize is {}",
            what,
            needed,
            payload.len()
        ))
    } else {
        Ok(())
    }
}

/// Decode the typed view of a complete command. Err carries a warning message.
fn decode_view(payload: &[u8], cmd: u32, header: &Header) -> std::result::Result<CommandView, String> {
    let endian = header.endianness;
    let rd = |off: usize| payload.read_u32(off, endian).map_err(|e| e.to_string());

    match cmd {
        LC_SEGMENT | LC_SEGMENT_64 => {
            let bitness = if cmd == LC_SEGMENT_64 {
                Bitness::Bits64
            } else {
                Bitness::Bits32
            };
            require(payload, bitness.segment_command_size(), &load_command_name(cmd))?;
            let w = bitness.word_size();
            let word = |off: usize| read_word(payload, off, bitness, endian).map_err(|e| e.to_string());
            let base = 24;
            Ok(CommandView::Segment(SegmentCommand {
                segname: fixed_name(&payload[8..24]),
                vmaddr: word(base)?,
                vmsize: word(base + w)?,
                fileoff: word(base + 2 * w)?,
                filesize: word(base + 3 * w)?,
                maxprot: rd(base + 4 * w)?,
                initprot: rd(base + 4 * w + 4)?,
                nsects: rd(base + 4 * w + 8)?,
                flags: rd(base + 4 * w + 12)?,
            }))
        }
        LC_SYMTAB => {
            require(payload, SYMTAB_COMMAND_SIZE, "LC_SYMTAB")?;
            Ok(CommandView::Symtab(SymtabCommand {
                symoff: rd(8)?,
                nsyms: rd(12)?,
                stroff: rd(16)?,
                strsize: rd(20)?,
            }))
        }
        LC_DYSYMTAB => {
            require(payload, DYSYMTAB_COMMAND_SIZE, "LC_DYSYMTAB")?;
            Ok(CommandView::Dysymtab(DysymtabCommand {
                ilocalsym: rd(8)?,
                nlocalsym: rd(12)?,
                iextdefsym: rd(16)?,
                nextdefsym: rd(20)?,
                iundefsym: rd(24)?,
                nundefsym: rd(28)?,
                tocoff: rd(32)?,
                ntoc: rd(36)?,
                modtaboff: rd(40)?,
                nmodtab: rd(44)?,
                extrefsymoff: rd(48)?,
                nextrefsyms: rd(52)?,
                indirectsymoff: rd(56)?,
                nindirectsyms: rd(60)?,
                extreloff: rd(64)?,
                nextrel: rd(68)?,
                locreloff: rd(72)?,
                nlocrel: rd(76)?,
            }))
        }
        LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB | LC_LAZY_LOAD_DYLIB
        | LC_LOAD_UPWARD_DYLIB | LC_ID_DYLIB => {
            require(payload, DYLIB_COMMAND_SIZE, &load_command_name(cmd))?;
            let kind = match cmd {
                LC_LOAD_WEAK_DYLIB => DylibKind::Weak,
                LC_REEXPORT_DYLIB => DylibKind::Reexport,
                LC_LAZY_LOAD_DYLIB => DylibKind::Lazy,
                LC_LOAD_UPWARD_DYLIB => DylibKind::Upward,
                LC_ID_DYLIB => DylibKind::Id,
                _ => DylibKind::Load,
            };
            let name_offset = rd(8)? as usize;
            if name_offset < DYLIB_COMMAND_SIZE || name_offset >= payload.len() {
                return Err(format!(
                    "dylib name offset {} outside the {}-byte command",
                    name_offset,
                    payload.len()
                ));
            }
            let (name, _) = read_cstring(payload, name_offset).map_err(|e| e.to_string())?;
            Ok(CommandView::Dylib(DylibCommand {
                kind,
                name,
                timestamp: rd(12)?,
                current_version: rd(16)?,
                compatibility_version: rd(20)?,
            }))
        }
        LC_MAIN => {
            require(payload, ENTRY_POINT_COMMAND_SIZE, "LC_MAIN")?;
            Ok(CommandView::EntryPoint(EntryPointCommand {
                entryoff: payload.read_u64(8, endian).map_err(|e| e.to_string())?,
                stacksize: payload.read_u64(16, endian).map_err(|e| e.to_string())?,
            }))
        }
        _ => Ok(CommandView::Opaque),
    }
}

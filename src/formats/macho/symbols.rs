//! Symbol table (LC_SYMTAB) and dynamic symbol partitioning (LC_DYSYMTAB)

use crate::config::ParserConfig;
use crate::error::Result;
use crate::formats::macho::types::*;
use crate::formats::macho::utils::{read_word, EndianRead};
use crate::io::ByteRange;
use crate::timeout::{CancellationToken, ScanGuard};
use tracing::debug;

/// Classify an n_type byte
pub fn classify(n_type: u8) -> SymbolKind {
    if n_type & N_STAB != 0 {
        return SymbolKind::Debug;
    }
    match n_type & N_TYPE {
        N_UNDF => SymbolKind::Undefined,
        N_ABS => SymbolKind::Absolute,
        N_SECT => SymbolKind::Section,
        N_PBUD => SymbolKind::Prebound,
        N_INDR => SymbolKind::Indirect,
        other => SymbolKind::Unknown(other),
    }
}

impl SymbolTable {
    /// Read `nsyms` nlist records and resolve their names.
    ///
    /// Ranges that run past the slice are clamped and recorded as warnings.
    pub fn parse(
        data: &[u8],
        header: &Header,
        command: &SymtabCommand,
        config: &ParserConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let endian = header.endianness;
        let bitness = header.bitness;
        let entry_size = bitness.nlist_size();
        let size = data.len() as u64;
        let mut warnings = Vec::new();

        let str_range = ByteRange::new(u64::from(command.stroff), u64::from(command.strsize));
        let strtab: &[u8] = if str_range.fits_within(size) {
            &data[str_range.offset as usize..str_range.end() as usize]
        } else {
            warnings.push(ParseWarning::new(
                u64::from(command.stroff),
                WarningKind::OutOfBounds,
                format!(
                    "string table {:#x}+{:#x} exceeds the {}-byte slice",
                    command.stroff, command.strsize, size
                ),
            ));
            let start = (command.stroff as usize).min(data.len());
            &data[start..]
        };

        let mut count = command.nsyms as u64;
        let available = size.saturating_sub(u64::from(command.symoff)) / entry_size as u64;
        if count > available {
            warnings.push(ParseWarning::new(
                u64::from(command.symoff),
                WarningKind::OutOfBounds,
                format!(
                    "{} symbols at {:#x} exceed the slice; reading {}",
                    command.nsyms, command.symoff, available
                ),
            ));
            count = available;
        }
        if count > u64::from(config.max_symbols) {
            warnings.push(ParseWarning::new(
                u64::from(command.symoff),
                WarningKind::LimitReached,
                format!("nsyms {} exceeds limit {}", command.nsyms, config.max_symbols),
            ));
            count = u64::from(config.max_symbols);
        }

        let mut guard = ScanGuard::new(cancel, config.scan_chunk);
        let mut symbols = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            guard.tick()?;
            let at = command.symoff as usize + index * entry_size;
            let n_strx = data.read_u32(at, endian)?;
            let n_type = data[at + 4];
            let n_sect = data[at + 5];
            let n_desc = data.read_u16(at + 6, endian)?;
            let value = read_word(data, at + 8, bitness, endian)?;

            let name = match resolve_name(strtab, n_strx) {
                Ok(name) => name,
                Err(message) => {
                    warnings.push(ParseWarning::new(at as u64, WarningKind::BadString, message));
                    String::new()
                }
            };

            let kind = classify(n_type);
            let is_debug = kind == SymbolKind::Debug;
            let is_external = !is_debug && n_type & N_EXT != 0;
            let is_defined = matches!(
                kind,
                SymbolKind::Absolute | SymbolKind::Section | SymbolKind::Indirect
            );
            let section = (kind == SymbolKind::Section && n_sect != NO_SECT).then_some(n_sect);

            symbols.push(Symbol {
                index,
                name,
                n_strx,
                n_type,
                n_sect,
                n_desc,
                value,
                kind,
                is_external,
                is_private_external: !is_debug && n_type & N_PEXT != 0,
                is_debug,
                is_defined,
                is_local: !is_debug && !is_external,
                section,
            });
        }

        debug!(
            nsyms = command.nsyms,
            parsed = symbols.len(),
            warnings = warnings.len(),
            "Parsed symbol table"
        );

        Ok(Self {
            command: *command,
            symbols,
            warnings,
        })
    }

    pub fn by_index(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn by_addr(&self, addr: u64) -> Option<&Symbol> {
        self.symbols
            .iter()
            .find(|s| s.is_defined && s.kind == SymbolKind::Section && s.value == addr)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

fn resolve_name(strtab: &[u8], n_strx: u32) -> std::result::Result<String, String> {
    if n_strx == 0 {
        return Ok(String::new());
    }
    let start = n_strx as usize;
    if start >= strtab.len() {
        return Err(format!(
            "string index {:#x} outside the {}-byte string table",
            n_strx,
            strtab.len()
        ));
    }
    let rest = &strtab[start..];
    match memchr::memchr(0, rest) {
        Some(end) => Ok(String::from_utf8_lossy(&rest[..end]).into_owned()),
        None => Err(format!("unterminated string at index {:#x}", n_strx)),
    }
}

impl DySymTabInfo {
    /// Partition an already-parsed symbol array and read the indirect table.
    pub fn parse(
        data: &[u8],
        header: &Header,
        command: &DysymtabCommand,
        nsyms: u32,
        config: &ParserConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let mut warnings = Vec::new();

        let local = IndexRange {
            start: command.ilocalsym,
            count: command.nlocalsym,
        };
        let external_defined = IndexRange {
            start: command.iextdefsym,
            count: command.nextdefsym,
        };
        let undefined = IndexRange {
            start: command.iundefsym,
            count: command.nundefsym,
        };

        let ranges = [
            ("local", local),
            ("external-defined", external_defined),
            ("undefined", undefined),
        ];
        for (name, range) in ranges {
            if range.end() > u64::from(nsyms) {
                warnings.push(ParseWarning::new(
                    0,
                    WarningKind::InvalidRange,
                    format!(
                        "{} symbols [{}, {}) exceed nsyms {}",
                        name,
                        range.start,
                        range.end(),
                        nsyms
                    ),
                ));
            }
        }
        for (i, (a_name, a)) in ranges.iter().enumerate() {
            for (b_name, b) in ranges.iter().skip(i + 1) {
                if a.overlaps(b) {
                    warnings.push(ParseWarning::new(
                        0,
                        WarningKind::InvalidRange,
                        format!("{} and {} symbol ranges overlap", a_name, b_name),
                    ));
                }
            }
        }

        let mut indirect = Vec::new();
        if command.nindirectsyms > 0 {
            let size = data.len() as u64;
            let offset = u64::from(command.indirectsymoff);
            let mut count = u64::from(command.nindirectsyms);
            let available = size.saturating_sub(offset) / 4;
            if count > available {
                warnings.push(ParseWarning::new(
                    offset,
                    WarningKind::OutOfBounds,
                    format!(
                        "{} indirect symbols at {:#x} exceed the slice; reading {}",
                        command.nindirectsyms, offset, available
                    ),
                ));
                count = available;
            }
            count = count.min(u64::from(config.max_symbols));

            let mut guard = ScanGuard::new(cancel, config.scan_chunk);
            indirect.reserve(count as usize);
            for i in 0..count as usize {
                guard.tick()?;
                let at = offset as usize + i * 4;
                let entry = data.read_u32(at, header.endianness)?;
                let special = entry & (INDIRECT_SYMBOL_LOCAL | INDIRECT_SYMBOL_ABS) != 0;
                if !special && entry >= nsyms {
                    warnings.push(ParseWarning::new(
                        at as u64,
                        WarningKind::InvalidRange,
                        format!("indirect entry {} references symbol {} of {}", i, entry, nsyms),
                    ));
                }
                indirect.push(entry);
            }
        }

        Ok(Self {
            command: *command,
            local,
            external_defined,
            undefined,
            indirect,
            warnings,
        })
    }

    fn slice_of<'a>(range: &IndexRange, table: &'a SymbolTable) -> &'a [Symbol] {
        let len = table.symbols.len();
        let start = (range.start as usize).min(len);
        let end = (range.end() as usize).min(len);
        &table.symbols[start..end]
    }

    pub fn local_symbols<'a>(&self, table: &'a SymbolTable) -> &'a [Symbol] {
        Self::slice_of(&self.local, table)
    }

    pub fn external_symbols<'a>(&self, table: &'a SymbolTable) -> &'a [Symbol] {
        Self::slice_of(&self.external_defined, table)
    }

    pub fn undefined_symbols<'a>(&self, table: &'a SymbolTable) -> &'a [Symbol] {
        Self::slice_of(&self.undefined, table)
    }

    /// Indirect entries resolved to symbols; markers and bad indices yield None
    pub fn indirect_symbols<'a>(
        &'a self,
        table: &'a SymbolTable,
    ) -> impl Iterator<Item = Option<&'a Symbol>> + 'a {
        self.indirect.iter().map(move |&entry| {
            if entry & (INDIRECT_SYMBOL_LOCAL | INDIRECT_SYMBOL_ABS) != 0 {
                None
            } else {
                table.symbols.get(entry as usize)
            }
        })
    }
}

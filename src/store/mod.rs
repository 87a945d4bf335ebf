//! Metadata persistence boundary.
//!
//! The parser produces plain values; a `MetadataStore` decides where they
//! live. `InMemoryStore` is the reference implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::analysis::xrefs::XRef;
use crate::edit::EditRecord;
use crate::error::{MachoError, Result};
use crate::formats::macho::{Container, Header, Section, Segment, Symbol};
use crate::hashing::ContainerHashes;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub filename: String,
    pub path: Option<PathBuf>,
    pub file_size: u64,
    pub hashes: ContainerHashes,
    pub is_fat: bool,
    pub created_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl FileRecord {
    pub fn new(filename: impl Into<String>, path: Option<&Path>, data: &[u8], is_fat: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            path: path.map(Path::to_path_buf),
            file_size: data.len() as u64,
            hashes: ContainerHashes::compute(data),
            is_fat,
            created_at: Utc::now(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub file: Uuid,
    pub slice: usize,
    pub arch_offset: u64,
    pub arch_size: u64,
    pub header: Header,
}

/// Segment without its sections; those are stored separately
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub file: Uuid,
    pub slice: usize,
    pub segment: Segment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub file: Uuid,
    pub slice: usize,
    pub segment: usize,
    pub section: Section,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub file: Uuid,
    pub slice: usize,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XRefRecord {
    pub file: Uuid,
    pub xref: XRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLogRecord {
    pub file: Uuid,
    pub record: EditRecord,
}

/// Persistence collaborator for parsed models and edit history
pub trait MetadataStore: Send + Sync {
    fn store_file(&self, file: FileRecord) -> Result<Uuid>;
    fn store_header(&self, header: HeaderRecord) -> Result<()>;
    fn store_segment(&self, segment: SegmentRecord) -> Result<()>;
    fn store_section(&self, section: SectionRecord) -> Result<()>;
    fn store_symbol(&self, symbol: SymbolRecord) -> Result<()>;
    fn store_xref(&self, xref: XRefRecord) -> Result<()>;
    /// Upsert by edit id; a record's status changes over its life
    fn store_edit_record(&self, record: EditLogRecord) -> Result<()>;

    fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>>;
    fn list_headers(&self, file: Uuid) -> Result<Vec<HeaderRecord>>;
    fn list_segments(&self, file: Uuid) -> Result<Vec<SegmentRecord>>;
    fn list_sections(&self, file: Uuid) -> Result<Vec<SectionRecord>>;
    fn list_symbols(&self, file: Uuid) -> Result<Vec<SymbolRecord>>;
    fn list_xrefs(&self, file: Uuid) -> Result<Vec<XRefRecord>>;
    /// Newest first
    fn list_edit_records(&self, file: Uuid) -> Result<Vec<EditLogRecord>>;
}

#[derive(Default)]
struct Tables {
    files: HashMap<Uuid, FileRecord>,
    headers: Vec<HeaderRecord>,
    segments: Vec<SegmentRecord>,
    sections: Vec<SectionRecord>,
    symbols: Vec<SymbolRecord>,
    xrefs: Vec<XRefRecord>,
    edits: Vec<EditLogRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| MachoError::Store("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| MachoError::Store("store lock poisoned".to_string()))
    }

    fn require_file(tables: &Tables, id: Uuid) -> Result<()> {
        if tables.files.contains_key(&id) {
            Ok(())
        } else {
            Err(MachoError::Store(format!("unknown file {}", id)))
        }
    }
}

fn filtered<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().filter(|r| keep(r)).cloned().collect()
}

impl MetadataStore for InMemoryStore {
    fn store_file(&self, file: FileRecord) -> Result<Uuid> {
        let id = file.id;
        self.write()?.files.insert(id, file);
        Ok(id)
    }

    fn store_header(&self, header: HeaderRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, header.file)?;
        t.headers.push(header);
        Ok(())
    }

    fn store_segment(&self, segment: SegmentRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, segment.file)?;
        t.segments.push(segment);
        Ok(())
    }

    fn store_section(&self, section: SectionRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, section.file)?;
        t.sections.push(section);
        Ok(())
    }

    fn store_symbol(&self, symbol: SymbolRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, symbol.file)?;
        t.symbols.push(symbol);
        Ok(())
    }

    fn store_xref(&self, xref: XRefRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, xref.file)?;
        t.xrefs.push(xref);
        Ok(())
    }

    fn store_edit_record(&self, record: EditLogRecord) -> Result<()> {
        let mut t = self.write()?;
        Self::require_file(&t, record.file)?;
        match t
            .edits
            .iter_mut()
            .find(|e| e.file == record.file && e.record.id == record.record.id)
        {
            Some(existing) => *existing = record,
            None => t.edits.push(record),
        }
        Ok(())
    }

    fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>> {
        Ok(self.read()?.files.get(&id).cloned())
    }

    fn list_headers(&self, file: Uuid) -> Result<Vec<HeaderRecord>> {
        Ok(filtered(&self.read()?.headers, |r| r.file == file))
    }

    fn list_segments(&self, file: Uuid) -> Result<Vec<SegmentRecord>> {
        Ok(filtered(&self.read()?.segments, |r| r.file == file))
    }

    fn list_sections(&self, file: Uuid) -> Result<Vec<SectionRecord>> {
        Ok(filtered(&self.read()?.sections, |r| r.file == file))
    }

    fn list_symbols(&self, file: Uuid) -> Result<Vec<SymbolRecord>> {
        Ok(filtered(&self.read()?.symbols, |r| r.file == file))
    }

    fn list_xrefs(&self, file: Uuid) -> Result<Vec<XRefRecord>> {
        Ok(filtered(&self.read()?.xrefs, |r| r.file == file))
    }

    fn list_edit_records(&self, file: Uuid) -> Result<Vec<EditLogRecord>> {
        let mut out = filtered(&self.read()?.edits, |r| r.file == file);
        out.sort_by(|a, b| {
            b.record
                .timestamp
                .cmp(&a.record.timestamp)
                .then(b.record.id.cmp(&a.record.id))
        });
        Ok(out)
    }
}

/// Push every entity of a parsed container through `store`; returns the file id.
pub fn persist_container(
    store: &dyn MetadataStore,
    filename: &str,
    path: Option<&Path>,
    data: &[u8],
    model: &Container,
) -> Result<Uuid> {
    let file = store.store_file(FileRecord::new(filename, path, data, model.is_fat()))?;

    for slice in &model.slices {
        let index = slice.slice.index;
        store.store_header(HeaderRecord {
            file,
            slice: index,
            arch_offset: slice.slice.range.offset,
            arch_size: slice.slice.range.len,
            header: slice.header.clone(),
        })?;
        for seg in &slice.segments.segments {
            for sec in &seg.sections {
                store.store_section(SectionRecord {
                    file,
                    slice: index,
                    segment: seg.index,
                    section: sec.clone(),
                })?;
            }
            let mut bare = seg.clone();
            bare.sections.clear();
            store.store_segment(SegmentRecord {
                file,
                slice: index,
                segment: bare,
            })?;
        }
        for sym in slice.symbols() {
            store.store_symbol(SymbolRecord {
                file,
                slice: index,
                symbol: sym.clone(),
            })?;
        }
        for xref in &slice.xrefs {
            store.store_xref(XRefRecord {
                file,
                xref: xref.clone(),
            })?;
        }
    }
    debug!(%file, slices = model.slices.len(), "Persisted container");
    Ok(file)
}

/// Mirror an engine's history into `store`.
pub fn persist_history(store: &dyn MetadataStore, file: Uuid, records: &[EditRecord]) -> Result<()> {
    for record in records {
        store.store_edit_record(EditLogRecord {
            file,
            record: record.clone(),
        })?;
    }
    Ok(())
}

//! Cross-reference derivation.
//!
//! Produces symbol→section, section→segment and header→library edges from
//! a fully built slice model. The edge list is derived, deduplicated by
//! `(source, target, kind)` and never mutates its inputs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::formats::macho::load_commands::LoadCommandTable;
use crate::formats::macho::segments::SegmentTable;
use crate::formats::macho::types::{DylibKind, SymbolTable};

/// An entity addressed by its structural position in the container
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    Header { slice: usize },
    LoadCommand { slice: usize, index: usize },
    Segment { slice: usize, index: usize },
    Section { slice: usize, segment: usize, index: usize },
    Symbol { slice: usize, index: usize },
    /// External library named by a dylib command
    Library { slice: usize, command: usize, name: String },
}

impl EntityRef {
    pub fn kind_name(&self) -> &'static str {
        match self {
            EntityRef::Header { .. } => "header",
            EntityRef::LoadCommand { .. } => "load_command",
            EntityRef::Segment { .. } => "segment",
            EntityRef::Section { .. } => "section",
            EntityRef::Symbol { .. } => "symbol",
            EntityRef::Library { .. } => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum XRefKind {
    /// Defined symbol located in a section
    DefinedIn,
    /// Section contained in a segment
    ContainedIn,
    /// Slice links against a library
    LinksLibrary { weak: bool, reexport: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XRef {
    pub source: EntityRef,
    pub target: EntityRef,
    pub kind: XRefKind,
    /// Symbol value minus section address, for `DefinedIn`
    pub offset: Option<u64>,
}

/// Derive all edges for one slice.
pub fn resolve(
    slice: usize,
    segments: &SegmentTable,
    symbols: Option<&SymbolTable>,
    commands: &LoadCommandTable,
) -> Vec<XRef> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |xref: XRef| {
        let key = (xref.source.clone(), xref.target.clone(), xref.kind);
        if seen.insert(key) {
            out.push(xref);
        }
    };

    if let Some(table) = symbols {
        for sym in table.defined() {
            let Some(ordinal) = sym.section else {
                continue;
            };
            let Some((seg, sec)) = segments.section_by_ordinal(u32::from(ordinal)) else {
                continue;
            };
            push(XRef {
                source: EntityRef::Symbol {
                    slice,
                    index: sym.index,
                },
                target: EntityRef::Section {
                    slice,
                    segment: seg.index,
                    index: sec.index,
                },
                kind: XRefKind::DefinedIn,
                offset: sym.value.checked_sub(sec.addr),
            });
        }
    }

    for seg in &segments.segments {
        for sec in &seg.sections {
            push(XRef {
                source: EntityRef::Section {
                    slice,
                    segment: seg.index,
                    index: sec.index,
                },
                target: EntityRef::Segment {
                    slice,
                    index: seg.index,
                },
                kind: XRefKind::ContainedIn,
                offset: None,
            });
        }
    }

    for (command, dylib) in commands.dylibs() {
        if dylib.kind == DylibKind::Id {
            continue;
        }
        push(XRef {
            source: EntityRef::Header { slice },
            target: EntityRef::Library {
                slice,
                command,
                name: dylib.name.clone(),
            },
            kind: XRefKind::LinksLibrary {
                weak: dylib.kind == DylibKind::Weak,
                reexport: dylib.kind == DylibKind::Reexport,
            },
            offset: None,
        });
    }

    out
}

/// Edges whose source or target is `entity`
pub fn references_to<'a>(xrefs: &'a [XRef], entity: &'a EntityRef) -> impl Iterator<Item = &'a XRef> {
    xrefs
        .iter()
        .filter(move |x| &x.source == entity || &x.target == entity)
}

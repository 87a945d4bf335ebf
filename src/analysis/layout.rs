//! Layout data for presentation: section-size trees, symbol distribution,
//! memory map and the cross-reference network of one slice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::xrefs::{EntityRef, XRefKind};
use crate::error::Result;
use crate::formats::macho::MachoSlice;

/// Node of the section-size tree (root → segments → sections)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SizeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Segment,
    Section,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "type")]
    pub kind: RegionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLink {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XRefNetwork {
    pub nodes: Vec<NetworkNode>,
    pub links: Vec<NetworkLink>,
}

/// Everything a presentation layer needs for one slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutReport {
    pub section_sizes: SizeNode,
    pub symbol_distribution: Vec<DistributionEntry>,
    pub cross_references: XRefNetwork,
    pub memory_map: Vec<MemoryRegion>,
}

impl LayoutReport {
    pub fn build(slice: &MachoSlice) -> Self {
        Self {
            section_sizes: section_sizes(slice),
            symbol_distribution: symbol_distribution(slice),
            cross_references: xref_network(slice),
            memory_map: memory_map(slice),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Segments with at least one section, each section valued by its size
pub fn section_sizes(slice: &MachoSlice) -> SizeNode {
    let children = slice
        .segments
        .segments
        .iter()
        .filter(|seg| !seg.sections.is_empty())
        .map(|seg| SizeNode {
            name: seg.name.clone(),
            value: None,
            children: seg
                .sections
                .iter()
                .map(|sec| SizeNode {
                    name: sec.name.clone(),
                    value: Some(sec.size),
                    children: Vec::new(),
                })
                .collect(),
        })
        .collect();

    SizeNode {
        name: "Sections".to_string(),
        value: None,
        children,
    }
}

/// Debug / Undefined / External / Local counts; empty categories are omitted
pub fn symbol_distribution(slice: &MachoSlice) -> Vec<DistributionEntry> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for sym in slice.symbols() {
        let bucket = if sym.is_debug {
            "Debug"
        } else if !sym.is_defined {
            "Undefined"
        } else if sym.is_external {
            "External"
        } else {
            "Local"
        };
        *counts.entry(bucket).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, value)| DistributionEntry {
            name: name.to_string(),
            value,
        })
        .collect()
}

/// Segments ordered by address, each followed by its sections ordered by address
pub fn memory_map(slice: &MachoSlice) -> Vec<MemoryRegion> {
    let mut segments: Vec<_> = slice.segments.segments.iter().collect();
    segments.sort_by_key(|s| s.vmaddr);

    let mut out = Vec::new();
    for seg in segments {
        out.push(MemoryRegion {
            name: seg.name.clone(),
            start: seg.vmaddr,
            end: seg.vmaddr.saturating_add(seg.vmsize),
            size: seg.vmsize,
            parent: None,
            kind: RegionKind::Segment,
        });
        let mut sections: Vec<_> = seg.sections.iter().collect();
        sections.sort_by_key(|s| s.addr);
        for sec in sections {
            out.push(MemoryRegion {
                name: sec.name.clone(),
                start: sec.addr,
                end: sec.addr.saturating_add(sec.size),
                size: sec.size,
                parent: Some(seg.name.clone()),
                kind: RegionKind::Section,
            });
        }
    }
    out
}

fn node_for(slice: &MachoSlice, entity: &EntityRef) -> Option<NetworkNode> {
    let (id, name) = match entity {
        EntityRef::Symbol { index, .. } => {
            let sym = slice.symbols().get(*index)?;
            (format!("symbol-{}", index), sym.name.clone())
        }
        EntityRef::Section { segment, index, .. } => {
            let seg = slice.segment(*segment)?;
            let sec = seg.sections.get(*index)?;
            (
                format!("section-{}-{}", segment, index),
                format!("{},{}", seg.name, sec.name),
            )
        }
        EntityRef::Segment { index, .. } => {
            (format!("segment-{}", index), slice.segment(*index)?.name.clone())
        }
        EntityRef::Library { command, name, .. } => (format!("library-{}", command), name.clone()),
        EntityRef::Header { .. } => ("header".to_string(), slice.header.cpu().name()),
        EntityRef::LoadCommand { index, .. } => {
            (format!("load_command-{}", index), slice.load_command(*index)?.name())
        }
    };
    Some(NetworkNode {
        id,
        name,
        kind: entity.kind_name().to_string(),
    })
}

/// Nodes and links for the slice's cross-references
pub fn xref_network(slice: &MachoSlice) -> XRefNetwork {
    let mut nodes: BTreeMap<String, NetworkNode> = BTreeMap::new();
    let mut links = Vec::new();

    for xref in &slice.xrefs {
        let (Some(source), Some(target)) = (node_for(slice, &xref.source), node_for(slice, &xref.target)) else {
            continue;
        };
        links.push(NetworkLink {
            source: source.id.clone(),
            target: target.id.clone(),
            kind: match xref.kind {
                XRefKind::DefinedIn => "defined_in",
                XRefKind::ContainedIn => "contained_in",
                XRefKind::LinksLibrary { .. } => "links_library",
            }
            .to_string(),
        });
        nodes.entry(source.id.clone()).or_insert(source);
        nodes.entry(target.id.clone()).or_insert(target);
    }

    XRefNetwork {
        nodes: nodes.into_values().collect(),
        links,
    }
}

//! Presentation layout data.

use crate::common::{self, Spec};
use machoscope::analysis::layout::*;
use machoscope::formats::macho::parse_container;

fn report() -> LayoutReport {
    let model = parse_container(&common::executable(Spec::arm64()), &common::config().parser).unwrap();
    LayoutReport::build(&model.slices[0])
}

#[test]
fn section_size_tree() {
    let tree = report().section_sizes;
    assert_eq!(tree.name, "Sections");
    let segments: Vec<&str> = tree.children.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(segments, ["__TEXT", "__DATA"]);

    let text = &tree.children[0];
    assert_eq!(text.value, None);
    assert_eq!(text.children[0].name, "__text");
    assert_eq!(text.children[0].value, Some(common::TEXT_SIZE));
    assert_eq!(text.children[1].value, Some(common::CSTRING.len() as u64));
    assert_eq!(tree.children[1].children[1].value, Some(0x40));
}

#[test]
fn symbol_buckets() {
    let dist = report().symbol_distribution;
    let pairs: Vec<(&str, usize)> = dist.iter().map(|e| (e.name.as_str(), e.value)).collect();
    assert_eq!(pairs, [("External", 2), ("Local", 1), ("Undefined", 2)]);
}

#[test]
fn memory_map_is_address_ordered() {
    let map = report().memory_map;
    let names: Vec<&str> = map.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        ["__PAGEZERO", "__TEXT", "__text", "__cstring", "__DATA", "__data", "__bss", "__LINKEDIT"]
    );

    let text = &map[2];
    assert_eq!(text.kind, RegionKind::Section);
    assert_eq!(text.parent.as_deref(), Some("__TEXT"));
    assert_eq!(text.start, 0x1_0000_0400);
    assert_eq!(text.end - text.start, text.size);
    assert!(map.iter().filter(|r| r.kind == RegionKind::Segment).all(|r| r.parent.is_none()));
}

#[test]
fn cross_reference_network() {
    let net = report().cross_references;
    assert_eq!(net.links.len(), 9);
    assert_eq!(net.nodes.len(), 12);

    let ids: Vec<&str> = net.nodes.iter().map(|n| n.id.as_str()).collect();
    for id in ["symbol-1", "section-1-0", "segment-2", "library-12", "header"] {
        assert!(ids.contains(&id), "missing {id}");
    }
    assert!(!ids.contains(&"symbol-3"));

    let node = |id: &str| net.nodes.iter().find(|n| n.id == id).unwrap();
    assert_eq!(node("section-1-0").name, "__TEXT,__text");
    assert_eq!(node("section-1-0").kind, "section");
    assert_eq!(node("header").name, "ARM64");

    assert!(net.links.iter().any(|l| l.source == "symbol-1"
        && l.target == "section-1-0"
        && l.kind == "defined_in"));
    assert!(net.links.iter().any(|l| l.source == "header"
        && l.target == "library-11"
        && l.kind == "links_library"));
    for link in &net.links {
        assert!(ids.contains(&link.source.as_str()) && ids.contains(&link.target.as_str()));
    }
}

#[test]
fn report_serializes_with_type_tags() {
    let json = report().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["memory_map"][0]["type"], "segment");
    assert_eq!(value["memory_map"][2]["type"], "section");
    assert_eq!(value["cross_references"]["links"][0]["type"], "defined_in");
    assert!(value["section_sizes"]["children"].is_array());
}

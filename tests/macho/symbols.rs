//! Symbol tables, dynamic symbol partitioning and derived cross-references.

use crate::common::{self, Spec};
use machoscope::analysis::xrefs::references_to;
use machoscope::formats::macho::*;
use machoscope::{EntityRef, XRefKind};

fn arm64() -> Container {
    parse_container(&common::executable(Spec::arm64()), &common::config().parser).unwrap()
}

#[test]
fn symbols_are_classified() {
    let model = arm64();
    let slice = &model.slices[0];
    let table = slice.symtab.as_ref().unwrap();
    assert_eq!(table.len(), common::SYMBOLS.len());

    let names: Vec<&str> = table.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["_helper", "_main", "_counter", "_printf", "_weak_fn"]);

    let helper = table.by_name("_helper").unwrap();
    assert_eq!(helper.kind, SymbolKind::Section);
    assert!(helper.is_defined && helper.is_local && !helper.is_external);
    assert_eq!(helper.section, Some(1));

    let main = table.by_name("_main").unwrap();
    assert!(main.is_defined && main.is_external);
    assert_eq!(main.value, 0x1_0000_0400);
    assert_eq!(table.by_addr(0x1_0000_0400).map(|s| s.index), Some(1));

    let printf = table.by_name("_printf").unwrap();
    assert_eq!(printf.kind, SymbolKind::Undefined);
    assert!(!printf.is_defined);
    assert_eq!(printf.section, None);

    assert_eq!(table.defined().count(), 3);
    let undefined: Vec<&str> = table.undefined().map(|s| s.name.as_str()).collect();
    assert_eq!(undefined, ["_printf", "_weak_fn"]);
}

#[test]
fn dysymtab_partitions_the_symbol_array() {
    let model = arm64();
    let slice = &model.slices[0];
    let table = slice.symtab.as_ref().unwrap();
    let dy = slice.dysymtab.as_ref().unwrap();

    assert_eq!(dy.local, IndexRange { start: 0, count: 1 });
    assert_eq!(dy.external_defined, IndexRange { start: 1, count: 2 });
    assert_eq!(dy.undefined, IndexRange { start: 3, count: 2 });
    assert!(!dy.local.overlaps(&dy.external_defined));
    assert!(dy.warnings.is_empty());

    let names = |syms: &[Symbol]| syms.iter().map(|s| s.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(dy.local_symbols(table)), ["_helper"]);
    assert_eq!(names(dy.external_symbols(table)), ["_main", "_counter"]);
    assert_eq!(names(dy.undefined_symbols(table)), ["_printf", "_weak_fn"]);

    assert_eq!(dy.indirect, [3, 4]);
    let indirect: Vec<&str> = dy
        .indirect_symbols(table)
        .map(|s| s.map(|s| s.name.as_str()).unwrap_or("?"))
        .collect();
    assert_eq!(indirect, ["_printf", "_weak_fn"]);
}

#[test]
fn cross_references() {
    let model = arm64();
    let slice = &model.slices[0];
    let xrefs = &slice.xrefs;

    let defined_in: Vec<_> = xrefs.iter().filter(|x| x.kind == XRefKind::DefinedIn).collect();
    assert_eq!(defined_in.len(), 3);
    let contained: Vec<_> = xrefs.iter().filter(|x| x.kind == XRefKind::ContainedIn).collect();
    assert_eq!(contained.len(), 4);
    let libs: Vec<_> = xrefs
        .iter()
        .filter(|x| matches!(x.kind, XRefKind::LinksLibrary { .. }))
        .collect();
    assert_eq!(libs.len(), 2);

    // undefined symbols resolve nowhere
    for undefined in [3, 4] {
        let sym = EntityRef::Symbol { slice: 0, index: undefined };
        assert_eq!(references_to(xrefs, &sym).count(), 0);
    }

    let helper = defined_in
        .iter()
        .find(|x| x.source == EntityRef::Symbol { slice: 0, index: 0 })
        .unwrap();
    assert_eq!(helper.target, EntityRef::Section { slice: 0, segment: 1, index: 0 });
    assert_eq!(helper.offset, Some(8));

    let counter = defined_in
        .iter()
        .find(|x| x.source == EntityRef::Symbol { slice: 0, index: 2 })
        .unwrap();
    assert_eq!(counter.target, EntityRef::Section { slice: 0, segment: 2, index: 0 });
    assert_eq!(counter.offset, Some(0));

    let weak = libs
        .iter()
        .find(|x| matches!(x.kind, XRefKind::LinksLibrary { weak: true, .. }))
        .unwrap();
    assert_eq!(
        weak.target,
        EntityRef::Library {
            slice: 0,
            command: 12,
            name: "/usr/lib/libweak.dylib".to_string()
        }
    );
    assert_eq!(weak.source, EntityRef::Header { slice: 0 });
}

#[test]
fn references_to_a_section() {
    let model = arm64();
    let xrefs = &model.slices[0].xrefs;
    let text = EntityRef::Section { slice: 0, segment: 1, index: 0 };
    let edges: Vec<_> = references_to(xrefs, &text).collect();

    // _helper and _main point in, the section points at __TEXT
    assert_eq!(edges.len(), 3);
    assert_eq!(edges.iter().filter(|x| x.target == text).count(), 2);
    assert!(edges
        .iter()
        .any(|x| x.target == EntityRef::Segment { slice: 0, index: 1 }));

    let mut sorted = xrefs.clone();
    sorted.sort_by(|a, b| (&a.source, &a.target, a.kind).cmp(&(&b.source, &b.target, b.kind)));
    sorted.dedup();
    assert_eq!(sorted.len(), xrefs.len(), "edges are unique");
}

#[test]
fn fat_slices_keep_their_own_xrefs() {
    let model = parse_container(&common::universal(), &common::config().parser).unwrap();
    for slice in &model.slices {
        let index = slice.slice.index;
        assert!(slice.xrefs.iter().all(|x| match &x.source {
            EntityRef::Symbol { slice, .. }
            | EntityRef::Section { slice, .. }
            | EntityRef::Header { slice } => *slice == index,
            _ => false,
        }));
    }
}

#[test]
fn capped_sections_keep_their_ordinals() {
    let data = common::executable(Spec::arm64());
    let mut config = common::config().parser;
    config.max_sections_per_segment = 1;
    let model = parse_container(&data, &config).unwrap();
    let slice = &model.slices[0];

    let data_seg = &slice.segments.segments[2];
    assert_eq!(data_seg.sections.len(), 1);
    assert_eq!(data_seg.sections[0].name, "__data");
    assert_eq!(data_seg.sections[0].ordinal, 3);
    assert!(slice.segments.section_by_ordinal(2).is_none());
    assert!(data_seg.warnings.iter().any(|w| w.kind == WarningKind::LimitReached));

    let counter = EntityRef::Symbol { slice: 0, index: 2 };
    let edge = references_to(&slice.xrefs, &counter).next().unwrap();
    assert_eq!(edge.target, EntityRef::Section { slice: 0, segment: 2, index: 0 });
}

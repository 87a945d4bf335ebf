//! Damaged inputs: the parser reports what it can and records the rest.

use crate::common::{self, Spec};
use machoscope::formats::macho::*;
use machoscope::MachoError;

fn parse(data: &[u8]) -> machoscope::Result<Container> {
    parse_container(data, &common::config().parser)
}

fn kinds(slice: &MachoSlice) -> Vec<WarningKind> {
    slice.all_warnings().iter().map(|w| w.kind).collect()
}

fn put_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn unknown_magic_is_an_error() {
    let mut data = common::executable(Spec::arm64());
    put_u32(&mut data, 0, 0x1234_5678);
    let err = parse(&data).unwrap_err();
    assert!(matches!(err, MachoError::MalformedHeader { offset: 0, .. }));

    assert!(parse(&[0xcf, 0xfa]).is_err());
    assert!(parse(&data[..0]).is_err());
}

#[test]
fn header_shorter_than_fixed_size() {
    let data = common::executable(Spec::arm64());
    let err = parse(&data[..20]).unwrap_err();
    assert!(matches!(err, MachoError::MalformedHeader { .. }));
}

#[test]
fn ncmds_past_the_command_table() {
    let mut data = common::executable(Spec::arm64());
    put_u32(&mut data, 16, common::NCMDS + 5);
    let model = parse(&data).unwrap();
    let slice = &model.slices[0];

    assert!(!slice.load_commands.complete);
    assert_eq!(slice.load_commands.len(), common::NCMDS as usize + 1);
    let last = slice.load_commands.commands.last().unwrap();
    assert!(last.truncated);
    assert!(kinds(slice).contains(&WarningKind::TruncatedCommand));
    assert!(slice.structural_faults() > 0);

    // everything before the break still parses
    assert_eq!(slice.segments.segments.len(), 4);
    assert!(slice.symtab.is_some());
}

#[test]
fn undersized_cmdsize_stops_iteration() {
    let mut data = common::executable(Spec::arm64());
    put_u32(&mut data, 36, 4);
    let model = parse(&data).unwrap();
    let slice = &model.slices[0];

    assert_eq!(slice.load_commands.len(), 1);
    assert!(slice.load_commands.commands[0].truncated);
    assert!(slice.segments.segments.is_empty());
    assert!(slice.symtab.is_none());
    assert!(kinds(slice).contains(&WarningKind::TruncatedCommand));
}

#[test]
fn sizeofcmds_disagreeing_with_commands() {
    let mut data = common::executable(Spec::arm64());
    let model = parse(&data).unwrap();
    let sizeofcmds = model.slices[0].header.sizeofcmds;
    put_u32(&mut data, 20, sizeofcmds + 8);

    let model = parse(&data).unwrap();
    let slice = &model.slices[0];
    assert!(slice.load_commands.complete);
    assert!(slice
        .load_commands
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::CommandTableMismatch));
}

#[test]
fn section_outside_the_file() {
    let mut data = common::executable(Spec::arm64());
    let model = parse(&data).unwrap();
    let record = model.slices[0].segments.segments[1].sections[0].record_offset as usize;
    put_u32(&mut data, record + 48, 0x00ff_0000);

    let model = parse(&data).unwrap();
    let sec = &model.slices[0].segments.segments[1].sections[0];
    assert!(sec.warnings.iter().any(|w| w.kind == WarningKind::OutOfBounds));
    assert_eq!(model.slices[0].structural_faults(), 0);
}

#[test]
fn symbol_count_past_the_slice_is_clamped() {
    let mut data = common::executable(Spec::arm64());
    let model = parse(&data).unwrap();
    let symtab = model.slices[0].load_commands.by_index(4).unwrap().offset as usize;
    put_u32(&mut data, symtab + 12, 10_000);

    let model = parse(&data).unwrap();
    let table = model.slices[0].symtab.as_ref().unwrap();
    assert!(table.len() < 10_000);
    assert!(table.len() >= common::SYMBOLS.len());
    assert!(table.warnings.iter().any(|w| w.kind == WarningKind::OutOfBounds));
}

#[test]
fn truncated_file_keeps_the_command_table() {
    let data = common::executable(Spec::arm64());
    let model = parse(&data[..common::DATA_START as usize]).unwrap();
    let slice = &model.slices[0];

    assert_eq!(slice.load_commands.len(), common::NCMDS as usize);
    assert_eq!(slice.structural_faults(), 0);
    assert!(kinds(slice).contains(&WarningKind::OutOfBounds));
}

#[test]
fn limits_cap_iteration() {
    let data = common::executable(Spec::arm64());
    let mut config = common::config().parser;
    config.max_load_commands = 3;
    let model = parse_container(&data, &config).unwrap();
    let slice = &model.slices[0];
    assert_eq!(slice.load_commands.len(), 3);
    assert!(kinds(slice).contains(&WarningKind::LimitReached));
}

#[test]
fn dysymtab_ranges_follow_the_declared_symbol_count() {
    let mut data = common::executable(Spec::arm64());
    let model = parse(&data).unwrap();
    let symtab = model.slices[0].load_commands.find(LC_SYMTAB).unwrap().offset as usize;
    let dysymtab = model.slices[0].load_commands.find(LC_DYSYMTAB).unwrap().offset as usize;
    put_u32(&mut data, symtab + 12, 10_000);
    put_u32(&mut data, dysymtab + 24, 9_000);

    let model = parse(&data).unwrap();
    let slice = &model.slices[0];
    let table = slice.symtab.as_ref().unwrap();
    let dy = slice.dysymtab.as_ref().unwrap();
    assert!(table.len() < 9_000);
    assert!(!dy.warnings.iter().any(|w| w.kind == WarningKind::InvalidRange));
    assert!(dy.undefined_symbols(table).is_empty());

    // past the declared count is still caught
    put_u32(&mut data, dysymtab + 24, 9_999);
    let model = parse(&data).unwrap();
    let dy = model.slices[0].dysymtab.as_ref().unwrap();
    assert!(dy.warnings.iter().any(|w| w.kind == WarningKind::InvalidRange));
}

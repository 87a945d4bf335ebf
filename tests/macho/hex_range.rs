//! Labelled hex windows.

use crate::common::{self, Spec};
use machoscope::analysis::hex_range::read_bytes_with;
use machoscope::formats::macho::parse_container;
use machoscope::*;

fn labels(range: &HexRange) -> Vec<&str> {
    range.interpretations.iter().map(|i| i.name.as_str()).collect()
}

#[test]
fn header_window_is_labelled() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let range = read_bytes(&data, &model, 0, 8, &IOLimits::default()).unwrap();

    assert_eq!(range.raw, &data[..8]);
    assert_eq!(range.hex_string(), "cf fa ed fe 0c 00 00 01");
    assert!(!range.is_truncated());
    assert_eq!(labels(&range), ["slice[0].header.magic", "slice[0].header.cputype"]);

    let cpu = &range.interpretations[1];
    assert_eq!((cpu.offset, cpu.length), (4, 4));
    assert!(cpu.decoded_value.starts_with("ARM64"));
    assert_eq!(cpu.description, "CPU type");
}

#[test]
fn partially_covered_fields_are_reported_whole() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let range = read_bytes(&data, &model, 6, 4, &IOLimits::default()).unwrap();
    assert_eq!(labels(&range), ["slice[0].header.cputype", "slice[0].header.cpusubtype"]);
    assert_eq!(range.interpretations[0].offset, 4);
    assert_eq!(range.interpretations[0].length, 4);
}

#[test]
fn section_records_and_symbols() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let text = &model.slices[0].segments.segments[1].sections[0];

    let range = read_bytes(&data, &model, text.record_offset, 80, &IOLimits::default()).unwrap();
    let names = labels(&range);
    assert_eq!(names.len(), 12);
    assert_eq!(names[0], "slice[0].__TEXT,__text.sectname");
    assert!(names.contains(&"slice[0].__TEXT,__text.addr"));
    let sectname = &range.interpretations[0];
    assert_eq!(sectname.decoded_value, "\"__text\"");

    let range = read_bytes(&data, &model, common::LINKEDIT_OFFSET, 16, &IOLimits::default()).unwrap();
    assert_eq!(
        labels(&range),
        [
            "slice[0].symbol[0](_helper).n_strx",
            "slice[0].symbol[0](_helper).n_type",
            "slice[0].symbol[0](_helper).n_sect",
            "slice[0].symbol[0](_helper).n_desc",
            "slice[0].symbol[0](_helper).n_value",
        ]
    );
}

#[test]
fn load_command_fields_carry_the_command_name() {
    let data = common::executable(Spec::x86_64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let symtab = model.slices[0].load_commands.by_index(4).unwrap();

    let range = read_bytes(&data, &model, symtab.offset, 24, &IOLimits::default()).unwrap();
    assert_eq!(range.interpretations[0].name, "slice[0].LC_SYMTAB[4].cmd");
    assert!(range.interpretations[0].decoded_value.starts_with("LC_SYMTAB"));
    assert_eq!(range.interpretations.len(), 6);
}

#[test]
fn reads_are_capped_and_bounded() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let limits = IOLimits {
        max_file_size: 1 << 20,
        max_chunk_size: 16,
    };

    let range = read_bytes(&data, &model, 0, 1000, &limits).unwrap();
    assert_eq!(range.raw.len(), 16);
    assert_eq!(range.requested, 1000);
    assert!(range.is_truncated());

    // a window running past EOF is cut at EOF
    let len = data.len() as u64;
    let tail = read_bytes(&data, &model, len - 4, 16, &limits).unwrap();
    assert_eq!(tail.raw.len(), 4);

    assert!(matches!(
        read_bytes(&data, &model, len + 1, 4, &limits).unwrap_err(),
        MachoError::OutOfBoundsOffset { .. }
    ));
    assert!(read_bytes(&data, &model, len, 0, &limits).unwrap().raw.is_empty());
}

#[test]
fn fat_table_labels() {
    let data = common::universal();
    let model = parse_container(&data, &common::config().parser).unwrap();
    let range = read_bytes(&data, &model, 0, 48, &IOLimits::default()).unwrap();
    let names = labels(&range);

    assert_eq!(names[0], "fat.fat_magic");
    assert_eq!(names[1], "fat.nfat_arch");
    assert!(names.contains(&"fat.arch[1].offset"));
    assert_eq!(names.len(), 2 + 2 * 5);
    assert_eq!(range.interpretations[0].decoded_value, "0xcafebabe");

    let arm = model.slice(1).unwrap().slice.range.offset;
    let range = read_bytes(&data, &model, arm + 4, 4, &IOLimits::default()).unwrap();
    assert_eq!(labels(&range), ["slice[1].header.cputype"]);
    assert_eq!(range.interpretations[0].offset, arm + 4);
}

#[test]
fn cancelled_labelling_stops() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let err = read_bytes_with(&data, &model, 0, 0x400, &IOLimits::default(), &token, 1).unwrap_err();
    assert!(matches!(err, MachoError::Cancelled));
}

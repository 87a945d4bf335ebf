//! Section bytes handed to a disassembly backend.

use crate::common::{self, Spec};
use machoscope::disasm::{section_request, Architecture};
use machoscope::formats::macho::*;
use machoscope::MachoError;

#[test]
fn text_section_request() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let slice = &model.slices[0];
    let text = &slice.segments.segments[1].sections[0];

    let request = section_request(&data, slice, text, 4096).unwrap();
    assert_eq!(request.architecture, Architecture::ARM64);
    assert_eq!(request.start_address, text.addr);
    assert_eq!(request.bytes.len(), common::TEXT_SIZE as usize);
    let start = common::DATA_START as usize;
    assert_eq!(request.bytes, &data[start..start + common::TEXT_SIZE as usize]);
}

#[test]
fn request_is_capped() {
    let data = common::executable(Spec::x86_64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let slice = &model.slices[0];
    let text = &slice.segments.segments[1].sections[0];

    let request = section_request(&data, slice, text, 8).unwrap();
    assert_eq!(request.architecture, Architecture::X86_64);
    assert_eq!(request.bytes.len(), 8);
    assert_eq!(request.start_address, text.addr);
}

#[test]
fn zerofill_section_has_no_bytes() {
    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let slice = &model.slices[0];
    let bss = &slice.segments.segments[2].sections[1];
    assert!(bss.is_zerofill());

    let request = section_request(&data, slice, bss, 4096).unwrap();
    assert!(request.bytes.is_empty());
    assert_eq!(request.start_address, bss.addr);
}

#[test]
fn unknown_cpu_is_unsupported() {
    let spec = Spec {
        cpu_type: 6,
        ..Spec::arm64()
    };
    let data = common::executable(spec);
    let model = parse_container(&data, &common::config().parser).unwrap();
    let slice = &model.slices[0];
    let text = &slice.segments.segments[1].sections[0];

    let err = section_request(&data, slice, text, 4096).unwrap_err();
    assert!(matches!(err, MachoError::UnsupportedArchitecture(_)));
}

#[cfg(feature = "disasm-capstone")]
#[test]
fn capstone_decodes_the_text_section() {
    use machoscope::disasm::capstone::CapstoneDisassembler;

    let data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let slice = &model.slices[0];
    let text = &slice.segments.segments[1].sections[0];

    let insns = section_request(&data, slice, text, 4096)
        .unwrap()
        .run(&CapstoneDisassembler::new())
        .unwrap();
    let mnemonics: Vec<&str> = insns.iter().map(|i| i.mnemonic.as_str()).collect();
    assert_eq!(mnemonics, ["nop", "nop", "nop", "ret"]);
    assert_eq!(insns[3].address, text.addr + 12);
}

//! Universal containers.

use crate::common::{self, Spec};
use machoscope::formats::macho::fat::read_container;
use machoscope::formats::macho::*;
use machoscope::ByteRange;

#[test]
fn universal_binary_has_two_slices() {
    let data = common::universal();
    assert_eq!(&data[..4], &[0xca, 0xfe, 0xba, 0xbe]);

    let model = parse_container(&data, &common::config().parser).unwrap();
    assert!(model.is_fat());
    assert_eq!(
        model.kind,
        ContainerKind::Fat {
            magic: FAT_MAGIC,
            is_64: false,
            nfat_arch: 2
        }
    );
    assert_eq!(model.slices.len(), 2);
    assert!(model.slice_errors.is_empty());
    assert!(!model.partially_malformed);

    let arches: Vec<CpuType> = model.slices.iter().map(|s| s.slice.arch).collect();
    assert_eq!(arches, [CpuType::X86_64, CpuType::Arm64]);

    for (slice, arch) in model.slices.iter().zip(&model.fat_arches) {
        assert!(slice.slice.in_fat);
        assert_eq!(slice.slice.range.offset, arch.offset);
        assert_eq!(slice.slice.range.len, arch.size);
        assert_eq!(slice.slice.align, Some(12));
        assert_eq!(slice.slice.range.offset % 4096, 0);
        assert_eq!(slice.header.ncmds, common::NCMDS);
        assert!(slice.all_warnings().is_empty(), "{:?}", slice.all_warnings());
    }

    // slices are disjoint and inside the container
    let a = model.slices[0].slice.range;
    let b = model.slices[1].slice.range;
    assert!(!a.overlaps(&b));
    assert!(b.fits_within(data.len() as u64));
    assert_eq!(model.fat_header_range(), Some(ByteRange::new(0, 8 + 2 * 20)));
}

#[test]
fn fat_64_descriptors() {
    let a = Spec::arm64();
    let data = common::fat(&[(a.cpu_type, a.cpu_subtype, common::executable(a))], true);
    let model = parse_container(&data, &common::config().parser).unwrap();
    assert!(matches!(model.kind, ContainerKind::Fat { is_64: true, .. }));
    assert_eq!(model.fat_arches[0].offset, 0x1000);
    assert_eq!(model.slices[0].header.cpu(), CpuType::Arm64);
    assert_eq!(model.fat_header_range(), Some(ByteRange::new(0, 8 + 32)));
}

#[test]
fn slices_parse_in_parallel() {
    let data = common::universal();
    let mut cfg = common::config().parser;
    cfg.parallel = true;
    let parallel = parse_container(&data, &cfg).unwrap();
    cfg.parallel = false;
    let sequential = parse_container(&data, &cfg).unwrap();
    assert_eq!(parallel, sequential);
    // order follows the arch table, not completion order
    assert_eq!(parallel.slices[0].slice.index, 0);
    assert_eq!(parallel.slices[1].slice.index, 1);
}

#[test]
fn bad_slice_is_isolated() {
    let mut data = common::universal();
    let second = u32::from_be_bytes(data[8 + 20 + 8..8 + 20 + 12].try_into().unwrap()) as usize;
    data[second..second + 4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

    let model = parse_container(&data, &common::config().parser).unwrap();
    assert_eq!(model.slices.len(), 1);
    assert_eq!(model.slices[0].slice.index, 0);
    assert_eq!(model.slice_errors.len(), 1);
    assert_eq!(model.slice_errors[0].index, 1);
    assert!(model.partially_malformed);
    assert!(model.slice(1).is_none());
}

#[test]
fn overlapping_descriptor_is_skipped() {
    let mut data = common::universal();
    // point the second arch at the first slice
    let first = data[8 + 8..8 + 12].to_vec();
    data[8 + 20 + 8..8 + 20 + 12].copy_from_slice(&first);

    let layout = read_container(&data, &common::config().parser).unwrap();
    assert_eq!(layout.slices.len(), 1);
    assert!(layout.partially_malformed);
    assert!(layout.warnings.iter().any(|w| w.kind == WarningKind::Overlap));
}

#[test]
fn arch_count_past_buffer_keeps_what_fits() {
    let mut data = common::universal();
    data[4..8].copy_from_slice(&40u32.to_be_bytes());
    data.truncate(0x1000 + 16);

    let layout = read_container(&data, &common::config().parser).unwrap();
    assert!(layout.partially_malformed);
    assert!(layout
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::MalformedHeader || w.kind == WarningKind::OutOfBounds));
}

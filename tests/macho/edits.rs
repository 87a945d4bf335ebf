//! Edit engine against complete executables, in memory and on disk.

use crate::common::{self, Spec};
use machoscope::edit::{HeaderField, SectionField, SegmentField};
use machoscope::store::{persist_container, persist_history, InMemoryStore, MetadataStore};
use machoscope::*;

fn engine(data: Vec<u8>) -> EditEngine {
    EditEngine::from_bytes(data, common::config()).unwrap()
}

fn flags(slice: usize) -> EditTarget {
    EditTarget::Header {
        slice,
        field: HeaderField::Flags,
    }
}

fn data_initprot() -> EditTarget {
    EditTarget::Segment {
        slice: 0,
        segment: 2,
        field: SegmentField::InitProt,
    }
}

#[test]
fn apply_then_undo_restores_bytes() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());

    let record = engine.apply_value(&flags(0), &FieldValue::Uint(0x85)).unwrap();
    assert_eq!(record.status, EditStatus::Applied);
    assert_eq!(record.range, ByteRange::new(24, 4));
    assert_eq!(record.before, 0x0020_0085u32.to_le_bytes());
    assert_eq!(engine.model().unwrap().slices[0].header.flags, 0x85);
    assert_ne!(engine.bytes().unwrap(), original);

    let reverted = engine.undo_edit(record.id).unwrap();
    assert_eq!(reverted.status, EditStatus::Reverted);
    assert_eq!(engine.bytes().unwrap(), original);
    assert_eq!(engine.model().unwrap().slices[0].header.flags, 0x0020_0085);
}

#[test]
fn disjoint_edits_commute() {
    let original = common::executable(Spec::x86_64());
    let a = (flags(0), 0x85u32.to_le_bytes());
    let b = (data_initprot(), 1u32.to_le_bytes());

    let first = engine(original.clone());
    first.apply_edit(&a.0, &a.1).unwrap();
    first.apply_edit(&b.0, &b.1).unwrap();

    let second = engine(original);
    second.apply_edit(&b.0, &b.1).unwrap();
    second.apply_edit(&a.0, &a.1).unwrap();

    assert_eq!(first.bytes().unwrap(), second.bytes().unwrap());
    let seg = &second.model().unwrap().slices[0].segments.segments[2];
    assert_eq!(seg.init_protection, "r--");
}

#[test]
fn rejected_edits_leave_no_trace() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());

    let err = engine.apply_edit(&flags(0), &[0, 0]).unwrap_err();
    assert!(matches!(err, MachoError::SizeMismatch { expected: 4, found: 2 }));
    assert!(err.is_rejection());

    let missing = EditTarget::Section {
        slice: 0,
        segment: 0,
        section: 0,
        field: SectionField::Addr,
    };
    assert!(matches!(
        engine.apply_edit(&missing, &[0; 8]).unwrap_err(),
        MachoError::TargetNotFound(_)
    ));

    assert_eq!(engine.bytes().unwrap(), original);
    assert!(engine.history().unwrap().is_empty());
}

#[test]
fn breaking_the_command_table_rolls_back() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());
    let ncmds = EditTarget::Header {
        slice: 0,
        field: HeaderField::Ncmds,
    };

    let err = engine.apply_value(&ncmds, &FieldValue::Uint(40)).unwrap_err();
    let MachoError::ValidationFailure { edit_id, .. } = err else {
        panic!("expected a validation failure, got {err:?}");
    };
    assert!(err.is_rollback());
    assert_eq!(engine.bytes().unwrap(), original);

    let record = engine.record(edit_id).unwrap().unwrap();
    assert_eq!(record.status, EditStatus::Failed);
    assert!(record.failure.is_some());
    assert_eq!(engine.model().unwrap().slices[0].header.ncmds, common::NCMDS);
}

#[test]
fn section_leaving_the_file_rolls_back() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());
    let offset = EditTarget::Section {
        slice: 0,
        segment: 1,
        section: 0,
        field: SectionField::Offset,
    };

    let err = engine.apply_value(&offset, &FieldValue::Uint(0xffff_0000)).unwrap_err();
    let MachoError::ValidationFailure { edit_id, .. } = err else {
        panic!("expected a validation failure, got {err:?}");
    };
    assert_eq!(engine.bytes().unwrap(), original);
    assert_eq!(engine.record(edit_id).unwrap().unwrap().status, EditStatus::Failed);

    let text = &engine.model().unwrap().slices[0].segments.segments[1].sections[0];
    assert_eq!(u64::from(text.offset), common::DATA_START);
    assert!(text.warnings.is_empty());
}

#[test]
fn section_leaving_its_segment_rolls_back() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());
    let addr = EditTarget::Section {
        slice: 0,
        segment: 1,
        section: 0,
        field: SectionField::Addr,
    };

    let err = engine.apply_value(&addr, &FieldValue::Uint(0x10)).unwrap_err();
    assert!(err.is_rollback());
    assert_eq!(engine.bytes().unwrap(), original);

    // moving it within __TEXT is fine
    let inside = Spec::arm64().base() + 0x800;
    let record = engine.apply_value(&addr, &FieldValue::Uint(inside)).unwrap();
    assert_eq!(record.status, EditStatus::Applied);
    assert_eq!(engine.model().unwrap().slices[0].segments.segments[1].sections[0].addr, inside);
}

#[test]
fn existing_damage_does_not_block_unrelated_edits() {
    let mut data = common::executable(Spec::arm64());
    let model = parse_container(&data, &common::config().parser).unwrap();
    let record = model.slices[0].segments.segments[1].sections[0].record_offset as usize;
    data[record + 48..record + 52].copy_from_slice(&0x00ff_0000u32.to_le_bytes());

    let engine = engine(data);
    let applied = engine.apply_value(&flags(0), &FieldValue::Uint(0x85)).unwrap();
    assert_eq!(applied.status, EditStatus::Applied);
}

#[test]
fn names_are_padded_to_sixteen_bytes() {
    let engine = engine(common::executable(Spec::arm64()));
    let cstring = EditTarget::Section {
        slice: 0,
        segment: 1,
        section: 1,
        field: SectionField::SectName,
    };
    engine
        .apply_value(&cstring, &FieldValue::Name("__strings".to_string()))
        .unwrap();

    let raw = engine.read_field(&cstring).unwrap();
    assert_eq!(raw.len(), 16);
    assert_eq!(&raw[..9], b"__strings");
    assert!(raw[9..].iter().all(|&b| b == 0));
    assert_eq!(engine.model().unwrap().slices[0].segments.segments[1].sections[1].name, "__strings");

    let too_long = FieldValue::Name("__a_very_long_section_name".to_string());
    assert!(matches!(
        engine.apply_value(&cstring, &too_long).unwrap_err(),
        MachoError::SizeMismatch { .. }
    ));
}

#[test]
fn undo_redo_and_history_order() {
    let engine = engine(common::executable(Spec::ppc()));
    let first = engine.apply_value(&flags(0), &FieldValue::Uint(1)).unwrap();
    let second = engine.apply_value(&data_initprot(), &FieldValue::Uint(1)).unwrap();

    // big-endian slice
    assert_eq!(second.after, [0, 0, 0, 1]);

    engine.undo_edit(second.id).unwrap();
    let redone = engine.redo_edit().unwrap().unwrap();
    assert_eq!(redone.redo_of, Some(second.id));
    assert_eq!(redone.after, second.after);
    assert!(engine.redo_edit().unwrap().is_none());

    let ids: Vec<u64> = engine.history().unwrap().iter().map(|r| r.id).collect();
    assert_eq!(ids, [redone.id, second.id, first.id]);

    // the first edit is still undoable; nothing later touches its bytes
    engine.undo_edit(first.id).unwrap();
    assert!(matches!(
        engine.undo_edit(first.id).unwrap_err(),
        MachoError::InvalidEditState { .. }
    ));
}

#[test]
fn redo_refuses_when_a_later_edit_overlaps() {
    let engine = engine(common::executable(Spec::arm64()));
    let first = engine.apply_value(&flags(0), &FieldValue::Uint(1)).unwrap();
    engine.undo_edit(first.id).unwrap();
    let second = engine.apply_value(&flags(0), &FieldValue::Uint(2)).unwrap();

    let err = engine.redo_edit().unwrap_err();
    assert!(matches!(
        err,
        MachoError::ConcurrentEditConflict { edit_id, conflicting_id }
            if edit_id == first.id && conflicting_id == second.id
    ));
    assert_eq!(engine.model().unwrap().slices[0].header.flags, 2);
    assert_eq!(engine.history().unwrap().len(), 2);

    // undoing the blocker makes it the newest revert, and redo picks that up
    engine.undo_edit(second.id).unwrap();
    let redone = engine.redo_edit().unwrap().unwrap();
    assert_eq!(redone.redo_of, Some(second.id));
    assert_eq!(engine.model().unwrap().slices[0].header.flags, 2);
}

#[test]
fn concurrent_edits_are_serialized() {
    let original = common::executable(Spec::arm64());
    let engine = engine(original.clone());

    let mut targets = vec![flags(0)];
    for segment in 0..4 {
        targets.push(EditTarget::Segment {
            slice: 0,
            segment,
            field: SegmentField::InitProt,
        });
    }
    for (segment, section) in [(1, 0), (1, 1), (2, 0), (2, 1)] {
        targets.push(EditTarget::Section {
            slice: 0,
            segment,
            section,
            field: SectionField::Reserved1,
        });
    }

    let records: Vec<EditRecord> = std::thread::scope(|scope| {
        let handles: Vec<_> = targets
            .iter()
            .map(|target| {
                let engine = &engine;
                scope.spawn(move || {
                    let applied = engine.apply_value(target, &FieldValue::Uint(7)).unwrap();
                    engine.undo_edit(applied.id).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(records.iter().all(|r| r.status == EditStatus::Reverted));
    let mut ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), targets.len());
    assert_eq!(engine.history().unwrap().len(), targets.len());
    assert_eq!(engine.bytes().unwrap(), original);
}

#[test]
fn overlapping_later_edit_blocks_undo() {
    let engine = engine(common::executable(Spec::arm64()));
    let first = engine.apply_value(&flags(0), &FieldValue::Uint(1)).unwrap();
    let second = engine.apply_value(&flags(0), &FieldValue::Uint(2)).unwrap();

    let err = engine.undo_edit(first.id).unwrap_err();
    assert!(matches!(
        err,
        MachoError::ConcurrentEditConflict { edit_id, conflicting_id }
            if edit_id == first.id && conflicting_id == second.id
    ));

    engine.undo_edit(second.id).unwrap();
    engine.undo_edit(first.id).unwrap();
    assert_eq!(engine.model().unwrap().slices[0].header.flags, 0x0020_0085);
}

#[test]
fn fat_slices_edit_independently() {
    let original = common::universal();
    let mut config = common::config();
    config.edit.protected_regions = ProtectedRegionPolicy::FatHeader;
    let engine = EditEngine::from_bytes(original.clone(), config).unwrap();

    let record = engine.apply_value(&flags(1), &FieldValue::Uint(0x85)).unwrap();
    let model = engine.model().unwrap();
    let arm = model.slice(1).unwrap();
    assert_eq!(record.range.offset, arm.slice.range.offset + 24);
    assert_eq!(arm.header.flags, 0x85);
    assert_eq!(model.slice(0).unwrap().header.flags, 0x0020_0085);

    let x86 = model.slice(0).unwrap().slice.range;
    let bytes = engine.bytes().unwrap();
    assert_eq!(
        &bytes[x86.offset as usize..x86.end() as usize],
        &original[x86.offset as usize..x86.end() as usize]
    );
    assert_eq!(&bytes[..48], &original[..48]);
}

#[test]
fn custom_protected_region_rejects_edit() {
    let data = common::universal();
    let arm_offset = u32::from_be_bytes(data[36..40].try_into().unwrap()) as u64;
    let mut config = common::config();
    config.edit.protected_regions = ProtectedRegionPolicy::Custom(vec![ByteRange::new(arm_offset, 32)]);
    let engine = EditEngine::from_bytes(data.clone(), config).unwrap();

    let err = engine.apply_value(&flags(1), &FieldValue::Uint(0)).unwrap_err();
    assert!(matches!(err, MachoError::ProtectedRegion { .. }));
    engine.apply_value(&flags(0), &FieldValue::Uint(0)).unwrap();
    assert_eq!(engine.history().unwrap().len(), 1);
}

#[test]
fn file_backed_edits_reach_disk_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello");
    let original = common::executable(Spec::arm64());
    std::fs::write(&path, &original).unwrap();

    let mut config = common::config();
    config.edit.file_backups = true;
    config.edit.backup_dir = Some(dir.path().join("backups"));

    let record = {
        let engine = EditEngine::open(&path, config).unwrap();
        engine.apply_edit(&data_initprot(), &1u32.to_le_bytes()).unwrap()
    };

    let backup = record.backup_path.clone().unwrap();
    assert!(backup.starts_with(dir.path().join("backups")));
    let name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("hello.backup_"));
    assert!(name.ends_with(&format!("_{}", record.id)));
    assert_eq!(std::fs::read(&backup).unwrap(), original);

    let on_disk = std::fs::read(&path).unwrap();
    let at = record.range.offset as usize;
    assert_eq!(&on_disk[at..at + 4], &1u32.to_le_bytes());
    assert_eq!(&on_disk[..at], &original[..at]);
}

#[test]
fn read_only_source_rejects_edits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro");
    std::fs::write(&path, common::executable(Spec::arm64())).unwrap();

    let config = common::config();
    let source = ByteSource::open(&path, IOLimits::from(&config.io)).unwrap();
    let engine = EditEngine::new(source, config).unwrap();
    assert!(matches!(
        engine.apply_value(&flags(0), &FieldValue::Uint(0)).unwrap_err(),
        MachoError::Io(_)
    ));
    assert!(engine.history().unwrap().is_empty());
}

#[test]
fn history_mirrors_into_store() {
    let data = common::executable(Spec::arm64());
    let engine = engine(data.clone());
    let store = InMemoryStore::new();
    let file = persist_container(&store, "hello", None, &data, &engine.model().unwrap()).unwrap();

    let first = engine.apply_value(&flags(0), &FieldValue::Uint(1)).unwrap();
    persist_history(&store, file, &engine.history().unwrap()).unwrap();
    engine.undo_edit(first.id).unwrap();
    persist_history(&store, file, &engine.history().unwrap()).unwrap();

    let logged = store.list_edit_records(file).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].record.status, EditStatus::Reverted);
}

#[test]
fn hex_window_tracks_applied_edits() {
    let mut cfg = common::config();
    cfg.io.max_chunk_size = 8;
    let engine = EditEngine::from_bytes(common::executable(Spec::arm64()), cfg).unwrap();

    let before = engine.hex_range(24, 4).unwrap();
    assert_eq!(before.hex_string(), "85 00 20 00");

    engine.apply_value(&flags(0), &FieldValue::Uint(0x85)).unwrap();
    let after = engine.hex_range(24, 4).unwrap();
    assert_eq!(after.hex_string(), "85 00 00 00");
    let names: Vec<_> = after.interpretations.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["slice[0].header.flags"]);
    assert_eq!(after.interpretations[0].decoded_value, "0x00000085");

    // source limits cap the window
    let capped = engine.hex_range(0, 64).unwrap();
    assert_eq!(capped.raw.len(), 8);
    assert!(capped.is_truncated());
}

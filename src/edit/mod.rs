//! In-place fixed-width edits with backup, verification and undo.
//!
//! An edit never resizes anything: the new value must be exactly as wide
//! as the field it replaces. Rejected edits leave the container untouched;
//! edits that break the structure on re-parse are rolled back.

pub mod backup;
pub mod engine;
pub mod history;
pub mod target;
pub mod verify;

pub use engine::EditEngine;
pub use history::{EditHistory, EditRecord, EditStatus};
pub use target::{
    EditTarget, FieldValue, HeaderField, LoadCommandField, ResolvedTarget, SectionField,
    SegmentField,
};

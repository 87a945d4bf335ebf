//! Append-only edit log.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::edit::target::EditTarget;
use crate::error::{MachoError, Result};
use crate::io::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Pending,
    Applied,
    Reverted,
    Failed,
}

impl EditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStatus::Pending => "pending",
            EditStatus::Applied => "applied",
            EditStatus::Reverted => "reverted",
            EditStatus::Failed => "failed",
        }
    }

    /// pending → applied | failed, applied → reverted
    pub fn can_become(&self, next: EditStatus) -> bool {
        matches!(
            (self, next),
            (EditStatus::Pending, EditStatus::Applied)
                | (EditStatus::Pending, EditStatus::Failed)
                | (EditStatus::Applied, EditStatus::Reverted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EditStatus::Reverted | EditStatus::Failed)
    }
}

impl fmt::Display for EditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edit attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    pub id: u64,
    pub target: EditTarget,
    pub range: ByteRange,
    pub before: Vec<u8>,
    pub after: Vec<u8>,
    pub status: EditStatus,
    pub timestamp: DateTime<Utc>,
    pub backup_path: Option<PathBuf>,
    /// Set when this record re-applies a reverted one
    pub redo_of: Option<u64>,
    pub failure: Option<String>,
}

/// Records in creation order plus the redo cursor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditHistory {
    records: Vec<EditRecord>,
    next_id: u64,
    redo_cursor: Option<u64>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
            redo_cursor: None,
        }
    }

    /// Append a pending record and return its id.
    pub fn begin(
        &mut self,
        target: EditTarget,
        range: ByteRange,
        before: Vec<u8>,
        after: Vec<u8>,
        redo_of: Option<u64>,
    ) -> u64 {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.records.push(EditRecord {
            id,
            target,
            range,
            before,
            after,
            status: EditStatus::Pending,
            timestamp: Utc::now(),
            backup_path: None,
            redo_of,
            failure: None,
        });
        id
    }

    pub fn get(&self, id: u64) -> Option<&EditRecord> {
        // ids are handed out in increasing order
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.records[i])
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut EditRecord> {
        let pos = self
            .records
            .binary_search_by_key(&id, |r| r.id)
            .map_err(|_| MachoError::EditNotFound(id))?;
        Ok(&mut self.records[pos])
    }

    pub(crate) fn set_backup(&mut self, id: u64, path: PathBuf) -> Result<()> {
        self.get_mut(id)?.backup_path = Some(path);
        Ok(())
    }

    /// Move a record along the state machine.
    pub fn transition(&mut self, id: u64, next: EditStatus) -> Result<&EditRecord> {
        let record = self.get_mut(id)?;
        if !record.status.can_become(next) {
            return Err(MachoError::InvalidEditState {
                edit_id: id,
                status: record.status.to_string(),
                expected: match next {
                    EditStatus::Reverted => EditStatus::Applied,
                    _ => EditStatus::Pending,
                }
                .to_string(),
            });
        }
        record.status = next;
        let redo_of = record.redo_of;
        match next {
            EditStatus::Reverted => self.redo_cursor = Some(id),
            EditStatus::Applied if redo_of.is_some() && redo_of == self.redo_cursor => {
                self.redo_cursor = None
            }
            _ => {}
        }
        self.get_mut(id).map(|r| &*r)
    }

    pub(crate) fn fail(&mut self, id: u64, reason: impl Into<String>) -> Result<&EditRecord> {
        self.get_mut(id)?.failure = Some(reason.into());
        self.transition(id, EditStatus::Failed)
    }

    /// First applied record newer than `id` whose range overlaps `range`.
    pub fn later_overlap(&self, id: u64, range: &ByteRange) -> Option<&EditRecord> {
        self.records
            .iter()
            .filter(|r| r.id > id && r.status == EditStatus::Applied)
            .find(|r| r.range.overlaps(range))
    }

    /// The most recently reverted record, if it has not been redone.
    pub fn redo_candidate(&self) -> Option<&EditRecord> {
        self.redo_cursor
            .and_then(|id| self.get(id))
            .filter(|r| r.status == EditStatus::Reverted)
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &EditRecord> {
        self.records.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

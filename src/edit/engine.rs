//! Transactional edit engine.
//!
//! validate → record → backup → write → verify, with automatic rollback.
//! All operations on one container run under a single lock.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::analysis::hex_range::{read_source, HexRange};
use crate::config::{AnalyzerConfig, ProtectedRegionPolicy};
use crate::edit::backup::create_backup;
use crate::edit::history::{EditHistory, EditRecord, EditStatus};
use crate::edit::target::{EditTarget, FieldValue};
use crate::edit::verify::{verify, Baseline};
use crate::error::{MachoError, Result};
use crate::formats::macho::{parse_container, Container};
use crate::io::{ByteRange, ByteSource, IOLimits};

struct EngineState {
    source: ByteSource,
    model: Container,
    history: EditHistory,
}

/// Single-writer editor over one container
pub struct EditEngine {
    config: AnalyzerConfig,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for EditEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EditEngine {
    /// Parse `source` and take ownership of it.
    pub fn new(source: ByteSource, config: AnalyzerConfig) -> Result<Self> {
        let model = parse_container(source.as_bytes(), &config.parser)?;
        Ok(Self {
            config,
            state: Mutex::new(EngineState {
                source,
                model,
                history: EditHistory::new(),
            }),
        })
    }

    /// Edit an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>, config: AnalyzerConfig) -> Result<Self> {
        let source = ByteSource::from_vec(data, IOLimits::from(&config.io))?;
        Self::new(source, config)
    }

    /// Edit a file in place through a writable mapping.
    pub fn open<P: AsRef<Path>>(path: P, config: AnalyzerConfig) -> Result<Self> {
        let source = ByteSource::open_rw(path, IOLimits::from(&config.io))?;
        Self::new(source, config)
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| MachoError::Internal("edit engine lock poisoned".to_string()))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Snapshot of the current structural model.
    pub fn model(&self) -> Result<Container> {
        Ok(self.lock()?.model.clone())
    }

    /// Snapshot of the container bytes.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        Ok(self.lock()?.source.as_bytes().to_vec())
    }

    /// Labelled hex window over the current, possibly edited, bytes.
    pub fn hex_range(&self, offset: u64, length: u64) -> Result<HexRange> {
        let state = self.lock()?;
        read_source(&state.source, &state.model, offset, length)
    }

    /// Current bytes of a field.
    pub fn read_field(&self, target: &EditTarget) -> Result<Vec<u8>> {
        let state = self.lock()?;
        let resolved = target.resolve(&state.model)?;
        Ok(state
            .source
            .read_at(resolved.range.offset, resolved.range.len)?
            .to_vec())
    }

    /// Overwrite `target` with `new_bytes`, which must match the field width.
    pub fn apply_edit(&self, target: &EditTarget, new_bytes: &[u8]) -> Result<EditRecord> {
        let span = crate::span_trace!("apply_edit", target = %target);
        let _enter = span.enter();
        let mut state = self.lock()?;
        self.apply_locked(&mut state, target, new_bytes, None)
    }

    /// Encode `value` against the field layout, then apply it.
    pub fn apply_value(&self, target: &EditTarget, value: &FieldValue) -> Result<EditRecord> {
        let span = crate::span_trace!("apply_edit", target = %target);
        let _enter = span.enter();
        let mut state = self.lock()?;
        let resolved = target.resolve(&state.model)?;
        let bytes = value.encode(&resolved)?;
        self.apply_locked(&mut state, target, &bytes, None)
    }

    /// Restore the bytes an applied edit replaced.
    pub fn undo_edit(&self, edit_id: u64) -> Result<EditRecord> {
        let mut state = self.lock()?;
        let record = state
            .history
            .get(edit_id)
            .cloned()
            .ok_or(MachoError::EditNotFound(edit_id))?;

        if record.status != EditStatus::Applied {
            return Err(MachoError::InvalidEditState {
                edit_id,
                status: record.status.to_string(),
                expected: EditStatus::Applied.to_string(),
            });
        }
        if let Some(later) = state.history.later_overlap(edit_id, &record.range) {
            return Err(MachoError::ConcurrentEditConflict {
                edit_id,
                conflicting_id: later.id,
            });
        }

        state.source.write_at(record.range.offset, &record.before)?;
        if let Err(e) = state.source.flush_range(record.range.offset, record.range.len) {
            // put the applied bytes back so memory, history and model agree again
            warn!(edit_id, error = %e, "Flush failed during undo, keeping the edit applied");
            let kept = state
                .source
                .write_at(record.range.offset, &record.after)
                .and_then(|_| state.source.flush_range(record.range.offset, record.range.len));
            if let Err(restore) = kept {
                self.refresh_model(&mut state);
                return Err(crate::log_error!(MachoError::RollbackFailed {
                    edit_id,
                    message: restore.to_string(),
                }));
            }
            return Err(e.into());
        }
        let reverted = state.history.transition(edit_id, EditStatus::Reverted)?.clone();
        info!(edit_id, target = %record.target, "Edit reverted");
        self.refresh_model(&mut state);
        Ok(reverted)
    }

    /// Re-apply the most recently reverted edit as a new record.
    ///
    /// Returns `Ok(None)` when nothing is waiting to be redone.
    pub fn redo_edit(&self) -> Result<Option<EditRecord>> {
        let mut state = self.lock()?;
        let Some(record) = state.history.redo_candidate().cloned() else {
            return Ok(None);
        };
        if let Some(later) = state.history.later_overlap(record.id, &record.range) {
            return Err(MachoError::ConcurrentEditConflict {
                edit_id: record.id,
                conflicting_id: later.id,
            });
        }
        self.apply_locked(&mut state, &record.target, &record.after, Some(record.id))
            .map(Some)
    }

    /// Every record, newest first.
    pub fn history(&self) -> Result<Vec<EditRecord>> {
        Ok(self.lock()?.history.newest_first().cloned().collect())
    }

    pub fn record(&self, edit_id: u64) -> Result<Option<EditRecord>> {
        Ok(self.lock()?.history.get(edit_id).cloned())
    }

    fn check_protected(&self, model: &Container, range: &ByteRange) -> Result<()> {
        let hit = match &self.config.edit.protected_regions {
            ProtectedRegionPolicy::None => None,
            ProtectedRegionPolicy::FatHeader => model.fat_header_range().filter(|r| r.overlaps(range)),
            ProtectedRegionPolicy::Custom(ranges) => ranges.iter().find(|r| r.overlaps(range)).copied(),
        };
        match hit {
            Some(_) => Err(MachoError::ProtectedRegion {
                offset: range.offset,
                len: range.len,
            }),
            None => Ok(()),
        }
    }

    fn apply_locked(
        &self,
        state: &mut EngineState,
        target: &EditTarget,
        new_bytes: &[u8],
        redo_of: Option<u64>,
    ) -> Result<EditRecord> {
        // 1. validate; nothing is recorded for a rejected edit
        let resolved = target.resolve(&state.model)?;
        let range = resolved.range;
        if new_bytes.len() as u64 != range.len {
            return Err(MachoError::SizeMismatch {
                expected: range.len as usize,
                found: new_bytes.len(),
            });
        }
        if !range.fits_within(state.source.len()) {
            return Err(MachoError::OutOfBoundsOffset {
                offset: range.offset,
                len: range.len,
                size: state.source.len(),
            });
        }
        self.check_protected(&state.model, &range)?;
        if !state.source.is_writable() {
            return Err(MachoError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "byte source is read-only",
            )));
        }
        let baseline = Baseline::capture(&state.model, target.slice_index());

        // 2. record the pending edit
        let before = state.source.read_at(range.offset, range.len)?.to_vec();
        let edit_id = state
            .history
            .begin(*target, range, before.clone(), new_bytes.to_vec(), redo_of);
        debug!(edit_id, target = %target, offset = range.offset, len = range.len, "Edit pending");

        if self.config.edit.file_backups {
            if let Some(path) = state.source.path().map(Path::to_path_buf) {
                match create_backup(&path, self.config.edit.backup_dir.as_deref(), edit_id) {
                    Ok(backup) => state.history.set_backup(edit_id, backup)?,
                    Err(e) => {
                        warn!(edit_id, error = %e, "Backup failed, edit abandoned");
                        state.history.fail(edit_id, format!("backup failed: {}", e))?;
                        return Err(e);
                    }
                }
            }
        }

        // 3. write
        if let Err(e) = state.source.write_at(range.offset, new_bytes) {
            let e = MachoError::from(e);
            state.history.fail(edit_id, e.to_string())?;
            return Err(e);
        }

        // 4. verify, rolling back on failure
        let verified = if self.config.edit.verify_after_apply {
            match verify(state.source.as_bytes(), &self.config.parser, &baseline) {
                Ok(model) => Some(model),
                Err(reason) => {
                    self.roll_back(state, edit_id, range, &before, &reason)?;
                    return Err(MachoError::ValidationFailure { edit_id, reason });
                }
            }
        } else {
            None
        };

        // 5. persist; a failed flush undoes the write like a failed verification
        if let Err(e) = state.source.flush_range(range.offset, range.len) {
            let e = MachoError::from(e);
            self.roll_back(state, edit_id, range, &before, &format!("flush failed: {}", e))?;
            return Err(e);
        }
        match verified {
            Some(model) => state.model = model,
            None => self.refresh_model(state),
        }

        let record = state.history.transition(edit_id, EditStatus::Applied)?.clone();
        info!(edit_id, target = %target, offset = range.offset, redo_of, "Edit applied");
        Ok(record)
    }

    /// Restore `before` over `range` and mark the record failed.
    ///
    /// Err only when the restoring write itself fails.
    fn roll_back(
        &self,
        state: &mut EngineState,
        edit_id: u64,
        range: ByteRange,
        before: &[u8],
        reason: &str,
    ) -> Result<()> {
        let restored = state
            .source
            .write_at(range.offset, before)
            .and_then(|_| state.source.flush_range(range.offset, range.len));
        // fail() only errors for unknown ids, and edit_id came from begin()
        let _ = state.history.fail(edit_id, reason.to_string());
        match restored {
            Ok(()) => {
                warn!(edit_id, offset = range.offset, %reason, "Edit rolled back");
                Ok(())
            }
            Err(e) => {
                error!(edit_id, offset = range.offset, "Rollback failed; container may hold the new bytes");
                self.refresh_model(state);
                Err(crate::log_error!(MachoError::RollbackFailed {
                    edit_id,
                    message: e.to_string(),
                }))
            }
        }
    }

    fn refresh_model(&self, state: &mut EngineState) {
        match parse_container(state.source.as_bytes(), &self.config.parser) {
            Ok(model) => state.model = model,
            Err(e) => warn!(error = %e, "Re-parse failed, keeping previous model"),
        }
    }
}

//! On-disk copies taken before a file-backed container is mutated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::error::{MachoError, Result};

/// `<dir>/<file>.backup_<YYYYmmddHHMMSS>_<edit_id>`; `dir` defaults to the file's own directory.
pub fn backup_path(path: &Path, backup_dir: Option<&Path>, edit_id: u64, at: DateTime<Local>) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| MachoError::Internal(format!("{} has no file name", path.display())))?;
    let mut name = file_name.to_os_string();
    name.push(format!(".backup_{}_{}", at.format("%Y%m%d%H%M%S"), edit_id));

    let dir = match backup_dir {
        Some(dir) => dir.to_path_buf(),
        None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(name))
}

/// Copy `path` aside and return where it went.
pub fn create_backup(path: &Path, backup_dir: Option<&Path>, edit_id: u64) -> Result<PathBuf> {
    let dest = backup_path(path, backup_dir, edit_id, Local::now())?;
    if let Some(dir) = backup_dir {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::copy(path, &dest)?;
    debug!(edit_id, backup = %dest.display(), "Created backup");
    Ok(dest)
}

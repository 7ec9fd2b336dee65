//! Enumerating, locating and deleting archives in the backup directory.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::BackupError;
use super::naming::{is_archive, is_plain_file_name};

/// File names in `backup_dir`, in filesystem order. A missing directory lists as empty.
pub fn list_backups(backup_dir: &Path) -> Result<Vec<String>, BackupError> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Fail with a validation error unless `name` is a plain file currently listed.
pub fn require_listed(backup_dir: &Path, name: &str) -> Result<PathBuf, BackupError> {
    if is_plain_file_name(name) && list_backups(backup_dir)?.iter().any(|b| b == name) {
        Ok(backup_dir.join(name))
    } else {
        Err(BackupError::validation(format!("Backup not found: {}", name)))
    }
}

/// Path of a downloadable archive.
pub fn archive_file_path(backup_dir: &Path, name: &str) -> Result<PathBuf, BackupError> {
    if !is_archive(name) {
        return Err(BackupError::validation("The given file is not a .zip file."));
    }
    let path = backup_dir.join(name);
    if is_plain_file_name(name) && path.is_file() {
        Ok(path)
    } else {
        Err(BackupError::validation("The .zip file does not exist in the backup directory."))
    }
}

/// Outcome of a delete request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub msg: String,
}

/// Report for a removal attempt of `name`; OS errors become the message.
fn delete_outcome(name: &str, removed: std::io::Result<()>) -> DeleteOutcome {
    match removed {
        Ok(()) => {
            log::info!("[Backup] Deleted {}", name);
            DeleteOutcome {
                deleted: true,
                msg: format!("Backup {} was deleted successfully!", name),
            }
        }
        Err(e) => {
            log::warn!("[Backup] Failed to delete {}: {}", name, e);
            DeleteOutcome {
                deleted: false,
                msg: format!("Error while deleting the backup: {}", e),
            }
        }
    }
}

/// Remove a listed archive. OS errors are turned into a message.
pub fn delete_backup(backup_dir: &Path, name: &str) -> Result<DeleteOutcome, BackupError> {
    let path = require_listed(backup_dir, name)?;
    Ok(delete_outcome(name, fs::remove_file(&path)))
}

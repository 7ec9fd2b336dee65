//! Operations on the media root during a restore.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::BackupError;

/// Regular files below `root`, deepest paths first.
fn files_below(root: &Path) -> Result<Vec<PathBuf>, BackupError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).contents_first(true).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Delete every file below `root`. Directories are left in place.
pub fn wipe_files(root: &Path) -> Result<usize, BackupError> {
    let files = files_below(root)?;
    for file in &files {
        fs::remove_file(file)?;
    }
    Ok(files.len())
}

/// Move every file below `root` into `snapshot_dir`, keeping relative paths.
///
/// Stops at the first failure; `moved` then holds the `(from, to)` pairs already done.
fn move_files_tracked(
    root: &Path,
    snapshot_dir: &Path,
    moved: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), BackupError> {
    for file in files_below(root)? {
        let Ok(rel) = file.strip_prefix(root) else {
            continue;
        };
        let target = snapshot_dir.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        move_file(&file, &target)?;
        moved.push((file, target));
    }
    Ok(())
}

pub fn move_files(root: &Path, snapshot_dir: &Path) -> Result<usize, BackupError> {
    let mut moved = Vec::new();
    move_files_tracked(root, snapshot_dir, &mut moved)?;
    Ok(moved.len())
}

/// Undo a partial move. Returns how many files could not be put back.
fn move_back(moved: &[(PathBuf, PathBuf)]) -> usize {
    let mut stranded = 0;
    for (original, moved_to) in moved.iter().rev() {
        if let Err(e) = move_file(moved_to, original) {
            log::error!("[Restore] Could not move {:?} back to {:?}: {}", moved_to, original, e);
            stranded += 1;
        }
    }
    stranded
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), BackupError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

/// Media files set aside before a destructive restore.
pub struct MediaSnapshot {
    media_root: PathBuf,
    dir: PathBuf,
    files: usize,
}

impl MediaSnapshot {
    /// Move all media into `dir`, leaving the media root without files.
    ///
    /// On failure every file already moved is put back and `dir` is removed.
    pub fn take(media_root: &Path, dir: PathBuf) -> Result<Self, BackupError> {
        fs::create_dir_all(&dir)?;

        let mut moved = Vec::new();
        if let Err(e) = move_files_tracked(media_root, &dir, &mut moved) {
            let stranded = move_back(&moved);
            if stranded == 0 {
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    log::warn!("[Restore] Could not remove snapshot {:?}: {}", dir, cleanup);
                }
            } else {
                log::error!("[Restore] {} media files left in snapshot {:?}", stranded, dir);
            }
            return Err(e);
        }

        let files = moved.len();
        log::info!("[Restore] Moved {} media files to snapshot {:?}", files, dir);
        Ok(Self {
            media_root: media_root.to_path_buf(),
            dir,
            files,
        })
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Put the snapshot back after a failed restore. Partially restored media is discarded.
    pub fn roll_back(self) -> Result<usize, BackupError> {
        wipe_files(&self.media_root)?;
        let restored = move_files(&self.dir, &self.media_root)?;
        fs::remove_dir_all(&self.dir)?;
        log::info!("[Restore] Rolled back {} media files from snapshot", restored);
        Ok(restored)
    }

    /// Drop the snapshot after a successful restore.
    pub fn discard(self) -> Result<(), BackupError> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

//! Zip layout of a backup: one top-level SQL dump plus the media tree under
//! `uploaded_files/`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::error::BackupError;
use super::naming::SQL_EXTENSION;

/// Prefix of every media entry inside an archive.
pub const MEDIA_PREFIX: &str = "uploaded_files/";

/// Forward-slash archive path of `file` relative to `root`.
fn relative_entry_path(root: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Relative path below the media root for an archive entry, if it is a safe media entry.
fn media_target(entry_name: &str) -> Option<PathBuf> {
    let rel = entry_name.strip_prefix(MEDIA_PREFIX)?;
    let rel = rel.trim_end_matches('/');
    if rel.is_empty() {
        return None;
    }
    let path = PathBuf::from(rel);
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Some(path)
    } else {
        None
    }
}

/// Claim `zip_path` for a new archive. Fails if the name is already taken.
pub fn create_archive_file(zip_path: &Path) -> Result<File, BackupError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(zip_path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                BackupError::from(io::Error::new(e.kind(), format!("{:?} already exists", zip_path)))
            } else {
                BackupError::from(e)
            }
        })
}

/// Write the archive into `file`: `sql_path` at the top level and every file below
/// `media_root`. Returns the number of media files stored.
pub fn write_archive(file: File, sql_path: &Path, media_root: &Path) -> Result<usize, BackupError> {
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let sql_name = sql_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BackupError::validation("SQL dump path has no file name"))?;
    zip.start_file(sql_name, options.large_file(fs::metadata(sql_path)?.len() >= u32::MAX as u64))?;
    io::copy(&mut File::open(sql_path)?, &mut zip)?;

    let mut media_files = 0;
    if media_root.is_dir() {
        for entry in WalkDir::new(media_root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_entry_path(media_root, entry.path()) else {
                continue;
            };
            let large = entry.metadata()?.len() >= u32::MAX as u64;
            zip.start_file(format!("{}{}", MEDIA_PREFIX, rel), options.large_file(large))?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
            media_files += 1;
        }
    }

    zip.finish()?;
    Ok(media_files)
}

/// Counts from a media extraction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediaExtraction {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
}

/// Read side of a backup archive.
pub struct ArchiveReader {
    archive: ZipArchive<File>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, BackupError> {
        let archive = ZipArchive::new(File::open(path)?)?;
        Ok(Self { archive })
    }

    #[cfg(test)]
    pub fn entry_names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// The top-level SQL dump entry, if the archive has one.
    pub fn sql_entry(&self) -> Option<String> {
        let mut names: Vec<&str> = self
            .archive
            .file_names()
            .filter(|n| n.ends_with(SQL_EXTENSION) && !n.contains('/'))
            .collect();
        names.sort_unstable();
        names.first().map(|n| n.to_string())
    }

    /// Copy one entry's bytes to `dest`.
    pub fn extract_entry(&mut self, name: &str, dest: &Path) -> Result<u64, BackupError> {
        let mut entry = self.archive.by_name(name)?;
        let mut out = File::create(dest)?;
        Ok(io::copy(&mut entry, &mut out)?)
    }

    /// Recreate every `uploaded_files/` entry below `media_root`.
    pub fn extract_media(&mut self, media_root: &Path) -> Result<MediaExtraction, BackupError> {
        let mut stats = MediaExtraction::default();

        for i in 0..self.archive.len() {
            let mut entry = self.archive.by_index(i)?;
            let name = entry.name().to_string();
            if !name.starts_with(MEDIA_PREFIX) {
                continue;
            }
            let Some(rel) = media_target(&name) else {
                if name != MEDIA_PREFIX {
                    log::warn!("[Restore] Skipping unsafe archive entry {:?}", name);
                    stats.skipped += 1;
                }
                continue;
            };
            let target = media_root.join(rel);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                stats.directories += 1;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                stats.files += 1;
            }
        }

        Ok(stats)
    }
}

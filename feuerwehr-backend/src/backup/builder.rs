//! Creating a new archive: dump, zip, clean up.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};

use super::archive::{create_archive_file, write_archive};
use super::error::BackupError;
use super::naming::ArchiveName;
use super::postgres::PgTools;
use crate::config::BackupConfig;
use crate::process::CommandRunner;

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("[Backup] Could not remove {:?}: {}", path, e);
        }
    }
}

/// Dump the database and package it with the media tree.
///
/// Returns the new archive's file name. The intermediate SQL file never outlives
/// this call, and a failed build leaves no zip behind. An existing archive with the
/// same name is never touched.
pub async fn build_archive(
    config: &BackupConfig,
    runner: &dyn CommandRunner,
    at: DateTime<Local>,
) -> Result<String, BackupError> {
    let name = ArchiveName::new(&config.app_version, &at);
    let sql_path = config.backup_dir.join(name.sql_name());
    let zip_name = name.zip_name();
    let zip_path = config.backup_dir.join(&zip_name);

    // claimed before dumping; from here on the zip is ours to clean up
    let zip_file = create_archive_file(&zip_path)?;

    log::info!("[Backup] Dumping database to {:?}", sql_path);
    if let Err(e) = PgTools::new(config, runner).dump(&sql_path).await {
        remove_if_exists(&sql_path);
        remove_if_exists(&zip_path);
        return Err(e);
    }

    let packed = write_archive(zip_file, &sql_path, &config.media_root);
    remove_if_exists(&sql_path);

    match packed {
        Ok(media_files) => {
            log::info!("[Backup] Created {} with {} media files", zip_name, media_files);
            Ok(zip_name)
        }
        Err(e) => {
            remove_if_exists(&zip_path);
            Err(e)
        }
    }
}

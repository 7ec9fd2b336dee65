//! Database + media backups.
//!
//! An archive is a zip named `backup_<version>_<YYYYMMDD_HHMMSS>.zip` in the backup
//! directory, holding a data-only `pg_dump` and the media root under `uploaded_files/`.
//! Archives are plain files; there is no database row for them.
//!
//! ## Concurrency
//!
//! Build, restore and delete share one operation lock, so two requests can never
//! interleave truncation and replay against the same database.

pub mod archive;
pub mod builder;
pub mod error;
pub mod exclusion;
pub mod listing;
pub mod media;
pub mod naming;
pub mod postgres;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;

use crate::config::BackupConfig;
use crate::process::CommandRunner;

pub use error::BackupError;
pub use restore::RestoreReport;

/// Result of a build request. A build never fails towards the caller.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub archive: Option<String>,
    pub msg: String,
    pub backups: Vec<String>,
}

/// Result of a restore that passed validation.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub report: Option<RestoreReport>,
    pub msg: String,
}

impl RestoreOutcome {
    pub fn succeeded(&self) -> bool {
        self.report.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub deleted: bool,
    pub msg: String,
    pub backups: Vec<String>,
}

pub struct BackupService {
    config: BackupConfig,
    runner: Arc<dyn CommandRunner>,
    op_lock: Mutex<()>,
}

impl BackupService {
    pub fn new(config: BackupConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            op_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn list(&self) -> Result<Vec<String>, BackupError> {
        listing::list_backups(&self.config.backup_dir)
    }

    /// Listing for responses: failures are logged and reported as empty.
    pub fn list_or_empty(&self) -> Vec<String> {
        self.list().unwrap_or_else(|e| {
            log::error!("[Backup] Failed to list {:?}: {}", self.config.backup_dir, e);
            Vec::new()
        })
    }

    /// Dump, package and report. Failures become the message.
    pub async fn create_backup(&self) -> BuildOutcome {
        let _guard = self.op_lock.lock().await;

        let (archive, msg) =
            match builder::build_archive(&self.config, self.runner.as_ref(), Local::now()).await {
                Ok(name) => {
                    let msg = format!("Backup {} was created successfully!", name);
                    (Some(name), msg)
                }
                Err(e) => {
                    log::error!("[Backup] Backup failed: {}", e);
                    (None, format!("Error while creating the backup: {}", e))
                }
            };

        BuildOutcome {
            archive,
            msg,
            backups: self.list_or_empty(),
        }
    }

    /// Restore `name`. Only validation problems come back as `Err`.
    pub async fn restore(&self, name: &str) -> Result<RestoreOutcome, BackupError> {
        let _guard = self.op_lock.lock().await;

        let zip_path = restore::validate_archive(&self.config, name)?;
        log::info!("[Restore] Restoring {}", name);

        Ok(
            match restore::restore_archive(&self.config, self.runner.as_ref(), &zip_path).await {
                Ok(report) => {
                    log::info!(
                        "[Restore] {}: sql_replayed={}, tables_truncated={}, media removed={} restored={} dirs={} skipped={}",
                        name,
                        report.sql_replayed,
                        report.tables_truncated,
                        report.media_removed,
                        report.media.files,
                        report.media.directories,
                        report.media.skipped
                    );
                    RestoreOutcome {
                        report: Some(report),
                        msg: format!("Backup {} was restored successfully!", name),
                    }
                }
                Err(e) => RestoreOutcome {
                    report: None,
                    msg: format!("Error while restoring the backup: {}", e),
                },
            },
        )
    }

    /// Delete `name` and return the refreshed listing.
    pub async fn delete(&self, name: &str) -> Result<DeleteResult, BackupError> {
        let _guard = self.op_lock.lock().await;

        let outcome = listing::delete_backup(&self.config.backup_dir, name)?;
        Ok(DeleteResult {
            deleted: outcome.deleted,
            msg: outcome.msg,
            backups: self.list_or_empty(),
        })
    }

    /// Location of a downloadable archive.
    pub fn archive_path(&self, name: &str) -> Result<PathBuf, BackupError> {
        listing::archive_file_path(&self.config.backup_dir, name)
    }
}

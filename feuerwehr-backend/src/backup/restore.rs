//! Restoring an archive over the live database and media root.
//!
//! Order of operations:
//! 1. media root is emptied (or moved into a snapshot when enabled)
//! 2. SQL dump is copied out of the archive
//! 3. all non-excluded tables are truncated
//! 4. the dump is replayed
//! 5. media entries are extracted
//!
//! Without a snapshot, step 1 is not undone when a later step fails.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use super::archive::{ArchiveReader, MediaExtraction};
use super::error::BackupError;
use super::exclusion::truncation_set;
use super::listing::require_listed;
use super::media::{wipe_files, MediaSnapshot};
use super::naming::{is_archive, version_token};
use super::postgres::PgTools;
use crate::config::BackupConfig;
use crate::process::CommandRunner;

/// What a successful restore touched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub sql_replayed: bool,
    pub tables_truncated: usize,
    pub media_removed: usize,
    pub media: MediaExtraction,
}

/// Check a requested name against the listing, extension and running version.
///
/// Runs before anything is modified.
pub fn validate_archive(config: &BackupConfig, name: &str) -> Result<PathBuf, BackupError> {
    let invalid = || BackupError::validation(format!("Backup not found or invalid: {}", name));

    let path = require_listed(&config.backup_dir, name).map_err(|e| match e {
        BackupError::Validation(_) => invalid(),
        other => other,
    })?;
    if !is_archive(name) {
        return Err(invalid());
    }
    if version_token(name) != config.app_version {
        log::warn!(
            "[Restore] Rejecting {}: archive version {:?} does not match running version {:?}",
            name,
            version_token(name),
            config.app_version
        );
        return Err(invalid());
    }
    Ok(path)
}

/// Copy the dump out, truncate, replay. Returns the number of truncated tables.
async fn restore_database(
    config: &BackupConfig,
    runner: &dyn CommandRunner,
    reader: &mut ArchiveReader,
    sql_entry: &str,
) -> Result<usize, BackupError> {
    let file_name = Path::new(sql_entry)
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| BackupError::validation("SQL entry has no file name"))?;
    let local_sql = config.backup_dir.join(file_name);

    let tools = PgTools::new(config, runner);
    let result = async {
        reader.extract_entry(sql_entry, &local_sql)?;
        let live = tools.list_tables().await?;
        let tables = truncation_set(&live);
        log::info!(
            "[Restore] Truncating {} of {} tables before replay",
            tables.len(),
            live.len()
        );
        tools.truncate(&tables).await?;
        tools.replay(&local_sql).await?;
        Ok::<usize, BackupError>(tables.len())
    }
    .await;

    if let Err(e) = fs::remove_file(&local_sql) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("[Restore] Could not remove {:?}: {}", local_sql, e);
        }
    }
    result
}

async fn apply_archive(
    config: &BackupConfig,
    runner: &dyn CommandRunner,
    zip_path: &Path,
    report: &mut RestoreReport,
) -> Result<(), BackupError> {
    let mut reader = ArchiveReader::open(zip_path)?;

    match reader.sql_entry() {
        Some(entry) => {
            report.tables_truncated = restore_database(config, runner, &mut reader, &entry).await?;
            report.sql_replayed = true;
        }
        None => log::warn!("[Restore] {:?} contains no SQL dump, restoring media only", zip_path),
    }

    report.media = reader.extract_media(&config.media_root)?;
    Ok(())
}

/// Restore an already validated archive.
pub async fn restore_archive(
    config: &BackupConfig,
    runner: &dyn CommandRunner,
    zip_path: &Path,
) -> Result<RestoreReport, BackupError> {
    let mut report = RestoreReport::default();

    let snapshot = if config.snapshot_media {
        let dir = config
            .backup_dir
            .join(format!(".media_snapshot_{}", Local::now().format("%Y%m%d_%H%M%S")));
        let snapshot = MediaSnapshot::take(&config.media_root, dir)?;
        report.media_removed = snapshot.file_count();
        Some(snapshot)
    } else {
        report.media_removed = wipe_files(&config.media_root)?;
        log::info!("[Restore] Removed {} media files", report.media_removed);
        None
    };

    match apply_archive(config, runner, zip_path, &mut report).await {
        Ok(()) => {
            if let Some(snapshot) = snapshot {
                if let Err(e) = snapshot.discard() {
                    log::warn!("[Restore] Could not remove media snapshot: {}", e);
                }
            }
            log::info!(
                "[Restore] Restored {:?}: {} tables truncated, {} media files",
                zip_path.file_name().unwrap_or_default(),
                report.tables_truncated,
                report.media.files
            );
            Ok(report)
        }
        Err(e) => {
            log::error!("[Restore] Restore of {:?} failed: {}", zip_path, e);
            if let Some(snapshot) = snapshot {
                if let Err(rollback_err) = snapshot.roll_back() {
                    log::error!("[Restore] Media rollback failed: {}", rollback_err);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::tests::write_test_zip;
    use crate::process::mock::MockCommandRunner;
    use crate::process::{CommandOutput, CommandSpec};
    use tempfile::tempdir;

    fn setup(version: &str) -> (tempfile::TempDir, BackupConfig) {
        let dir = tempdir().unwrap();
        let cfg = BackupConfig::with_dirs(&dir.path().join("backups"), &dir.path().join("media"), version);
        cfg.ensure_dirs().unwrap();
        (dir, cfg)
    }

    fn truncate_calls(calls: &[CommandSpec]) -> Vec<String> {
        calls
            .iter()
            .filter_map(|c| c.arg_after("--command"))
            .filter(|c| c.starts_with("TRUNCATE"))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_validate_rejects_unknown_name() {
        let (_dir, cfg) = setup("test");
        let err = validate_archive(&cfg, "backup_unknown.zip").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_rejects_non_zip() {
        let (_dir, cfg) = setup("test");
        fs::write(cfg.backup_dir.join("backup_test_1.sql"), "x").unwrap();
        assert!(validate_archive(&cfg, "backup_test_1.sql").unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_rejects_version_mismatch() {
        let (_dir, cfg) = setup("2.0");
        fs::write(cfg.backup_dir.join("backup_1.9_20260101_000000.zip"), "x").unwrap();
        assert!(validate_archive(&cfg, "backup_1.9_20260101_000000.zip")
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_validate_accepts_matching_archive() {
        let (_dir, cfg) = setup("test");
        fs::write(cfg.backup_dir.join("backup_test_20260101.zip"), "x").unwrap();
        let path = validate_archive(&cfg, "backup_test_20260101.zip").unwrap();
        assert_eq!(path, cfg.backup_dir.join("backup_test_20260101.zip"));
    }

    #[tokio::test]
    async fn test_restore_truncates_replays_and_extracts() {
        let (_dir, cfg) = setup("test");
        fs::write(cfg.media_root.join("old.txt"), "old").unwrap();
        let zip = cfg.backup_dir.join("backup_test_20260101.zip");
        write_test_zip(&zip, &[("dump.sql", "-- sql"), ("uploaded_files/new.txt", "new-content")]);
        let runner = MockCommandRunner::succeeding(&["test_table", "auth_group"]);

        let report = restore_archive(&cfg, &runner, &zip).await.unwrap();

        assert!(report.sql_replayed);
        assert_eq!(report.tables_truncated, 1);
        assert_eq!(report.media_removed, 1);
        assert_eq!(report.media.files, 1);
        assert!(!cfg.media_root.join("old.txt").exists());
        assert_eq!(fs::read_to_string(cfg.media_root.join("new.txt")).unwrap(), "new-content");
        assert!(!cfg.backup_dir.join("dump.sql").exists());

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            truncate_calls(&calls),
            vec!["TRUNCATE TABLE \"public\".\"test_table\" RESTART IDENTITY CASCADE;".to_string()]
        );
        assert!(calls[2].arg_after("--file").unwrap().ends_with("dump.sql"));
    }

    #[tokio::test]
    async fn test_restore_skips_truncate_when_only_excluded_tables() {
        let (_dir, cfg) = setup("test");
        let zip = cfg.backup_dir.join("backup_test_1.zip");
        write_test_zip(&zip, &[("dump.sql", "-- sql")]);
        let runner = MockCommandRunner::succeeding(&["auth_group", "django_session"]);

        let report = restore_archive(&cfg, &runner, &zip).await.unwrap();
        assert_eq!(report.tables_truncated, 0);
        assert!(truncate_calls(&runner.calls()).is_empty());
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_sql_only_restores_media() {
        let (_dir, cfg) = setup("test");
        let zip = cfg.backup_dir.join("backup_test_1.zip");
        write_test_zip(&zip, &[("uploaded_files/a.txt", "a")]);
        let runner = MockCommandRunner::succeeding(&["x"]);

        let report = restore_archive(&cfg, &runner, &zip).await.unwrap();
        assert!(!report.sql_replayed);
        assert!(runner.calls().is_empty());
        assert!(cfg.media_root.join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_replay_failure_leaves_media_wiped() {
        let (_dir, cfg) = setup("test");
        fs::write(cfg.media_root.join("old.txt"), "old").unwrap();
        let zip = cfg.backup_dir.join("backup_test_1.zip");
        write_test_zip(
            &zip,
            &[
                ("dump.sql", "-- sql"),
                ("uploaded_files/", ""),
                ("uploaded_files/subdir/", ""),
                ("uploaded_files/subdir/new.txt", "new"),
            ],
        );
        let runner = MockCommandRunner::new(|spec| {
            let replay = spec.arg_after("--file").is_some();
            Ok(CommandOutput {
                stdout: "t1\n".to_string(),
                stderr: if replay { "ERROR: syntax error".to_string() } else { String::new() },
                exit_code: Some(if replay { 3 } else { 0 }),
            })
        });

        let err = restore_archive(&cfg, &runner, &zip).await.unwrap_err();
        assert!(matches!(err, BackupError::ExternalTool { exit_code: Some(3), .. }));
        assert!(!cfg.media_root.join("old.txt").exists());
        assert!(!cfg.media_root.join("subdir/new.txt").exists());
        assert!(!cfg.backup_dir.join("dump.sql").exists());
    }

    #[tokio::test]
    async fn test_broken_sql_entry_leaves_no_local_copy() {
        use std::io::Write;
        use zip::write::FileOptions;
        use zip::{CompressionMethod, ZipWriter};

        let (_dir, cfg) = setup("test");
        let zip_path = cfg.backup_dir.join("backup_test_1.zip");
        let mut zip = ZipWriter::new(fs::File::create(&zip_path).unwrap());
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("dump.sql", stored).unwrap();
        zip.write_all(b"-- sql replay marker").unwrap();
        zip.finish().unwrap();

        // flip the stored bytes so the checksum fails after the data was copied
        let mut bytes = fs::read(&zip_path).unwrap();
        let at = bytes.windows(6).position(|w| w == b"marker").unwrap();
        bytes[at..at + 6].copy_from_slice(b"MARKER");
        fs::write(&zip_path, bytes).unwrap();

        let runner = MockCommandRunner::succeeding(&["t1"]);
        let err = restore_archive(&cfg, &runner, &zip_path).await.unwrap_err();

        assert!(matches!(err, BackupError::Filesystem(_)));
        assert!(!cfg.backup_dir.join("dump.sql").exists());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_rolls_media_back_on_failure() {
        let (_dir, mut cfg) = setup("test");
        cfg.snapshot_media = true;
        fs::write(cfg.media_root.join("old.txt"), "old").unwrap();
        let zip = cfg.backup_dir.join("backup_test_1.zip");
        write_test_zip(&zip, &[("dump.sql", "-- sql"), ("uploaded_files/new.txt", "new")]);
        let runner = MockCommandRunner::failing(1, "psql: error: connection refused");

        restore_archive(&cfg, &runner, &zip).await.unwrap_err();

        assert_eq!(fs::read_to_string(cfg.media_root.join("old.txt")).unwrap(), "old");
        assert!(!cfg.media_root.join("new.txt").exists());
        let leftovers: Vec<_> = fs::read_dir(&cfg.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".media_snapshot_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_discarded_on_success() {
        let (_dir, mut cfg) = setup("test");
        cfg.snapshot_media = true;
        fs::write(cfg.media_root.join("old.txt"), "old").unwrap();
        let zip = cfg.backup_dir.join("backup_test_1.zip");
        write_test_zip(&zip, &[("dump.sql", "-- sql"), ("uploaded_files/new.txt", "new")]);
        let runner = MockCommandRunner::succeeding(&["t1"]);

        let report = restore_archive(&cfg, &runner, &zip).await.unwrap();
        assert_eq!(report.media_removed, 1);
        assert!(!cfg.media_root.join("old.txt").exists());
        assert!(cfg.media_root.join("new.txt").exists());
        let mut names: Vec<String> = fs::read_dir(&cfg.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["backup_test_1.zip".to_string()]);
    }
}

//! Archive naming contract: `backup_<version>_<YYYYMMDD_HHMMSS>.zip`.

use chrono::{DateTime, TimeZone};

pub const ARCHIVE_PREFIX: &str = "backup";
pub const ARCHIVE_EXTENSION: &str = ".zip";
pub const SQL_EXTENSION: &str = ".sql";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Stem shared by the zip archive and the SQL dump inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    stem: String,
}

impl ArchiveName {
    pub fn new<Tz>(version: &str, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            stem: format!("{}_{}_{}", ARCHIVE_PREFIX, version, at.format(TIMESTAMP_FORMAT)),
        }
    }

    pub fn zip_name(&self) -> String {
        format!("{}{}", self.stem, ARCHIVE_EXTENSION)
    }

    pub fn sql_name(&self) -> String {
        format!("{}{}", self.stem, SQL_EXTENSION)
    }
}

/// Second `_`-delimited segment of an archive name, or `""` if there is none.
pub fn version_token(name: &str) -> &str {
    name.split('_').nth(1).unwrap_or("")
}

pub fn is_archive(name: &str) -> bool {
    name.ends_with(ARCHIVE_EXTENSION)
}

/// A bare file name: no separators, no parent references, not empty.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

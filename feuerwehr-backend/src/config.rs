use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const BIND_ADDRESS: &str = "BIND_ADDRESS";
    pub const API_URL: &str = "API_URL";
    pub const AUTH_DATABASE_URL: &str = "AUTH_DATABASE_URL";
    pub const ADMIN_TOKEN: &str = "ADMIN_TOKEN";
    pub const ADMIN_USERNAME: &str = "ADMIN_USERNAME";
    pub const VERSION: &str = "VERSION";
    pub const BACKUP_DIR: &str = "BACKUP_DIR";
    pub const MEDIA_ROOT: &str = "MEDIA_ROOT";
    pub const POSTGRES_HOST: &str = "POSTGRES_HOST";
    pub const POSTGRES_USER: &str = "POSTGRES_USER";
    pub const POSTGRES_DB: &str = "POSTGRES_DB";
    pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
    pub const PG_DUMP_BIN: &str = "PG_DUMP_BIN";
    pub const PSQL_BIN: &str = "PSQL_BIN";
    pub const BACKUP_COMMAND_TIMEOUT_SECS: &str = "BACKUP_COMMAND_TIMEOUT_SECS";
    pub const BACKUP_SNAPSHOT_MEDIA: &str = "BACKUP_SNAPSHOT_MEDIA";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8080;
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const API_URL: &str = "/api/v1";
    pub const AUTH_DATABASE_URL: &str = "./.db/auth.db";
    pub const ADMIN_USERNAME: &str = "admin";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const BACKUP_DIR: &str = "/app/backups/";
    pub const MEDIA_ROOT: &str = "/app/mediafiles/";
    pub const POSTGRES_HOST: &str = "localhost";
    pub const POSTGRES_USER: &str = "postgres";
    pub const POSTGRES_DB: &str = "postgres";
    pub const PG_DUMP_BIN: &str = "pg_dump";
    pub const PSQL_BIN: &str = "psql";
    pub const BACKUP_COMMAND_TIMEOUT_SECS: u64 = 600;
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_number<T: std::str::FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Connection parameters handed to pg_dump / psql.
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub host: String,
    pub user: String,
    pub database: String,
    pub password: String,
}

impl PostgresConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or(env_vars::POSTGRES_HOST, defaults::POSTGRES_HOST),
            user: env_or(env_vars::POSTGRES_USER, defaults::POSTGRES_USER),
            database: env_or(env_vars::POSTGRES_DB, defaults::POSTGRES_DB),
            password: env::var(env_vars::POSTGRES_PASSWORD).unwrap_or_default(),
        }
    }
}

/// Everything the backup pipeline needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    pub media_root: PathBuf,
    /// Version of the running application, embedded in every archive name
    pub app_version: String,
    pub postgres: PostgresConfig,
    pub pg_dump_bin: String,
    pub psql_bin: String,
    /// Upper bound for a single pg_dump / psql invocation
    pub command_timeout: Duration,
    /// Move media aside before a restore and put it back if the restore fails
    pub snapshot_media: bool,
}

impl BackupConfig {
    pub fn from_env() -> Self {
        Self {
            backup_dir: PathBuf::from(env_or(env_vars::BACKUP_DIR, defaults::BACKUP_DIR)),
            media_root: PathBuf::from(env_or(env_vars::MEDIA_ROOT, defaults::MEDIA_ROOT)),
            app_version: env_or(env_vars::VERSION, defaults::VERSION),
            postgres: PostgresConfig::from_env(),
            pg_dump_bin: env_or(env_vars::PG_DUMP_BIN, defaults::PG_DUMP_BIN),
            psql_bin: env_or(env_vars::PSQL_BIN, defaults::PSQL_BIN),
            command_timeout: Duration::from_secs(env_number(
                env_vars::BACKUP_COMMAND_TIMEOUT_SECS,
                defaults::BACKUP_COMMAND_TIMEOUT_SECS,
            )),
            snapshot_media: env_flag(env_vars::BACKUP_SNAPSHOT_MEDIA),
        }
    }

    /// Config rooted in two arbitrary directories, used by tests and tooling.
    pub fn with_dirs(backup_dir: &Path, media_root: &Path, app_version: &str) -> Self {
        Self {
            backup_dir: backup_dir.to_path_buf(),
            media_root: media_root.to_path_buf(),
            app_version: app_version.to_string(),
            postgres: PostgresConfig {
                host: defaults::POSTGRES_HOST.to_string(),
                user: defaults::POSTGRES_USER.to_string(),
                database: defaults::POSTGRES_DB.to_string(),
                password: String::new(),
            },
            pg_dump_bin: defaults::PG_DUMP_BIN.to_string(),
            psql_bin: defaults::PSQL_BIN.to_string(),
            command_timeout: Duration::from_secs(defaults::BACKUP_COMMAND_TIMEOUT_SECS),
            snapshot_media: false,
        }
    }

    /// Create the backup directory and media root if they don't exist yet
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.backup_dir)?;
        std::fs::create_dir_all(&self.media_root)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    /// Prefix for all API routes, without trailing slash
    pub api_prefix: String,
    pub auth_database_url: String,
    pub admin_token: Option<String>,
    pub admin_username: String,
    pub backup: BackupConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let api_prefix = env_or(env_vars::API_URL, defaults::API_URL);
        let api_prefix = format!("/{}", api_prefix.trim_matches('/'));

        Self {
            port: env_number(env_vars::PORT, defaults::PORT),
            bind_address: env_or(env_vars::BIND_ADDRESS, defaults::BIND_ADDRESS),
            api_prefix,
            auth_database_url: env_or(env_vars::AUTH_DATABASE_URL, defaults::AUTH_DATABASE_URL),
            admin_token: env::var(env_vars::ADMIN_TOKEN)
                .ok()
                .filter(|t| !t.trim().is_empty()),
            admin_username: env_or(env_vars::ADMIN_USERNAME, defaults::ADMIN_USERNAME),
            backup: BackupConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_dirs_keeps_safe_defaults() {
        let cfg = BackupConfig::with_dirs(Path::new("/tmp/b"), Path::new("/tmp/m"), "2.1");
        assert_eq!(cfg.backup_dir, PathBuf::from("/tmp/b"));
        assert_eq!(cfg.media_root, PathBuf::from("/tmp/m"));
        assert_eq!(cfg.app_version, "2.1");
        assert_eq!(cfg.pg_dump_bin, "pg_dump");
        assert_eq!(cfg.psql_bin, "psql");
        assert!(!cfg.snapshot_media);
        assert_eq!(cfg.command_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_ensure_dirs_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BackupConfig::with_dirs(
            &dir.path().join("backups"),
            &dir.path().join("media/nested"),
            "1",
        );
        cfg.ensure_dirs().unwrap();
        assert!(cfg.backup_dir.is_dir());
        assert!(cfg.media_root.is_dir());
    }
}

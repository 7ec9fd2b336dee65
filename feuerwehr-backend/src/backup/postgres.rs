//! pg_dump / psql invocations used by backup and restore.

use std::path::Path;

use super::error::BackupError;
use super::exclusion::{truncate_statement, EXCLUDED_TABLES};
use crate::config::BackupConfig;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

const LIST_TABLES_SQL: &str = "SELECT tablename FROM pg_tables WHERE schemaname = 'public';";

/// Builds and runs the database tools against the configured server.
pub struct PgTools<'a> {
    config: &'a BackupConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> PgTools<'a> {
    pub fn new(config: &'a BackupConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    fn base(&self, program: &str) -> CommandSpec {
        let pg = &self.config.postgres;
        CommandSpec::new(program)
            .args(["--host", pg.host.as_str()])
            .args(["--username", pg.user.as_str()])
            .args(["--dbname", pg.database.as_str()])
            .env("PGPASSWORD", pg.password.as_str())
    }

    /// Data-only dump of everything except the excluded tables.
    pub fn dump_command(&self, sql_path: &Path) -> CommandSpec {
        let mut spec = self
            .base(&self.config.pg_dump_bin)
            .args(["--encoding=UTF8", "--data-only", "--no-owner", "--no-acl"]);
        for table in EXCLUDED_TABLES {
            // One flag per table, pg_dump treats a combined pattern differently
            spec = spec.arg("--exclude-table").arg(format!("public.{}", table));
        }
        spec.arg("--file").arg(sql_path.to_string_lossy())
    }

    pub fn list_tables_command(&self) -> CommandSpec {
        self.base(&self.config.psql_bin)
            .args(["--no-align", "--tuples-only", "--command", LIST_TABLES_SQL])
    }

    pub fn truncate_command(&self, statement: &str) -> CommandSpec {
        self.base(&self.config.psql_bin)
            .args(["--command", statement])
    }

    pub fn replay_command(&self, sql_path: &Path) -> CommandSpec {
        self.base(&self.config.psql_bin)
            .args(["--set", "ON_ERROR_STOP=1", "--file"])
            .arg(sql_path.to_string_lossy())
    }

    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, BackupError> {
        let output = self.runner.run(spec).await?;
        if output.success() {
            Ok(output)
        } else {
            log::warn!(
                "{} exited with {:?}: {}",
                spec.program,
                output.exit_code,
                output.stderr.trim()
            );
            Err(BackupError::ExternalTool {
                tool: spec.program.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    pub async fn dump(&self, sql_path: &Path) -> Result<(), BackupError> {
        self.run_checked(&self.dump_command(sql_path)).await.map(|_| ())
    }

    /// Names of all tables in the public schema.
    pub async fn list_tables(&self) -> Result<Vec<String>, BackupError> {
        let output = self.run_checked(&self.list_tables_command()).await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Empty the given tables; a no-op for an empty set.
    pub async fn truncate(&self, tables: &[String]) -> Result<(), BackupError> {
        match truncate_statement(tables) {
            Some(statement) => self
                .run_checked(&self.truncate_command(&statement))
                .await
                .map(|_| ()),
            None => Ok(()),
        }
    }

    pub async fn replay(&self, sql_path: &Path) -> Result<(), BackupError> {
        self.run_checked(&self.replay_command(sql_path)).await.map(|_| ())
    }
}

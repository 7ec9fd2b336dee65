//! External command execution.
//!
//! Backup and restore shell out to `pg_dump` and `psql`. Everything goes through
//! [`CommandRunner`] so the pipeline can be driven by a scripted runner in tests.

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// A fully specified invocation: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited process environment
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Value following `flag` in the argument list, if any.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {} seconds", .after.as_secs())]
    Timeout { program: String, after: Duration },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as child processes of the server.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        // Arguments only, the password travels in env and must not hit the log
        log::info!(
            "Executing {} with {} args (timeout: {}s)",
            spec.program,
            spec.args.len(),
            self.timeout.as_secs()
        );
        let start = Instant::now();

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandError::Spawn {
                    program: spec.program.clone(),
                    source: e,
                })
            }
            Err(_) => {
                return Err(CommandError::Timeout {
                    program: spec.program.clone(),
                    after: self.timeout,
                })
            }
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };

        log::info!(
            "{} finished: exit_code={:?}, duration={}ms",
            spec.program,
            result.exit_code,
            start.elapsed().as_millis()
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_after_finds_flag_value() {
        let spec = CommandSpec::new("psql")
            .args(["--host", "db", "--file", "/tmp/x.sql"])
            .env("PGPASSWORD", "secret");
        assert_eq!(spec.arg_after("--file"), Some("/tmp/x.sql"));
        assert_eq!(spec.arg_after("--host"), Some("db"));
        assert_eq!(spec.arg_after("--command"), None);
        assert_eq!(spec.env, vec![("PGPASSWORD".to_string(), "secret".to_string())]);
    }

    #[test]
    fn test_output_success_requires_zero_exit() {
        let ok = CommandOutput { exit_code: Some(0), ..Default::default() };
        let failed = CommandOutput { exit_code: Some(1), ..Default::default() };
        let killed = CommandOutput { exit_code: None, ..Default::default() };
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_captures_output_and_exit_code() {
        let runner = TokioCommandRunner::new(Duration::from_secs(10));
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_passes_extra_env() {
        let runner = TokioCommandRunner::new(Duration::from_secs(10));
        let spec = CommandSpec::new("sh")
            .args(["-c", "printf %s \"$PGPASSWORD\""])
            .env("PGPASSWORD", "hunter2");
        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stdout, "hunter2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tokio_runner_times_out() {
        let runner = TokioCommandRunner::new(Duration::from_millis(200));
        let spec = CommandSpec::new("sleep").arg("5");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_tokio_runner_reports_missing_program() {
        let runner = TokioCommandRunner::new(Duration::from_secs(5));
        let spec = CommandSpec::new("definitely-not-a-real-binary-4711");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}

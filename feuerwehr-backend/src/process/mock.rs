//! Scripted command runner for tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{CommandError, CommandOutput, CommandRunner, CommandSpec};

type Responder = dyn Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync;

/// Answers every invocation with a closure and records what was run.
#[derive(Clone)]
pub struct MockCommandRunner {
    responder: Arc<Responder>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl MockCommandRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command exits 0. A `--file` target of pg_dump gets a small SQL body,
    /// the pg_tables query answers with `tables`.
    pub fn succeeding(tables: &[&str]) -> Self {
        let listing = tables.join("\n");
        Self::new(move |spec| {
            if spec.program == "pg_dump" {
                if let Some(path) = spec.arg_after("--file") {
                    std::fs::write(path, "-- sql dump\n").map_err(|e| CommandError::Spawn {
                        program: spec.program.clone(),
                        source: e,
                    })?;
                }
            }
            let is_listing = spec
                .arg_after("--command")
                .map(|c| c.contains("FROM pg_tables"))
                .unwrap_or(false);
            Ok(CommandOutput {
                stdout: if is_listing { format!("{}\n", listing) } else { String::new() },
                stderr: String::new(),
                exit_code: Some(0),
            })
        })
    }

    /// Every command exits with `code` and prints `stderr`.
    pub fn failing(code: i32, stderr: &str) -> Self {
        let stderr = stderr.to_string();
        Self::new(move |_| {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: stderr.clone(),
                exit_code: Some(code),
            })
        })
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.responder)(spec)
    }
}

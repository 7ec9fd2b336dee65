use std::io;

use crate::process::CommandError;

/// Everything that can go wrong while building, restoring or deleting an archive.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Request rejected before anything was touched
    #[error("{0}")]
    Validation(String),

    #[error("{tool} failed (exit code {}): {}", exit_code_label(.exit_code), .stderr.trim())]
    ExternalTool {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("could not start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("filesystem error: {0}")]
    Filesystem(#[from] io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("media tree could not be walked: {0}")]
    Walk(#[from] walkdir::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl BackupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Validation failures map to 4xx, everything else is reported as a message.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<CommandError> for BackupError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { program, source } => Self::Spawn {
                tool: program,
                source,
            },
            CommandError::Timeout { program, after } => Self::Timeout {
                tool: program,
                secs: after.as_secs(),
            },
        }
    }
}

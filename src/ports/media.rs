use crate::domain::av::{CommandLine, MediaInfo};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },
    #[error("cannot probe {path}: {reason}")]
    Probe { path: String, reason: String },
}

/// Combined stdout and stderr of a finished tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub output: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Resolution and audio presence of a local media file.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolError>;

    /// Run to completion inside `workdir`. A non-zero exit is an error.
    async fn run(&self, command: &CommandLine, workdir: &Path) -> Result<ToolOutput, ToolError>;
}

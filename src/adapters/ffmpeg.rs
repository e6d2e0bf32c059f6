use crate::domain::av::{parse_probe, CommandLine, MediaInfo};
use crate::ports::media::{MediaTools, ToolError, ToolOutput};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs the ffmpeg/ffprobe binaries found at the configured paths.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Point commands built for `ffmpeg` at the configured binary.
    fn resolve(&self, command: &CommandLine) -> CommandLine {
        if command.program == crate::domain::av::command::FFMPEG {
            command.clone().with_program(self.ffmpeg.clone())
        } else {
            command.clone()
        }
    }
}

#[async_trait]
impl MediaTools for Ffmpeg {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ToolError> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: self.ffprobe.clone(),
                source,
            })?;

        let probe_error = |reason: String| ToolError::Probe {
            path: path.display().to_string(),
            reason,
        };
        if !output.status.success() {
            return Err(probe_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_probe(&output.stdout).map_err(|e| probe_error(e.to_string()))
    }

    async fn run(&self, command: &CommandLine, workdir: &Path) -> Result<ToolOutput, ToolError> {
        let command = self.resolve(command);
        debug!(
            program = %command.program,
            args = %command,
            workdir = %workdir.display(),
            "running"
        );

        let output = command
            .to_command()
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: command.program,
                status: output.status.to_string(),
                output: combined,
            });
        }
        Ok(ToolOutput { output: combined })
    }
}

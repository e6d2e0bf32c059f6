//! Broker-driven HLS encoder.
//!
//! One delivery at a time: fetch the source, probe it, pick the rendition
//! ladder, transcode, upload the playlists and segments, then report a
//! terminal status on `VideoEncoded` before acknowledging the delivery.

use crate::domain::av::command::silent_audio_output;
use crate::domain::av::{
    build_hls_command, silent_audio_command, CommandLine, LadderError, RenditionLadder,
};
use crate::domain::video::{VideoEvent, VideoStatus, VIDEO_ENCODED, VIDEO_UPLOADED};
use crate::ports::channel::{ChannelError, Delivery, DeliveryStream, MessageChannel};
use crate::ports::media::{MediaTools, ToolError, ToolOutput};
use crate::ports::storage::{ObjectStore, StorageError};
use futures::StreamExt;
use prost::Message;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Artifacts worth publishing: playlists and transport stream segments.
const RENDITION_EXTENSIONS: [&str; 2] = ["m3u8", "ts"];

/// Child of the configured work directory holding the delivery in progress.
const SCRATCH_DIR: &str = "encoder-processing-dir";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid source name {0:?}")]
    InvalidSource(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Ladder(#[from] LadderError),
    #[error("encode timed out after {0:?}")]
    TimedOut(Duration),
    #[error("scratch directory error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct EncodeSettings {
    /// Parent of the scratch directory; only [`SCRATCH_DIR`] inside it is ever removed
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
    /// Pause before re-subscribing when the consume stream ends
    pub resubscribe_delay: Duration,
}

impl EncodeSettings {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: None,
            resubscribe_delay: Duration::from_secs(1),
        }
    }

    /// Directory a delivery is processed in, wiped after every delivery.
    pub fn scratch_dir(&self) -> PathBuf {
        self.workdir.join(SCRATCH_DIR)
    }
}

pub struct EncodeWorker<S, C, T> {
    storage: S,
    channel: C,
    tools: T,
    settings: EncodeSettings,
}

impl<S, C, T> EncodeWorker<S, C, T>
where
    S: ObjectStore,
    C: MessageChannel,
    T: MediaTools,
{
    pub fn new(storage: S, channel: C, tools: T, settings: EncodeSettings) -> Self {
        Self {
            storage,
            channel,
            tools,
            settings,
        }
    }

    /// Consume `VideoUploaded` forever, re-subscribing whenever the stream ends.
    pub async fn run(&self) {
        info!(workdir = %self.settings.workdir.display(), "encoder started");
        loop {
            match self.subscribe().await {
                Ok(mut deliveries) => {
                    while let Some(delivery) = deliveries.next().await {
                        self.handle_delivery(delivery).await;
                    }
                    warn!("delivery stream closed, re-subscribing");
                }
                Err(e) => error!(error = %e, "cannot subscribe to {}", VIDEO_UPLOADED),
            }
            tokio::time::sleep(self.settings.resubscribe_delay).await;
        }
    }

    async fn subscribe(&self) -> Result<DeliveryStream, ChannelError> {
        self.channel.declare_topic(VIDEO_UPLOADED).await?;
        self.channel.declare_topic(VIDEO_ENCODED).await?;
        self.channel.consume(VIDEO_UPLOADED).await
    }

    /// Encode one delivery and settle it.
    ///
    /// Undecodable payloads are dropped without requeue. Otherwise exactly one
    /// status is published and the delivery is acked after it. When the status
    /// cannot be published the delivery is left unsettled for redelivery.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        let event = match VideoEvent::decode(delivery.body.clone()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dropping undecodable delivery");
                if let Err(e) = delivery.nack(false).await {
                    error!(error = %e, "cannot reject delivery");
                }
                return;
            }
        };

        info!(video_id = %event.id, source = %event.source, "encoding");
        let status = match self.encode(&event).await {
            Ok(uploaded) => {
                info!(video_id = %event.id, uploaded, "encode complete");
                VideoStatus::Complete
            }
            Err(e) => {
                error!(video_id = %event.id, error = %e, "encode failed");
                VideoStatus::FailEncode
            }
        };

        let report = event.report(status);
        if let Err(e) = self.channel.publish(VIDEO_ENCODED, report.to_bytes()).await {
            error!(
                video_id = %event.id,
                status = status.as_str_name(),
                error = %e,
                "cannot publish status, leaving delivery unacknowledged"
            );
            return;
        }
        if let Err(e) = delivery.ack().await {
            error!(video_id = %event.id, error = %e, "cannot ack delivery");
        }
    }

    /// Returns the number of uploaded artifacts. The scratch directory is removed either way.
    pub async fn encode(&self, event: &VideoEvent) -> Result<usize, EncodeError> {
        let scratch = self.settings.scratch_dir();
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.encode_in(event, &scratch).await;

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(scratch = %scratch.display(), error = %e, "cannot clean scratch directory");
        }
        result
    }

    async fn encode_in(&self, event: &VideoEvent, workdir: &Path) -> Result<usize, EncodeError> {
        let source = source_file_name(&event.source)?;
        let local_source = workdir.join(&source);
        self.storage
            .download(&event.source_key(), &local_source)
            .await?;

        let info = self.tools.probe(&local_source).await?;
        debug!(
            video_id = %event.id,
            resolution = %info.resolution,
            has_audio = info.has_audio,
            "probed"
        );

        let ladder = RenditionLadder::for_source(info.resolution)?;

        if !info.has_audio {
            info!(video_id = %event.id, "no audio stream, adding a silent track");
            self.run_tool(&silent_audio_command(&source), workdir).await?;
            let repaired = workdir.join(silent_audio_output(&source));
            tokio::fs::rename(repaired, &local_source).await?;
        }

        let output = self
            .run_tool(&build_hls_command(&source, &ladder), workdir)
            .await?;
        debug!(video_id = %event.id, output = %output.output, "transcoder output");

        self.upload_renditions(&event.id, workdir).await
    }

    async fn run_tool(
        &self,
        command: &CommandLine,
        workdir: &Path,
    ) -> Result<ToolOutput, EncodeError> {
        let run = self.tools.run(command, workdir);
        match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| EncodeError::TimedOut(limit))?
                .map_err(EncodeError::from),
            None => Ok(run.await?),
        }
    }

    async fn upload_renditions(
        &self,
        video_id: &str,
        workdir: &Path,
    ) -> Result<usize, EncodeError> {
        let artifacts = rendition_files(workdir).await?;
        for relative in &artifacts {
            let key = format!("{}/{}", video_id, relative);
            self.storage.upload(&workdir.join(relative), &key).await?;
            debug!(key = %key, "uploaded");
        }
        Ok(artifacts.len())
    }
}

/// A plain file name, so the download cannot leave the scratch directory.
fn source_file_name(source: &str) -> Result<String, EncodeError> {
    let mut components = Path::new(source).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| EncodeError::InvalidSource(source.to_string())),
        _ => Err(EncodeError::InvalidSource(source.to_string())),
    }
}

/// Relative, slash-separated paths of every playlist and segment under `root`, sorted.
async fn rendition_files(root: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let wanted = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| RENDITION_EXTENSIONS.contains(&ext));
            if !wanted {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(relative);
            }
        }
    }
    files.sort();
    Ok(files)
}

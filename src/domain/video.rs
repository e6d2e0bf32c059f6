//! Video lifecycle events exchanged over the message channel.

use prost::Message;

pub use crate::proto::video::{VideoEvent, VideoStatus};

/// Topic fed by the upload surface once the source object is stored.
pub const VIDEO_UPLOADED: &str = "VideoUploaded";
/// Topic the encoder reports terminal statuses on.
pub const VIDEO_ENCODED: &str = "VideoEncoded";

impl VideoStatus {
    /// Terminal statuses end an encode attempt; nothing else is emitted for the delivery.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VideoStatus::Complete | VideoStatus::FailEncode | VideoStatus::FailUpload
        )
    }
}

impl VideoEvent {
    pub fn uploaded(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: VideoStatus::Uploaded as i32,
            source: source.into(),
        }
    }

    /// Build the status report for this video.
    pub fn report(&self, status: VideoStatus) -> Self {
        Self {
            id: self.id.clone(),
            status: status as i32,
            source: self.source.clone(),
        }
    }

    /// Object key of the uploaded source: `{id}/{source}`.
    pub fn source_key(&self) -> String {
        format!("{}/{}", self.id, self.source)
    }

    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.encode_to_vec())
    }
}

//! Reading `ffprobe -show_streams -print_format json` output.

use super::ladder::Resolution;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaInfo {
    pub resolution: Resolution,
    pub has_audio: bool,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe output is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("probe output has no streams")]
    NoStreams,
    #[error("no video stream with a usable resolution")]
    NoVideoStream,
}

fn codec_type(stream: &Value) -> Option<&str> {
    stream.get("codec_type").and_then(Value::as_str)
}

fn video_resolution(stream: &Value) -> Option<Resolution> {
    if codec_type(stream)? != "video" {
        return None;
    }
    let width = stream.get("width")?.as_u64()?;
    let height = stream.get("height")?.as_u64()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Resolution::new(
        u32::try_from(width).ok()?,
        u32::try_from(height).ok()?,
    ))
}

/// The first video stream decides the resolution.
pub fn parse_probe(output: &[u8]) -> Result<MediaInfo, ProbeError> {
    let v: Value = serde_json::from_slice(output)?;
    let streams = v
        .get("streams")
        .and_then(Value::as_array)
        .ok_or(ProbeError::NoStreams)?;

    let resolution = streams
        .iter()
        .find_map(video_resolution)
        .ok_or(ProbeError::NoVideoStream)?;
    let has_audio = streams.iter().any(|s| codec_type(s) == Some("audio"));

    Ok(MediaInfo {
        resolution,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn probe(data: Value) -> Result<MediaInfo, ProbeError> {
        parse_probe(data.to_string().as_bytes())
    }

    #[test]
    fn test_video_and_audio() {
        let info = probe(json!({
            "streams": [
                {
                    "index": 0,
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1280,
                    "height": 720
                },
                { "index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2 }
            ],
            "format": { "duration": "12.5" }
        }))
        .unwrap();

        assert_eq!(info.resolution, Resolution::new(1280, 720));
        assert!(info.has_audio);
    }

    #[test]
    fn test_video_only() {
        let info = probe(json!({
            "streams": [
                { "codec_type": "video", "width": 1920, "height": 1080 }
            ]
        }))
        .unwrap();

        assert_eq!(info.resolution, Resolution::new(1920, 1080));
        assert!(!info.has_audio);
    }

    #[test]
    fn test_skips_streams_without_dimensions() {
        // Cover art and data streams show up before the real video in some containers.
        let info = probe(json!({
            "streams": [
                { "codec_type": "data" },
                { "codec_type": "video", "width": 0, "height": 0 },
                { "codec_type": "video", "width": 640, "height": 480 }
            ]
        }))
        .unwrap();

        assert_eq!(info.resolution, Resolution::new(640, 480));
    }

    #[test]
    fn test_missing_video() {
        let err = probe(json!({
            "streams": [{ "codec_type": "audio" }]
        }))
        .unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));

        let err = probe(json!({
            "streams": [{ "codec_type": "video", "width": "wide", "height": 480 }]
        }))
        .unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream));
    }

    #[test]
    fn test_garbage_output() {
        assert!(matches!(
            parse_probe(b"not json"),
            Err(ProbeError::Json(_))
        ));
        assert!(matches!(probe(json!({})), Err(ProbeError::NoStreams)));
    }
}

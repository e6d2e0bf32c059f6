//! External tool invocations, built as plain data so they can be checked without running anything.

use super::ladder::RenditionLadder;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use tokio::process::Command;

pub const FFMPEG: &str = "ffmpeg";
pub const MASTER_PLAYLIST: &str = "master.m3u8";
/// Marks the scratch file written while a silent track is muxed in.
pub const SILENT_AUDIO_TAG: &str = "silent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    /// Swap the program, keeping the arguments. Used when the binary lives outside `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(OsStr::new(&self.program));
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandLine {
    /// Arguments only, space separated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// HLS transcode of `source` into every rung of `ladder`, writing into the working directory.
pub fn build_hls_command(source: &str, ladder: &RenditionLadder) -> CommandLine {
    let mut command = CommandLine::new(FFMPEG).args([
        "-y",
        "-i",
        source,
        "-pix_fmt",
        "yuv420p",
        "-vcodec",
        "libx264",
        "-preset",
        "fast",
        "-g",
        "48",
        "-sc_threshold",
        "0",
    ]);

    for _ in ladder.rungs() {
        command = command.args(["-map", "0:0", "-map", "0:1"]);
    }

    for (i, rung) in ladder.rungs().iter().enumerate() {
        command = command
            .arg(format!("-s:v:{}", i))
            .arg(rung.resolution.to_string())
            .arg(format!("-c:v:{}", i))
            .arg("libx264")
            .arg(format!("-b:v:{}", i))
            .arg(format!("{}k", rung.bitrate_kbps));
    }

    let stream_map = (0..ladder.len())
        .map(|i| format!("v:{},a:{}", i, i))
        .collect::<Vec<_>>()
        .join(" ");

    command
        .args(["-c:a", "aac", "-b:a", "128k", "-ac", "2", "-var_stream_map"])
        .arg(stream_map)
        .args([
            "-master_pl_name",
            MASTER_PLAYLIST,
            "-f",
            "hls",
            "-hls_time",
            "2",
            "-hls_list_size",
            "0",
            "-hls_segment_filename",
            "v%v/segment%d.ts",
            "v%v/segment_index.m3u8",
        ])
}

/// Name of the file `silent_audio_command` writes for `source`.
///
/// Always longer than `source`, so ffmpeg never writes over its own input.
pub fn silent_audio_output(source: &str) -> String {
    let path = Path::new(source);
    match (
        path.file_stem().and_then(OsStr::to_str),
        path.extension().and_then(OsStr::to_str),
    ) {
        (Some(stem), Some(ext)) => format!("{}.{}.{}", stem, SILENT_AUDIO_TAG, ext),
        // Matroska takes any copied video codec next to AAC.
        _ => format!("{}.{}.mkv", source, SILENT_AUDIO_TAG),
    }
}

/// Mux a stereo silent AAC track under the video of `source`.
pub fn silent_audio_command(source: &str) -> CommandLine {
    CommandLine::new(FFMPEG)
        .args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            "anullsrc=channel_layout=stereo:sample_rate=44100",
            "-i",
            source,
            "-c:v",
            "copy",
            "-c:a",
            "aac",
            "-shortest",
        ])
        .arg(silent_audio_output(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::av::ladder::Resolution;

    fn hls_args(width: u32, height: u32) -> String {
        let ladder = RenditionLadder::for_source(Resolution::new(width, height)).unwrap();
        build_hls_command("someName.mp4", &ladder).to_string()
    }

    #[test]
    fn test_hls_command_640x480() {
        assert_eq!(
            hls_args(640, 480),
            "-y -i someName.mp4 -pix_fmt yuv420p -vcodec libx264 -preset fast -g 48 -sc_threshold 0 \
             -map 0:0 -map 0:1 \
             -s:v:0 640x480 -c:v:0 libx264 -b:v:0 1000k \
             -c:a aac -b:a 128k -ac 2 -var_stream_map v:0,a:0 \
             -master_pl_name master.m3u8 -f hls -hls_time 2 -hls_list_size 0 \
             -hls_segment_filename v%v/segment%d.ts v%v/segment_index.m3u8"
        );
    }

    #[test]
    fn test_hls_command_1280x720() {
        assert_eq!(
            hls_args(1280, 720),
            "-y -i someName.mp4 -pix_fmt yuv420p -vcodec libx264 -preset fast -g 48 -sc_threshold 0 \
             -map 0:0 -map 0:1 -map 0:0 -map 0:1 \
             -s:v:0 640x480 -c:v:0 libx264 -b:v:0 1000k \
             -s:v:1 1280x720 -c:v:1 libx264 -b:v:1 2000k \
             -c:a aac -b:a 128k -ac 2 -var_stream_map v:0,a:0 v:1,a:1 \
             -master_pl_name master.m3u8 -f hls -hls_time 2 -hls_list_size 0 \
             -hls_segment_filename v%v/segment%d.ts v%v/segment_index.m3u8"
        );
    }

    #[test]
    fn test_hls_command_1920x1080() {
        assert_eq!(
            hls_args(1920, 1080),
            "-y -i someName.mp4 -pix_fmt yuv420p -vcodec libx264 -preset fast -g 48 -sc_threshold 0 \
             -map 0:0 -map 0:1 -map 0:0 -map 0:1 -map 0:0 -map 0:1 \
             -s:v:0 640x480 -c:v:0 libx264 -b:v:0 1000k \
             -s:v:1 1280x720 -c:v:1 libx264 -b:v:1 2000k \
             -s:v:2 1920x1080 -c:v:2 libx264 -b:v:2 4000k \
             -c:a aac -b:a 128k -ac 2 -var_stream_map v:0,a:0 v:1,a:1 v:2,a:2 \
             -master_pl_name master.m3u8 -f hls -hls_time 2 -hls_list_size 0 \
             -hls_segment_filename v%v/segment%d.ts v%v/segment_index.m3u8"
        );
    }

    #[test]
    fn test_hls_command_3840x2160() {
        assert_eq!(
            hls_args(3840, 2160),
            "-y -i someName.mp4 -pix_fmt yuv420p -vcodec libx264 -preset fast -g 48 -sc_threshold 0 \
             -map 0:0 -map 0:1 -map 0:0 -map 0:1 -map 0:0 -map 0:1 -map 0:0 -map 0:1 \
             -s:v:0 640x480 -c:v:0 libx264 -b:v:0 1000k \
             -s:v:1 1280x720 -c:v:1 libx264 -b:v:1 2000k \
             -s:v:2 1920x1080 -c:v:2 libx264 -b:v:2 4000k \
             -s:v:3 3840x2160 -c:v:3 libx264 -b:v:3 8000k \
             -c:a aac -b:a 128k -ac 2 -var_stream_map v:0,a:0 v:1,a:1 v:2,a:2 v:3,a:3 \
             -master_pl_name master.m3u8 -f hls -hls_time 2 -hls_list_size 0 \
             -hls_segment_filename v%v/segment%d.ts v%v/segment_index.m3u8"
        );
    }

    #[test]
    fn test_stream_map_is_one_argument() {
        let ladder = RenditionLadder::for_source(Resolution::new(1920, 1080)).unwrap();
        let command = build_hls_command("in.mp4", &ladder);
        let at = command
            .args
            .iter()
            .position(|arg| arg == "-var_stream_map")
            .unwrap();
        assert_eq!(command.args[at + 1], "v:0,a:0 v:1,a:1 v:2,a:2");
        assert_eq!(command.program, "ffmpeg");
    }

    #[test]
    fn test_hls_command_is_deterministic() {
        let ladder = RenditionLadder::for_source(Resolution::new(3840, 2160)).unwrap();
        assert_eq!(
            build_hls_command("a.mp4", &ladder),
            build_hls_command("a.mp4", &ladder)
        );
    }

    #[test]
    fn test_silent_audio_command() {
        let command = silent_audio_command("clip.mov");
        assert_eq!(
            command.to_string(),
            "-y -f lavfi -i anullsrc=channel_layout=stereo:sample_rate=44100 -i clip.mov \
             -c:v copy -c:a aac -shortest clip.silent.mov"
        );
        assert_eq!(silent_audio_output("noext"), "noext.silent.mkv");
    }

    #[test]
    fn test_silent_audio_output_never_overwrites_source() {
        for source in ["tmp.mp4", "clip.silent.mp4", "a.b.webm", "tmp", ".mp4"] {
            let output = silent_audio_output(source);
            assert_ne!(output, source);
            let command = silent_audio_command(source);
            assert_eq!(command.args.last(), Some(&output));
        }
        assert_eq!(silent_audio_output("tmp.mp4"), "tmp.silent.mp4");
    }
}

//! Audio/Video domain modules.

pub mod command;
pub mod effect;
pub mod ladder;
pub mod probe;

pub use command::{build_hls_command, silent_audio_command, CommandLine};
pub use effect::{Effect, EffectCommand, TransformCommand};
pub use ladder::{LadderError, RenditionLadder, Resolution};
pub use probe::{parse_probe, MediaInfo, ProbeError};

//! Visual effects applied by transformer hops.

use super::command::{CommandLine, FFMPEG};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Builds the stdin -> stdout command a hop pipes its segment through.
pub trait TransformCommand: Send + Sync {
    /// Name the hop answers to in a transformer list.
    fn name(&self) -> &str;
    fn command(&self) -> CommandLine;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Flip,
    Gray,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown effect {0:?}, expected one of: flip, gray")]
pub struct UnknownEffect(pub String);

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Flip => "flip",
            Effect::Gray => "gray",
        }
    }

    /// Filter passed to `-vf`.
    pub fn filter(self) -> &'static str {
        match self {
            Effect::Flip => "hflip",
            Effect::Gray => "hue=s=0",
        }
    }
}

impl FromStr for Effect {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flip" => Ok(Effect::Flip),
            "gray" | "grey" => Ok(Effect::Gray),
            _ => Err(UnknownEffect(s.to_string())),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TransformCommand for Effect {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn command(&self) -> CommandLine {
        CommandLine::new(FFMPEG)
            .args([
                "-i",
                "pipe:0",
                "-f",
                "mpegts",
                "-muxdelay",
                "0",
                "-map",
                "0:0",
                "-map",
                "0:1",
                "-acodec",
                "copy",
                "-vcodec",
                "libx264",
                "-preset",
                "fast",
                "-copyts",
                "-vf",
            ])
            .arg(self.filter())
            .arg("pipe:1")
    }
}

/// An effect run by an ffmpeg binary that may live outside `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectCommand {
    effect: Effect,
    program: String,
}

impl EffectCommand {
    pub fn new(effect: Effect, program: impl Into<String>) -> Self {
        Self {
            effect,
            program: program.into(),
        }
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }
}

impl TransformCommand for EffectCommand {
    fn name(&self) -> &str {
        self.effect.as_str()
    }

    fn command(&self) -> CommandLine {
        self.effect.command().with_program(self.program.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effects() {
        assert_eq!("flip".parse::<Effect>(), Ok(Effect::Flip));
        assert_eq!("Gray".parse::<Effect>(), Ok(Effect::Gray));
        assert_eq!(
            "blur".parse::<Effect>(),
            Err(UnknownEffect("blur".to_string()))
        );
    }

    #[test]
    fn test_effect_commands() {
        assert_eq!(
            Effect::Flip.command().to_string(),
            "-i pipe:0 -f mpegts -muxdelay 0 -map 0:0 -map 0:1 -acodec copy \
             -vcodec libx264 -preset fast -copyts -vf hflip pipe:1"
        );
        let gray = Effect::Gray.command();
        assert_eq!(gray.program, "ffmpeg");
        assert_eq!(gray.args[gray.args.len() - 2], "hue=s=0");
    }

    #[test]
    fn test_configured_program() {
        let command = EffectCommand::new(Effect::Gray, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(command.name(), "gray");
        assert_eq!(command.command().program, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(command.command().args, Effect::Gray.command().args);
    }

    #[test]
    fn test_effect_names() {
        assert_eq!(Effect::Flip.name(), "flip");
        assert_eq!(Effect::Gray.to_string(), "gray");
    }
}

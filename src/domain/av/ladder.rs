//! Rendition ladder selection for HLS output.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Greater-or-equal on both axes.
    pub fn covers(&self, other: &Resolution) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rung {
    pub resolution: Resolution,
    /// Video bitrate in kbit/s.
    pub bitrate_kbps: u32,
}

/// Every rung the encoder knows about, smallest first.
pub const RUNGS: [Rung; 4] = [
    Rung {
        resolution: Resolution::new(640, 480),
        bitrate_kbps: 1000,
    },
    Rung {
        resolution: Resolution::new(1280, 720),
        bitrate_kbps: 2000,
    },
    Rung {
        resolution: Resolution::new(1920, 1080),
        bitrate_kbps: 4000,
    },
    Rung {
        resolution: Resolution::new(3840, 2160),
        bitrate_kbps: 8000,
    },
];

pub const MINIMAL_RESOLUTION: Resolution = RUNGS[0].resolution;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LadderError {
    #[error("source resolution {0} is below minimal resolution ({min})", min = MINIMAL_RESOLUTION)]
    BelowMinimum(Resolution),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionLadder {
    rungs: Vec<Rung>,
}

impl RenditionLadder {
    /// Keeps the mandatory 640x480 rung and each larger rung the source covers.
    pub fn for_source(source: Resolution) -> Result<Self, LadderError> {
        if !source.covers(&MINIMAL_RESOLUTION) {
            return Err(LadderError::BelowMinimum(source));
        }

        let rungs = RUNGS
            .iter()
            .take_while(|rung| source.covers(&rung.resolution))
            .copied()
            .collect();
        Ok(Self { rungs })
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }
}

//! Audio/video muxing engine
//!
//! The pipeline needs three things from its engine: the duration of a media
//! file, a motion clip rendered from a still image, and a single mux pass
//! that burns captions into a scaled background over the narration.
//! [`FfmpegEngine`] provides them through ffmpeg and ffprobe.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use ffmpeg::FfmpegEngine;

/// Engine errors
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {detail}")]
    Exit {
        tool: String,
        status: String,
        detail: String,
    },

    #[error("{tool} not found: {reason}")]
    Missing { tool: String, reason: String },

    #[error("could not read duration of {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl Orientation {
    /// Classify a frame; `None` when a dimension is unknown
    #[must_use]
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(match width.cmp(&height) {
            std::cmp::Ordering::Less => Self::Portrait,
            std::cmp::Ordering::Greater => Self::Landscape,
            std::cmp::Ordering::Equal => Self::Square,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Square => "square",
        }
    }
}

/// Output frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// 1080x1920, 9:16
    pub const PORTRAIT_HD: Self = Self {
        width: 1080,
        height: 1920,
    };

    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        Orientation::from_dimensions(self.width, self.height).unwrap_or(Orientation::Portrait)
    }

    /// The same aspect ratio scaled by `factor`, rounded to even pixels
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let even = |v: u32| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = (f64::from(v) * factor).round() as u32;
            (scaled / 2 * 2).max(2)
        };
        Self::new(even(self.width), even(self.height))
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::PORTRAIT_HD
    }
}

/// Still image to pan/zoom clip
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRequest {
    pub image: PathBuf,
    pub output: PathBuf,
    pub duration_secs: f64,
    pub frame: FrameSize,
    /// Zoom increment per output frame; 0 keeps the frame still
    pub zoom_rate: f64,
}

/// Numbered raster sequence used as a video input
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    /// printf-style path, e.g. `overlay/frame_%05d.pam`
    pub pattern: PathBuf,
    pub fps: u32,
    pub frame_count: usize,
}

/// Timed-text track burned into the video
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleBurn {
    pub path: PathBuf,
    /// Styling for plain tracks; rich tracks carry their own styles
    pub force_style: Option<String>,
}

/// Transparent raster layer composited over the background
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayer {
    pub frames: FrameSequence,
    /// Vertical centre of the layer as a fraction of frame height
    pub anchor: f64,
}

/// One mux pass
#[derive(Debug, Clone, PartialEq)]
pub struct MuxRequest {
    pub background: PathBuf,
    pub audio: PathBuf,
    pub output: PathBuf,
    pub frame: FrameSize,
    pub subtitles: Option<SubtitleBurn>,
    pub overlay: Option<OverlayLayer>,
}

/// Local muxing capability
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Duration of a media file in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Render a still image into a motion clip of the requested duration
    async fn render_motion(&self, request: &MotionRequest) -> Result<(), MediaError>;

    /// Scale the background, burn captions, add narration, stop at the
    /// shorter of background and audio
    async fn mux(&self, request: &MuxRequest) -> Result<(), MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_from_dimensions() {
        assert_eq!(Orientation::from_dimensions(1080, 1920), Some(Orientation::Portrait));
        assert_eq!(Orientation::from_dimensions(1920, 1080), Some(Orientation::Landscape));
        assert_eq!(Orientation::from_dimensions(500, 500), Some(Orientation::Square));
        assert_eq!(Orientation::from_dimensions(0, 1080), None);
    }

    #[test]
    fn portrait_hd_is_portrait() {
        assert_eq!(FrameSize::PORTRAIT_HD.orientation(), Orientation::Portrait);
    }

    #[test]
    fn scaled_keeps_even_dimensions() {
        let half = FrameSize::PORTRAIT_HD.scaled(0.5);
        assert_eq!(half, FrameSize::new(540, 960));
        let odd = FrameSize::new(101, 51).scaled(1.0);
        assert_eq!(odd, FrameSize::new(100, 50));
    }
}

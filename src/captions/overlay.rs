//! Gradient overlay rasters
//!
//! The gradient family draws a translucent band in the caption palette
//! behind the words. Each output tick gets one RGBA frame (PAM, `P7`), so
//! the band can slide or bounce in step with the segment it belongs to.
//! Ticks with no active segment are fully transparent.

use std::io;
use std::path::Path;

use tracing::debug;

use super::style::{Backdrop, CaptionStyle};
use super::CaptionSegment;
use crate::media::{FrameSequence, FrameSize};

/// File name pattern of the numbered frames
pub const FRAME_PATTERN: &str = "frame_%05d.pam";

/// Band height as a share of the raster height
const BAND_SHARE: f64 = 0.55;
const BASE_ALPHA: f64 = 0.55;
const EMPHASIS_ALPHA: f64 = 0.8;

/// Renders the overlay frame sequence
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    pub fps: u32,
    /// Raster size of one overlay frame
    pub raster: FrameSize,
}

impl OverlayRenderer {
    #[must_use]
    pub fn new(fps: u32, raster: FrameSize) -> Self {
        Self {
            fps: fps.max(1),
            raster,
        }
    }

    /// Number of ticks needed to cover the segments
    #[must_use]
    pub fn frame_count(&self, segments: &[CaptionSegment]) -> usize {
        let end = segments.last().map_or(0.0, |s| s.end_secs);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = (end * f64::from(self.fps)).ceil().max(1.0) as usize;
        count
    }

    /// Segment visible at time `t`; segments are ordered and disjoint
    fn active(segments: &[CaptionSegment], t: f64) -> Option<&CaptionSegment> {
        let idx = segments.partition_point(|s| s.start_secs <= t);
        idx.checked_sub(1)
            .map(|i| &segments[i])
            .filter(|s| t <= s.end_secs)
    }

    /// RGBA pixels of one frame
    #[must_use]
    pub fn draw(
        &self,
        segment: Option<&CaptionSegment>,
        t: f64,
        style: &CaptionStyle,
        frame: FrameSize,
    ) -> Vec<u8> {
        let FrameSize { width, height } = self.raster;
        let mut pixels = vec![0u8; (width as usize) * (height as usize) * 4];
        let Some(segment) = segment else {
            return pixels;
        };

        let span = segment.end_secs - segment.start_secs;
        let progress = if span > 0.0 {
            (t - segment.start_secs) / span
        } else {
            1.0
        };

        // Offsets are in output pixels; the raster is scaled to frame width
        let scale = f64::from(width) / f64::from(frame.width.max(1));
        let offset = style.animation.y_offset(progress) * scale;
        let opacity = style.animation.opacity(progress, span);
        let peak = if segment.emphasis { EMPHASIS_ALPHA } else { BASE_ALPHA } * opacity;

        let h = f64::from(height);
        let center = h / 2.0 + offset;
        let half_band = h * BAND_SHARE / 2.0;
        let falloff = match style.backdrop {
            Backdrop::Box | Backdrop::None => 0.0,
            Backdrop::Shadow => h * 0.08,
            Backdrop::Glow => h * 0.2,
        };
        let palette = style.palette_rgb();
        let edge = (f64::from(width) * 0.06).max(1.0);

        for y in 0..height {
            let distance = (f64::from(y) + 0.5 - center).abs();
            let row_alpha = if distance <= half_band {
                1.0
            } else if falloff > 0.0 && distance <= half_band + falloff {
                1.0 - (distance - half_band) / falloff
            } else {
                continue;
            };

            for x in 0..width {
                let fx = f64::from(x) + 0.5;
                let edge_alpha = (fx / edge).min((f64::from(width) - fx) / edge).min(1.0);
                let alpha = peak * row_alpha * edge_alpha;
                let color = gradient_at(&palette, fx / f64::from(width));
                let i = ((y as usize) * (width as usize) + x as usize) * 4;
                pixels[i..i + 3].copy_from_slice(&color);
                pixels[i + 3] = to_channel(alpha);
            }
        }
        pixels
    }

    /// Write every frame into `dir` and describe the sequence
    pub async fn render(
        &self,
        segments: &[CaptionSegment],
        style: &CaptionStyle,
        frame: FrameSize,
        dir: &Path,
    ) -> io::Result<FrameSequence> {
        tokio::fs::create_dir_all(dir).await?;
        let count = self.frame_count(segments);
        let header = pam_header(self.raster);
        let blank = {
            let mut bytes = header.clone();
            bytes.extend(self.draw(None, 0.0, style, frame));
            bytes
        };

        for tick in 0..count {
            #[allow(clippy::cast_precision_loss)]
            let t = tick as f64 / f64::from(self.fps);
            let path = dir.join(format!("frame_{tick:05}.pam"));
            match Self::active(segments, t) {
                Some(segment) => {
                    let mut bytes = header.clone();
                    bytes.extend(self.draw(Some(segment), t, style, frame));
                    tokio::fs::write(&path, bytes).await?;
                }
                None => tokio::fs::write(&path, &blank).await?,
            }
        }

        debug!(frames = count, fps = self.fps, "Rendered gradient overlay");
        Ok(FrameSequence {
            pattern: dir.join(FRAME_PATTERN),
            fps: self.fps,
            frame_count: count,
        })
    }
}

fn pam_header(size: FrameSize) -> Vec<u8> {
    format!(
        "P7\nWIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
        size.width, size.height
    )
    .into_bytes()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Linear interpolation across evenly spaced palette stops
fn gradient_at(palette: &[[u8; 3]], position: f64) -> [u8; 3] {
    match palette {
        [] => [0xFF, 0xFF, 0xFF],
        [only] => *only,
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let scaled = position.clamp(0.0, 1.0) * (palette.len() - 1) as f64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lower = (scaled.floor() as usize).min(palette.len() - 2);
            #[allow(clippy::cast_precision_loss)]
            let frac = scaled - lower as f64;
            let (a, b) = (palette[lower], palette[lower + 1]);
            let mix = |i: usize| {
                to_channel((f64::from(a[i]) + (f64::from(b[i]) - f64::from(a[i])) * frac) / 255.0)
            };
            [mix(0), mix(1), mix(2)]
        }
    }
}

//! Compositor
//!
//! Turns a caption track into a single mux pass: the background is scaled
//! to the frame, captions are burned in (plain tracks styled from the
//! caption style, rich tracks with their own styles), gradient rasters are
//! layered underneath the words, and the output stops at the shorter of
//! background and narration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::captions::style::CaptionStyle;
use crate::captions::CaptionTrack;
use crate::error::{PipelineError, Result};
use crate::media::{FrameSize, MediaEngine, MuxRequest, OverlayLayer, SubtitleBurn};

/// Output file name inside the work area
pub const OUTPUT_NAME: &str = "final.mp4";

/// Rendered video
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub path: PathBuf,
    pub size: u64,
    pub render_secs: f64,
}

/// Build the mux request for a caption track
#[must_use]
pub fn mux_request(
    background: &Path,
    audio: &Path,
    track: &CaptionTrack,
    style: &CaptionStyle,
    frame: FrameSize,
    output: PathBuf,
) -> MuxRequest {
    let (subtitles, overlay) = match track {
        CaptionTrack::Plain(path) => (
            Some(SubtitleBurn {
                path: path.clone(),
                force_style: Some(style.force_style()),
            }),
            None,
        ),
        CaptionTrack::Rich(path) => (
            Some(SubtitleBurn {
                path: path.clone(),
                force_style: None,
            }),
            None,
        ),
        CaptionTrack::Overlay { frames, text } => (
            Some(SubtitleBurn {
                path: text.clone(),
                force_style: None,
            }),
            Some(OverlayLayer {
                frames: frames.clone(),
                anchor: style.position.anchor(),
            }),
        ),
    };

    MuxRequest {
        background: background.to_path_buf(),
        audio: audio.to_path_buf(),
        output,
        frame,
        subtitles,
        overlay,
    }
}

/// Compositor
#[derive(Clone)]
pub struct Compositor {
    engine: Arc<dyn MediaEngine>,
}

impl Compositor {
    #[must_use]
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    /// Mux everything into `<dir>/final.mp4`
    #[instrument(skip_all, fields(frame = %format!("{}x{}", frame.width, frame.height)))]
    pub async fn compose(
        &self,
        background: &Path,
        audio: &Path,
        track: &CaptionTrack,
        style: &CaptionStyle,
        frame: FrameSize,
        dir: &Path,
    ) -> Result<Composition> {
        let fail = PipelineError::CompositionFailed;
        let request = mux_request(background, audio, track, style, frame, dir.join(OUTPUT_NAME));

        let started = Instant::now();
        self.engine
            .mux(&request)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let render_secs = started.elapsed().as_secs_f64();

        let size = tokio::fs::metadata(&request.output)
            .await
            .map_err(|e| fail(format!("no output written: {e}")))?
            .len();
        if size == 0 {
            return Err(fail("output video is empty".to_string()));
        }

        info!(size, render_secs, "Composed final video");
        Ok(Composition {
            path: request.output,
            size,
            render_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::style::{CaptionFamily, Position};
    use crate::media::{FrameSequence, MediaError, MotionRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<MuxRequest>>,
        write: bool,
    }

    #[async_trait]
    impl MediaEngine for Recorder {
        async fn probe_duration(&self, _: &Path) -> std::result::Result<f64, MediaError> {
            Ok(1.0)
        }

        async fn render_motion(&self, _: &MotionRequest) -> std::result::Result<(), MediaError> {
            Ok(())
        }

        async fn mux(&self, request: &MuxRequest) -> std::result::Result<(), MediaError> {
            if self.write {
                tokio::fs::write(&request.output, b"mp4").await?;
            }
            self.seen.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn style(family: CaptionFamily) -> CaptionStyle {
        CaptionStyle {
            family,
            position: Position::Top,
            ..CaptionStyle::default()
        }
    }

    #[test]
    fn plain_track_gets_forced_style() {
        let req = mux_request(
            Path::new("bg.mp4"),
            Path::new("a.mp3"),
            &CaptionTrack::Plain("c.srt".into()),
            &style(CaptionFamily::Classic),
            FrameSize::PORTRAIT_HD,
            "out.mp4".into(),
        );
        let burn = req.subtitles.unwrap();
        assert!(burn.force_style.unwrap().contains("FontSize=52"));
        assert!(req.overlay.is_none());
    }

    #[test]
    fn rich_track_keeps_its_styles() {
        let req = mux_request(
            Path::new("bg.mp4"),
            Path::new("a.mp3"),
            &CaptionTrack::Rich("c.ass".into()),
            &style(CaptionFamily::Dynamic),
            FrameSize::PORTRAIT_HD,
            "out.mp4".into(),
        );
        assert!(req.subtitles.unwrap().force_style.is_none());
    }

    #[test]
    fn overlay_track_is_anchored_at_position() {
        let frames = FrameSequence {
            pattern: "overlay/frame_%05d.pam".into(),
            fps: 10,
            frame_count: 30,
        };
        let req = mux_request(
            Path::new("bg.mp4"),
            Path::new("a.mp3"),
            &CaptionTrack::Overlay {
                frames: frames.clone(),
                text: "c.ass".into(),
            },
            &style(CaptionFamily::Gradient),
            FrameSize::PORTRAIT_HD,
            "out.mp4".into(),
        );
        let overlay = req.overlay.unwrap();
        assert_eq!(overlay.frames, frames);
        assert!((overlay.anchor - 0.2).abs() < f64::EPSILON);
        assert_eq!(req.subtitles.unwrap().path, PathBuf::from("c.ass"));
    }

    #[tokio::test]
    async fn compose_reports_size() {
        let dir = std::env::temp_dir().join(format!("versereel-compose-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let engine = Arc::new(Recorder {
            write: true,
            ..Recorder::default()
        });
        let out = Compositor::new(engine.clone())
            .compose(
                Path::new("bg.mp4"),
                Path::new("a.mp3"),
                &CaptionTrack::Rich("c.ass".into()),
                &CaptionStyle::default(),
                FrameSize::PORTRAIT_HD,
                &dir,
            )
            .await
            .unwrap();
        assert_eq!(out.path, dir.join(OUTPUT_NAME));
        assert_eq!(out.size, 3);
        assert_eq!(engine.seen.lock().unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_output_is_composition_failure() {
        let dir = std::env::temp_dir().join(format!("versereel-compose-{}", Uuid::new_v4()));
        let err = Compositor::new(Arc::new(Recorder::default()))
            .compose(
                Path::new("bg.mp4"),
                Path::new("a.mp3"),
                &CaptionTrack::Rich("c.ass".into()),
                &CaptionStyle::default(),
                FrameSize::PORTRAIT_HD,
                &dir,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CompositionFailed(_)));
    }
}

//! ffmpeg/ffprobe implementation of [`MediaEngine`]

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{FrameSize, MediaEngine, MediaError, MotionRequest, MuxRequest};
use crate::config::MediaSection;

/// stderr lines kept for error messages
const STDERR_TAIL: usize = 8;

/// Largest zoom a motion clip reaches
const MAX_ZOOM: f64 = 1.5;

/// ffmpeg-backed engine
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    config: MediaSection,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new(MediaSection::default())
    }
}

impl FfmpegEngine {
    #[must_use]
    pub fn new(config: MediaSection) -> Self {
        Self { config }
    }

    /// Engine whose ffmpeg and ffprobe binaries both resolve.
    ///
    /// Bare names are looked up in `PATH`; anything else must exist as given.
    pub fn from_config(config: MediaSection) -> Result<Self, MediaError> {
        for tool in [&config.ffmpeg_path, &config.ffprobe_path] {
            if let Err(e) = which::which(tool) {
                return Err(MediaError::Missing {
                    tool: tool.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(Self::new(config))
    }

    fn base_args() -> Vec<String> {
        ["-hide_banner", "-loglevel", "warning", "-nostdin"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect()
    }

    fn encode_args(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".to_string(),
            self.config.video_codec.clone(),
            "-preset".to_string(),
            self.config.preset.clone(),
            "-crf".to_string(),
            self.config.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);
    }

    /// Arguments for a pan/zoom clip from a still image
    fn motion_args(&self, request: &MotionRequest) -> Vec<String> {
        let fps = self.config.frame_rate;
        let FrameSize { width, height } = request.frame;
        // Oversample before zoompan to avoid jitter on slow zooms
        let filter = format!(
            "scale={sw}:{sh},zoompan=z='min(1+{rate}*on,{MAX_ZOOM})':\
             x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={width}x{height}:fps={fps}",
            sw = width * 2,
            sh = height * 2,
            rate = request.zoom_rate,
        );

        let mut args = Self::base_args();
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            fps.to_string(),
            "-i".to_string(),
            request.image.to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", request.duration_secs),
            "-vf".to_string(),
            filter,
        ]);
        self.encode_args(&mut args);
        args.push("-an".to_string());
        args.push("-y".to_string());
        args.push(request.output.to_string_lossy().to_string());
        args
    }

    /// Filter graph for the final mux; the result is labelled `[v]`
    fn build_filter_complex(request: &MuxRequest) -> String {
        let FrameSize { width, height } = request.frame;
        let mut chains = vec![format!(
            "[0:v]scale={width}:{height}:force_original_aspect_ratio=increase,\
             crop={width}:{height},setsar=1[bg]"
        )];
        let mut current = "bg";

        if let Some(overlay) = &request.overlay {
            chains.push(format!("[2:v]scale={width}:-2,format=rgba[ov]"));
            chains.push(format!(
                "[{current}][ov]overlay=0:main_h*{anchor:.3}-overlay_h/2:eof_action=pass[layered]",
                anchor = overlay.anchor,
            ));
            current = "layered";
        }

        let text = match &request.subtitles {
            Some(burn) => {
                let path = escape_filter_path(&burn.path);
                match &burn.force_style {
                    None => format!("ass='{path}'"),
                    Some(style) => format!("subtitles='{path}':force_style='{style}'"),
                }
            }
            None => "null".to_string(),
        };
        chains.push(format!("[{current}]{text}[v]"));

        chains.join(";")
    }

    fn mux_args(&self, request: &MuxRequest) -> Vec<String> {
        let mut args = Self::base_args();
        args.push("-i".to_string());
        args.push(request.background.to_string_lossy().to_string());
        args.push("-i".to_string());
        args.push(request.audio.to_string_lossy().to_string());

        if let Some(overlay) = &request.overlay {
            args.extend([
                "-framerate".to_string(),
                overlay.frames.fps.to_string(),
                "-i".to_string(),
                overlay.frames.pattern.to_string_lossy().to_string(),
            ]);
        }

        args.extend([
            "-filter_complex".to_string(),
            Self::build_filter_complex(request),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-r".to_string(),
            self.config.frame_rate.to_string(),
        ]);
        self.encode_args(&mut args);
        args.extend([
            "-c:a".to_string(),
            self.config.audio_codec.clone(),
            "-shortest".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            request.output.to_string_lossy().to_string(),
        ]);
        args
    }

    fn probe_args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }

    /// Run a tool, forwarding its stderr to the log
    async fn run(&self, tool: &str, args: &[String]) -> Result<(), MediaError> {
        debug!("{} args: {:?}", tool, args);

        let mut child = Command::new(tool)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        let stderr = child.stderr.take();
        let forward = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") || line.contains("Warning") {
                        warn!("ffmpeg: {}", line);
                    } else {
                        debug!("ffmpeg: {}", line);
                    }
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        let status = child.wait().await?;
        let tail = forward.await.unwrap_or_default();

        if !status.success() {
            return Err(MediaError::Exit {
                tool: tool.to_string(),
                status: status.to_string(),
                detail: Vec::from(tail).join(" | "),
            });
        }
        Ok(())
    }
}

/// Escape a path for use inside a single-quoted filter argument
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    #[instrument(skip(self))]
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(Self::probe_args(path))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: self.config.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(MediaError::Probe {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_duration(&stdout).ok_or_else(|| MediaError::Probe {
            path: path.display().to_string(),
            reason: format!("unexpected ffprobe output {:?}", stdout.trim()),
        })
    }

    #[instrument(skip(self, request), fields(duration = request.duration_secs))]
    async fn render_motion(&self, request: &MotionRequest) -> Result<(), MediaError> {
        let args = self.motion_args(request);
        self.run(&self.config.ffmpeg_path, &args).await?;
        info!("Rendered motion clip to {:?}", request.output);
        Ok(())
    }

    #[instrument(skip(self, request))]
    async fn mux(&self, request: &MuxRequest) -> Result<(), MediaError> {
        let args = self.mux_args(request);
        self.run(&self.config.ffmpeg_path, &args).await?;
        info!("Composited video to {:?}", request.output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::media::{FrameSequence, OverlayLayer, SubtitleBurn};

    fn engine() -> FfmpegEngine {
        FfmpegEngine::new(MediaSection {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            ..MediaSection::default()
        })
    }

    fn mux_request() -> MuxRequest {
        MuxRequest {
            background: PathBuf::from("/work/background.mp4"),
            audio: PathBuf::from("/work/narration.mp3"),
            output: PathBuf::from("/work/final.mp4"),
            frame: FrameSize::PORTRAIT_HD,
            subtitles: None,
            overlay: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn missing_binary_is_rejected_up_front() {
        let err = FfmpegEngine::from_config(MediaSection {
            ffmpeg_path: "/nonexistent/versereel-ffmpeg".into(),
            ..MediaSection::default()
        })
        .unwrap_err();
        assert!(
            matches!(err, MediaError::Missing { ref tool, .. } if tool == "/nonexistent/versereel-ffmpeg")
        );
    }

    #[test]
    fn mux_args_truncate_to_shortest_and_map_audio() {
        let args = engine().mux_args(&mux_request());
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-pix_fmt"), Some("yuv420p"));
        assert_eq!(value_after(&args, "-movflags"), Some("+faststart"));
        assert_eq!(args.last().map(String::as_str), Some("/work/final.mp4"));
        let maps: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-map")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(maps, vec!["[v]", "1:a"]);
    }

    #[test]
    fn filter_scales_to_frame() {
        let filter = FfmpegEngine::build_filter_complex(&mux_request());
        assert!(filter.starts_with("[0:v]scale=1080:1920"));
        assert!(filter.contains("crop=1080:1920"));
        assert!(filter.ends_with("[bg]null[v]"));
    }

    #[test]
    fn rich_track_uses_ass_filter() {
        let mut request = mux_request();
        request.subtitles = Some(SubtitleBurn {
            path: PathBuf::from("/work/captions.ass"),
            force_style: None,
        });
        let filter = FfmpegEngine::build_filter_complex(&request);
        assert!(filter.contains("[bg]ass='/work/captions.ass'[v]"));
    }

    #[test]
    fn plain_track_uses_force_style() {
        let mut request = mux_request();
        request.subtitles = Some(SubtitleBurn {
            path: PathBuf::from("C:/tmp/it's.srt"),
            force_style: Some("FontSize=24,Alignment=2".into()),
        });
        let filter = FfmpegEngine::build_filter_complex(&request);
        assert!(filter.contains(r"subtitles='C\:/tmp/it\'s.srt':force_style='FontSize=24,Alignment=2'"));
    }

    #[test]
    fn overlay_adds_third_input_and_layer() {
        let mut request = mux_request();
        request.overlay = Some(OverlayLayer {
            frames: FrameSequence {
                pattern: PathBuf::from("/work/overlay/frame_%05d.pam"),
                fps: 12,
                frame_count: 10,
            },
            anchor: 0.8,
        });
        let args = engine().mux_args(&request);
        assert_eq!(value_after(&args, "-framerate"), Some("12"));
        let inputs = args.iter().filter(|a| *a == "-i").count();
        assert_eq!(inputs, 3);

        let filter = value_after(&args, "-filter_complex").unwrap();
        assert!(filter.contains("[2:v]scale=1080:-2,format=rgba[ov]"));
        assert!(filter.contains("overlay=0:main_h*0.800-overlay_h/2"));
        assert!(filter.ends_with("[layered]null[v]"));
    }

    #[test]
    fn motion_args_loop_image_for_duration() {
        let args = engine().motion_args(&MotionRequest {
            image: PathBuf::from("/work/still.ppm"),
            output: PathBuf::from("/work/background.mp4"),
            duration_secs: 45.0,
            frame: FrameSize::PORTRAIT_HD,
            zoom_rate: 0.0005,
        });
        assert_eq!(value_after(&args, "-loop"), Some("1"));
        assert_eq!(value_after(&args, "-t"), Some("45.000"));
        let vf = value_after(&args, "-vf").unwrap();
        assert!(vf.starts_with("scale=2160:3840,zoompan=z='min(1+0.0005*on,1.5)'"));
        assert!(vf.contains("s=1080x1920"));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn probe_args_ask_for_format_duration() {
        let args = FfmpegEngine::probe_args(Path::new("/work/a.mp3"));
        assert_eq!(value_after(&args, "-show_entries"), Some("format=duration"));
    }

    #[test]
    fn parse_duration_output() {
        assert_eq!(parse_duration("50.013000\n"), Some(50.013));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration("0.0"), None);
    }
}

//! Caption timing and styling
//!
//! Narration is cut into sentences, then into chunks of at most
//! `max_words` words. Chunk timing uses the pace actually measured on the
//! narration audio (`total words / duration`), walks forward monotonically
//! and clamps the last end time to the audio duration.
//!
//! The timed segments are then rendered per [`CaptionFamily`]:
//!
//! - `Dynamic`, `Neon`, `WordHighlight`: rich ASS track
//! - `Classic`: SRT track
//! - `Gradient`: overlay raster sequence plus an ASS text layer

pub mod overlay;
pub mod style;
pub mod subtitle;
pub mod vocab;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::CaptionSection;
use crate::error::{PipelineError, Result};
use crate::media::{FrameSequence, FrameSize};

use self::overlay::OverlayRenderer;
use self::style::{ass_color, Backdrop, CaptionFamily, CaptionStyle};
use self::subtitle::{
    escape_ass, AssGenerator, AssStyle, SrtGenerator, SubtitleEntry, SubtitleGenerator,
};

/// Sentence terminators; runs of them split once
const SENTENCE_END: [char; 3] = ['.', '!', '?'];

const HIGHLIGHT: &str = "&H00FFFF&";

/// A timed chunk of on-screen text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionSegment {
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
    pub emphasis: bool,
    pub icon: Option<&'static str>,
}

impl CaptionSegment {
    /// Text with its icon, if any, in front
    #[must_use]
    pub fn display_text(&self) -> String {
        match self.icon {
            Some(icon) => format!("{icon} {}", self.text),
            None => self.text.clone(),
        }
    }
}

/// Cut narration into timed segments.
///
/// Returns an empty list when there is nothing to show or the duration is
/// not positive.
#[must_use]
pub fn segment(narration: &str, audio_secs: f64, max_words: usize, icons: bool) -> Vec<CaptionSegment> {
    let total_words = narration.split_whitespace().count();
    if total_words == 0 || audio_secs.is_nan() || audio_secs <= 0.0 {
        return Vec::new();
    }
    let max_words = max_words.max(1);
    #[allow(clippy::cast_precision_loss)]
    let rate = total_words as f64 / audio_secs;

    let mut segments = Vec::new();
    let mut current = 0.0_f64;

    for sentence in narration.split(SENTENCE_END) {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        for chunk in words.chunks(max_words) {
            #[allow(clippy::cast_precision_loss)]
            let end = (current + chunk.len() as f64 / rate).min(audio_secs);
            segments.push(CaptionSegment {
                text: chunk.join(" "),
                start_secs: current,
                end_secs: end,
                emphasis: chunk.iter().any(|w| vocab::is_emphasis(w)),
                icon: if icons {
                    vocab::first_icon(chunk.iter().copied())
                } else {
                    None
                },
            });
            current = end;
        }
    }
    segments
}

/// A rendered caption track
#[derive(Debug, Clone, PartialEq)]
pub enum CaptionTrack {
    /// ASS track carrying its own styles
    Rich(PathBuf),
    /// SRT track, styled when burned in
    Plain(PathBuf),
    /// Raster frames plus an ASS layer with the words
    Overlay { frames: FrameSequence, text: PathBuf },
}

/// Segments and the track built from them
#[derive(Debug, Clone)]
pub struct Captions {
    pub segments: Vec<CaptionSegment>,
    pub track: CaptionTrack,
}

/// Caption Timing & Styling Engine
#[derive(Debug, Clone)]
pub struct CaptionEngine {
    max_words: usize,
    overlay: OverlayRenderer,
}

impl Default for CaptionEngine {
    fn default() -> Self {
        Self::from_config(&CaptionSection::default())
    }
}

impl CaptionEngine {
    #[must_use]
    pub fn from_config(config: &CaptionSection) -> Self {
        Self {
            max_words: config.max_words_per_chunk.max(1),
            overlay: OverlayRenderer::new(
                config.overlay_fps,
                FrameSize::new(config.overlay_width, config.overlay_height),
            ),
        }
    }

    /// Time the narration and write its track into `dir`
    #[instrument(skip(self, narration, style, dir), fields(family = ?style.family))]
    pub async fn render(
        &self,
        narration: &str,
        audio_secs: f64,
        style: &CaptionStyle,
        frame: FrameSize,
        dir: &Path,
    ) -> Result<Captions> {
        if audio_secs.is_nan() || audio_secs <= 0.0 {
            return Err(PipelineError::CaptionGenerationFailed(format!(
                "invalid narration duration {audio_secs}"
            )));
        }
        let segments = segment(narration, audio_secs, self.max_words, style.emojis);
        if segments.is_empty() {
            return Err(PipelineError::CaptionGenerationFailed(
                "narration has no words to caption".to_string(),
            ));
        }
        debug!(segments = segments.len(), "Timed caption segments");

        let track = match style.family {
            CaptionFamily::Classic => {
                let entries: Vec<SubtitleEntry> = segments
                    .iter()
                    .map(|s| SubtitleEntry::from_secs(s.start_secs, s.end_secs, s.display_text()))
                    .collect();
                let path = dir.join("captions.srt");
                write_track(&SrtGenerator, &entries, &path).await?;
                CaptionTrack::Plain(path)
            }
            CaptionFamily::Gradient => {
                let frames = self
                    .overlay
                    .render(&segments, style, frame, &dir.join("overlay"))
                    .await
                    .map_err(|e| PipelineError::CaptionGenerationFailed(e.to_string()))?;
                let text = dir.join("captions.ass");
                let entries = gradient_entries(&segments, frame, style);
                write_track(&ass_generator(style, frame), &entries, &text).await?;
                CaptionTrack::Overlay { frames, text }
            }
            family => {
                let entries = match family {
                    CaptionFamily::Neon => neon_entries(&segments, frame, style),
                    CaptionFamily::WordHighlight => word_highlight_entries(&segments, frame, style),
                    _ => dynamic_entries(&segments, frame, style),
                };
                let path = dir.join("captions.ass");
                write_track(&ass_generator(style, frame), &entries, &path).await?;
                CaptionTrack::Rich(path)
            }
        };

        Ok(Captions { segments, track })
    }
}

async fn write_track(
    generator: &dyn SubtitleGenerator,
    entries: &[SubtitleEntry],
    path: &Path,
) -> Result<()> {
    let content = generator
        .generate(entries)
        .map_err(|e| PipelineError::CaptionGenerationFailed(e.to_string()))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| PipelineError::CaptionGenerationFailed(format!("{}: {e}", path.display())))
}

/// Event anchor in output pixels
fn anchor_point(frame: FrameSize, style: &CaptionStyle) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let y = (f64::from(frame.height) * style.position.anchor()).round() as u32;
    (frame.width / 2, y)
}

fn ass_generator(style: &CaptionStyle, frame: FrameSize) -> AssGenerator {
    let (border_style, outline, shadow) = style.backdrop.ass_border();
    let base = AssStyle {
        name: "Default".to_string(),
        font_name: style.font_family.clone(),
        font_size: style.font_size,
        primary_color: ass_color(style.primary_rgb()),
        border_style,
        outline,
        shadow,
        alignment: style.position.ass_alignment(),
        ..AssStyle::default()
    };
    let neon = AssStyle {
        name: "Neon".to_string(),
        primary_color: "&HFF00FF&".to_string(),
        secondary_color: "&H00FFFF&".to_string(),
        outline_color: "&HFFFF00&".to_string(),
        border_style: 1,
        outline: 3.0,
        shadow: 2.0,
        ..base.clone()
    };

    let generator = AssGenerator::new()
        .with_resolution(frame.width, frame.height)
        .with_style(base);
    if style.family == CaptionFamily::Neon {
        generator.with_style(neon)
    } else {
        generator
    }
}

fn dynamic_entries(segments: &[CaptionSegment], frame: FrameSize, style: &CaptionStyle) -> Vec<SubtitleEntry> {
    let (x, y) = anchor_point(frame, style);
    let primary = ass_color(style.primary_rgb());
    let tag = style.animation.ass_tag(x, y);

    segments
        .iter()
        .map(|s| {
            let text = escape_ass(&s.display_text());
            let body = if s.emphasis {
                format!(r"{{\b1\c{HIGHLIGHT}}}{text}{{\b0\c{primary}}}")
            } else {
                text
            };
            SubtitleEntry::from_secs(s.start_secs, s.end_secs, format!("{tag}{body}"))
        })
        .collect()
}

fn neon_entries(segments: &[CaptionSegment], frame: FrameSize, style: &CaptionStyle) -> Vec<SubtitleEntry> {
    let (x, y) = anchor_point(frame, style);
    let tag = style.animation.ass_tag(x, y);

    segments
        .iter()
        .map(|s| {
            let glow = if s.emphasis { r"\be2\b1" } else { r"\be1" };
            let text = format!(
                r"{tag}{{\3c&HFF00FF&\3a&H80&{glow}}}{}",
                escape_ass(&s.display_text())
            );
            SubtitleEntry::from_secs(s.start_secs, s.end_secs, text).with_style("Neon")
        })
        .collect()
}

/// One event per word; the spoken word is highlighted, earlier words dim
/// and later words stay hidden
fn word_highlight_entries(
    segments: &[CaptionSegment],
    frame: FrameSize,
    style: &CaptionStyle,
) -> Vec<SubtitleEntry> {
    let (x, y) = anchor_point(frame, style);
    let primary = ass_color(style.primary_rgb());
    let place = format!(r"{{\an5\pos({x},{y})}}");
    let mut entries = Vec::new();

    for s in segments {
        let words: Vec<&str> = s.text.split_whitespace().collect();
        #[allow(clippy::cast_precision_loss)]
        let step = (s.end_secs - s.start_secs) / words.len().max(1) as f64;
        let icon = s.icon.map(|i| format!("{i} ")).unwrap_or_default();

        for current in 0..words.len() {
            let line: Vec<String> = words
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let w = escape_ass(w);
                    match i.cmp(&current) {
                        std::cmp::Ordering::Equal => {
                            format!(r"{{\c{HIGHLIGHT}\b1}}{w}{{\c{primary}\b0}}")
                        }
                        std::cmp::Ordering::Less => format!(r"{{\alpha&H80&}}{w}{{\alpha&H00&}}"),
                        std::cmp::Ordering::Greater => format!(r"{{\alpha&HFF&}}{w}{{\alpha&H00&}}"),
                    }
                })
                .collect();

            #[allow(clippy::cast_precision_loss)]
            let start = s.start_secs + step * current as f64;
            let end = if current + 1 == words.len() {
                s.end_secs
            } else {
                start + step
            };
            entries.push(SubtitleEntry::from_secs(
                start,
                end,
                format!("{place}{}{}", escape_ass(&icon), line.join(" ")),
            ));
        }
    }
    entries
}

/// Plain positioned words drawn over the gradient band
fn gradient_entries(segments: &[CaptionSegment], frame: FrameSize, style: &CaptionStyle) -> Vec<SubtitleEntry> {
    let (x, y) = anchor_point(frame, style);
    let place = if style.backdrop == Backdrop::None {
        format!(r"{{\an5\pos({x},{y})\bord2}}")
    } else {
        format!(r"{{\an5\pos({x},{y})}}")
    };
    segments
        .iter()
        .map(|s| {
            SubtitleEntry::from_secs(
                s.start_secs,
                s.end_secs,
                format!("{place}{}", escape_ass(&s.display_text())),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::style::{Animation, Position};
    use uuid::Uuid;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("versereel-captions-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn measured_rate_drives_chunk_length() {
        // 120 words over 50s is 2.4 words/s, so six words take 2.5s
        let segments = segment(&words(120), 50.0, 6, false);
        assert_eq!(segments.len(), 20);
        let first = &segments[0];
        assert!((first.end_secs - first.start_secs - 2.5).abs() < 1e-9);
        assert!((segments.last().unwrap().end_secs - 50.0).abs() < 1e-6);
    }

    #[test]
    fn segments_are_ordered_disjoint_and_bounded() {
        let narration = "The Lord is my shepherd. I shall not want! He makes me lie down in green \
                         pastures, he leads me beside still waters? He restores my soul.";
        let duration = 9.3;
        let segments = segment(narration, duration, 6, true);
        assert!(!segments.is_empty());
        for pair in segments.windows(2) {
            assert!(pair[0].start_secs <= pair[1].start_secs);
            assert!(pair[0].end_secs <= pair[1].start_secs + 1e-9);
        }
        for s in &segments {
            assert!(!s.text.is_empty());
            assert!(s.start_secs <= s.end_secs);
        }
        assert!(segments.last().unwrap().end_secs <= duration + 1e-9);
    }

    #[test]
    fn sentence_boundaries_split_chunks() {
        let segments = segment("One two. Three four five!", 5.0, 6, false);
        let texts: Vec<_> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["One two", "Three four five"]);
    }

    #[test]
    fn long_sentences_are_chunked() {
        let segments = segment(&format!("{}.", words(13)), 13.0, 6, false);
        let sizes: Vec<_> = segments
            .iter()
            .map(|s| s.text.split_whitespace().count())
            .collect();
        assert_eq!(sizes, vec![6, 6, 1]);
    }

    #[test]
    fn emphasis_and_icons_are_per_word() {
        let segments = segment("Hope in the Lord. A tall tower.", 6.0, 6, true);
        assert!(segments[0].emphasis);
        assert_eq!(segments[0].icon, Some("🌟"));
        assert!(!segments[1].emphasis);
        assert_eq!(segments[1].icon, None);
    }

    #[test]
    fn icons_can_be_disabled() {
        let segments = segment("Love never fails.", 3.0, 6, false);
        assert!(segments[0].emphasis);
        assert!(segments[0].icon.is_none());
    }

    #[test]
    fn empty_or_zero_duration_yields_nothing() {
        assert!(segment("   ", 10.0, 6, true).is_empty());
        assert!(segment("words here", 0.0, 6, true).is_empty());
        assert!(segment("words here", f64::NAN, 6, true).is_empty());
    }

    #[test]
    fn dynamic_markup_wraps_emphasis() {
        let segments = segment("God is love.", 3.0, 6, true);
        let style = CaptionStyle {
            animation: Animation::FadeIn,
            position: Position::Center,
            ..CaptionStyle::default()
        };
        let entries = dynamic_entries(&segments, FrameSize::PORTRAIT_HD, &style);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].text,
            r"{\an5\pos(540,960)\fad(300,300)}{\b1\c&H00FFFF&}✨ God is love{\b0\c&HFFFFFF&}"
        );
    }

    #[test]
    fn word_highlight_emits_one_event_per_word() {
        let segments = segment("Be still and know.", 4.0, 6, false);
        let entries = word_highlight_entries(&segments, FrameSize::PORTRAIT_HD, &CaptionStyle::default());
        assert_eq!(entries.len(), 4);
        assert!(entries[1].text.contains(r"{\alpha&H80&}Be{\alpha&H00&}"));
        assert!(entries[1].text.contains(r"{\c&H00FFFF&\b1}still"));
        assert!(entries[1].text.contains(r"{\alpha&HFF&}know{\alpha&H00&}"));
        assert_eq!(entries.last().unwrap().end_ms, 4000);
        for pair in entries.windows(2) {
            assert!(pair[0].end_ms <= pair[1].start_ms);
        }
    }

    #[test]
    fn neon_entries_use_neon_style() {
        let segments = segment("Shine bright.", 2.0, 6, false);
        let entries = neon_entries(&segments, FrameSize::PORTRAIT_HD, &CaptionStyle::default());
        assert_eq!(entries[0].style.as_deref(), Some("Neon"));
        assert!(entries[0].text.contains(r"{\3c&HFF00FF&\3a&H80&\be1}Shine bright"));
    }

    #[tokio::test]
    async fn classic_family_writes_srt() {
        let dir = scratch();
        let style = CaptionStyle {
            family: CaptionFamily::Classic,
            ..CaptionStyle::default()
        };
        let captions = CaptionEngine::default()
            .render("Grace upon grace.", 2.0, &style, FrameSize::PORTRAIT_HD, &dir)
            .await
            .unwrap();
        let CaptionTrack::Plain(path) = &captions.track else {
            panic!("expected plain track");
        };
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("1\n00:00:00,000 --> 00:00:02,000\n✨ Grace upon grace\n"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn neon_family_writes_rich_track_with_neon_style() {
        let dir = scratch();
        let style = CaptionStyle {
            family: CaptionFamily::Neon,
            ..CaptionStyle::default()
        };
        let captions = CaptionEngine::default()
            .render("Light of the world.", 3.0, &style, FrameSize::PORTRAIT_HD, &dir)
            .await
            .unwrap();
        let CaptionTrack::Rich(path) = &captions.track else {
            panic!("expected rich track");
        };
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Style: Neon,"));
        assert!(content.contains(",Neon,,0,0,0,,"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn gradient_family_writes_frames_and_text_layer() {
        let dir = scratch();
        let engine = CaptionEngine::from_config(&CaptionSection {
            overlay_fps: 4,
            overlay_width: 18,
            overlay_height: 6,
            ..CaptionSection::default()
        });
        let style = CaptionStyle {
            family: CaptionFamily::Gradient,
            ..CaptionStyle::default()
        };
        let captions = engine
            .render("Peace be still.", 2.0, &style, FrameSize::PORTRAIT_HD, &dir)
            .await
            .unwrap();
        let CaptionTrack::Overlay { frames, text } = &captions.track else {
            panic!("expected overlay track");
        };
        assert_eq!(frames.frame_count, 8);
        assert!(dir.join("overlay/frame_00007.pam").exists());
        assert!(std::fs::read_to_string(text).unwrap().contains(r"\pos(540,1536)"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn empty_narration_fails() {
        let dir = scratch();
        let err = CaptionEngine::default()
            .render("  ", 10.0, &CaptionStyle::default(), FrameSize::PORTRAIT_HD, &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CaptionGenerationFailed(_)));

        let err = CaptionEngine::default()
            .render("words", 0.0, &CaptionStyle::default(), FrameSize::PORTRAIT_HD, &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CaptionGenerationFailed(_)));
        let _ = std::fs::remove_dir_all(dir);
    }
}

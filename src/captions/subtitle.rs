//! Timed-text track writers
//!
//! Supports SRT and ASS. ASS entries carry ready-made markup, so override
//! blocks survive; use [`escape_ass`] on any spoken text placed inside them.

use std::fmt::Write as FmtWrite;

use serde::{Deserialize, Serialize};

/// Track format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitleFormat {
    /// `SubRip` (.srt)
    #[default]
    Srt,
    /// Advanced `SubStation` Alpha (.ass)
    Ass,
}

impl SubtitleFormat {
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Srt => "srt",
            Self::Ass => "ass",
        }
    }
}

/// A single timed event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    /// Start time in milliseconds
    pub start_ms: u64,
    /// End time in milliseconds
    pub end_ms: u64,
    /// Event text; ASS markup for ASS tracks
    pub text: String,
    /// Style name (ASS only)
    pub style: Option<String>,
}

impl SubtitleEntry {
    #[must_use]
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            end_ms,
            text: text.into(),
            style: None,
        }
    }

    /// Build from offsets in seconds
    #[must_use]
    pub fn from_secs(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self::new(secs_to_ms(start), secs_to_ms(end), text)
    }

    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// Seconds to whole milliseconds, clamping negatives to zero
#[must_use]
pub fn secs_to_ms(secs: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ms = (secs.max(0.0) * 1000.0).round() as u64;
    ms
}

/// Format time as SRT timestamp (HH:MM:SS,mmm)
#[must_use]
pub fn format_srt_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Format time as ASS timestamp (H:MM:SS.cc)
#[must_use]
pub fn format_ass_time(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let centis = (ms % 1000) / 10;
    format!("{hours}:{minutes:02}:{seconds:02}.{centis:02}")
}

/// Escape spoken text for an ASS event
#[must_use]
pub fn escape_ass(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

/// One `[V4+ Styles]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssStyle {
    pub name: String,
    pub font_name: String,
    pub font_size: u32,
    /// `&HBBGGRR&`
    pub primary_color: String,
    pub secondary_color: String,
    pub outline_color: String,
    pub back_color: String,
    pub bold: bool,
    /// 1 = outline and shadow, 3 = opaque box
    pub border_style: u8,
    pub outline: f32,
    pub shadow: f32,
    /// Numpad alignment (1-9)
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
}

impl Default for AssStyle {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            font_name: "Arial".to_string(),
            font_size: 48,
            primary_color: "&HFFFFFF&".to_string(),
            secondary_color: "&HFFFFFF&".to_string(),
            outline_color: "&H000000&".to_string(),
            back_color: "&H80000000&".to_string(),
            bold: true,
            border_style: 1,
            outline: 3.0,
            shadow: 0.0,
            alignment: 2,
            margin_l: 10,
            margin_r: 10,
            margin_v: 10,
        }
    }
}

impl AssStyle {
    fn to_ass_line(&self) -> String {
        format!(
            "Style: {},{},{},{},{},{},{},{},0,0,0,100,100,0,0,{},{},{},{},{},{},{},1",
            self.name,
            self.font_name,
            self.font_size,
            self.primary_color,
            self.secondary_color,
            self.outline_color,
            self.back_color,
            if self.bold { -1 } else { 0 },
            self.border_style,
            self.outline,
            self.shadow,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v
        )
    }
}

/// Renders entries into a track
pub trait SubtitleGenerator: Send + Sync {
    fn format(&self) -> SubtitleFormat;

    fn generate(&self, entries: &[SubtitleEntry]) -> Result<String, std::fmt::Error>;
}

/// SRT generator
#[derive(Debug, Clone, Copy, Default)]
pub struct SrtGenerator;

impl SubtitleGenerator for SrtGenerator {
    fn format(&self) -> SubtitleFormat {
        SubtitleFormat::Srt
    }

    fn generate(&self, entries: &[SubtitleEntry]) -> Result<String, std::fmt::Error> {
        let mut output = String::new();

        for (i, entry) in entries.iter().enumerate() {
            writeln!(output, "{}", i + 1)?;
            writeln!(
                output,
                "{} --> {}",
                format_srt_time(entry.start_ms),
                format_srt_time(entry.end_ms)
            )?;
            writeln!(output, "{}", entry.text)?;
            writeln!(output)?;
        }

        Ok(output)
    }
}

/// ASS generator
#[derive(Debug, Clone)]
pub struct AssGenerator {
    pub play_res_x: u32,
    pub play_res_y: u32,
    pub styles: Vec<AssStyle>,
    pub title: String,
}

impl Default for AssGenerator {
    fn default() -> Self {
        Self {
            play_res_x: 1080,
            play_res_y: 1920,
            styles: Vec::new(),
            title: "Narration captions".to_string(),
        }
    }
}

impl AssGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.play_res_x = width;
        self.play_res_y = height;
        self
    }

    #[must_use]
    pub fn with_style(mut self, style: AssStyle) -> Self {
        self.styles.push(style);
        self
    }

    fn generate_header(&self) -> Result<String, std::fmt::Error> {
        let mut header = String::new();

        writeln!(header, "[Script Info]")?;
        writeln!(header, "Title: {}", self.title)?;
        writeln!(header, "ScriptType: v4.00+")?;
        writeln!(header, "PlayResX: {}", self.play_res_x)?;
        writeln!(header, "PlayResY: {}", self.play_res_y)?;
        writeln!(header, "WrapStyle: 0")?;
        writeln!(header, "ScaledBorderAndShadow: yes")?;
        writeln!(header)?;

        writeln!(header, "[V4+ Styles]")?;
        writeln!(
            header,
            "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
             OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, \
             ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, \
             MarginL, MarginR, MarginV, Encoding"
        )?;
        if self.styles.is_empty() {
            writeln!(header, "{}", AssStyle::default().to_ass_line())?;
        }
        for style in &self.styles {
            writeln!(header, "{}", style.to_ass_line())?;
        }
        writeln!(header)?;

        writeln!(header, "[Events]")?;
        writeln!(
            header,
            "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
        )?;

        Ok(header)
    }
}

impl SubtitleGenerator for AssGenerator {
    fn format(&self) -> SubtitleFormat {
        SubtitleFormat::Ass
    }

    fn generate(&self, entries: &[SubtitleEntry]) -> Result<String, std::fmt::Error> {
        let mut output = self.generate_header()?;

        for entry in entries {
            let style = entry.style.as_deref().unwrap_or("Default");
            writeln!(
                output,
                "Dialogue: 0,{},{},{},,0,0,0,,{}",
                format_ass_time(entry.start_ms),
                format_ass_time(entry.end_ms),
                style,
                entry.text
            )?;
        }

        Ok(output)
    }
}

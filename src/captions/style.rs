//! Caption style configuration
//!
//! A [`CaptionStyle`] picks the track family (rich ASS, plain SRT or raster
//! overlay) and the look of the captions. Colors are `#RRGGBB` strings and
//! converted to ASS `&HBBGGRR&` or RGB as each renderer needs.

use serde::{Deserialize, Serialize};

use crate::script::EmotionalTone;

/// Track family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionFamily {
    /// Rich track with per-segment animation, emphasis and icons
    #[default]
    Dynamic,
    /// Rich track with a glowing outline style
    Neon,
    /// Rich track, one event per word with the spoken word highlighted
    WordHighlight,
    /// Plain timed text
    Classic,
    /// Transparent raster frames composited as a video layer
    Gradient,
}

/// Entrance animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Animation {
    FadeIn,
    #[default]
    SlideUp,
    Typewriter,
    Bounce,
    Zoom,
}

impl Animation {
    /// ASS override block placing an event centred on `(x, y)` and
    /// animating its entrance
    #[must_use]
    pub fn ass_tag(&self, x: u32, y: u32) -> String {
        match self {
            Self::FadeIn => format!(r"{{\an5\pos({x},{y})\fad(300,300)}}"),
            Self::SlideUp => format!(r"{{\an5\move({x},{},{x},{y},0,300)}}", y + 50),
            Self::Typewriter => format!(r"{{\an5\pos({x},{y})\t(0,500,\1a&HFF&\1a&H00&)}}"),
            Self::Bounce => format!(
                r"{{\an5\pos({x},{y})\t(0,200,\fscx120\fscy120)\t(200,400,\fscx100\fscy100)}}"
            ),
            Self::Zoom => format!(
                r"{{\an5\pos({x},{y})\t(0,300,\fscx150\fscy150)\t(300,600,\fscx100\fscy100)}}"
            ),
        }
    }

    /// Vertical offset in pixels at `progress` (0..=1) through a segment
    #[must_use]
    pub fn y_offset(&self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            Self::SlideUp => 50.0 * (1.0 - p),
            Self::Bounce => -(p * std::f64::consts::PI).sin() * 20.0,
            Self::FadeIn | Self::Typewriter | Self::Zoom => 0.0,
        }
    }

    /// Opacity multiplier at `progress`; only fades vary it
    #[must_use]
    pub fn opacity(&self, progress: f64, segment_secs: f64) -> f64 {
        if !matches!(self, Self::FadeIn) || segment_secs <= 0.0 {
            return 1.0;
        }
        let t = progress.clamp(0.0, 1.0) * segment_secs;
        let fade = 0.3_f64.min(segment_secs / 2.0);
        if fade <= 0.0 {
            return 1.0;
        }
        (t / fade).min((segment_secs - t) / fade).clamp(0.0, 1.0)
    }
}

/// Vertical placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Bottom,
    Center,
    Top,
}

impl Position {
    /// ASS numpad alignment
    #[must_use]
    pub fn ass_alignment(&self) -> u8 {
        match self {
            Self::Bottom => 2,
            Self::Center => 5,
            Self::Top => 8,
        }
    }

    /// Vertical centre as a fraction of frame height
    #[must_use]
    pub fn anchor(&self) -> f64 {
        match self {
            Self::Bottom => 0.8,
            Self::Center => 0.5,
            Self::Top => 0.2,
        }
    }
}

/// Backdrop behind the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backdrop {
    None,
    #[default]
    Shadow,
    Box,
    Glow,
}

impl Backdrop {
    /// ASS `BorderStyle`, `Outline` and `Shadow` values
    #[must_use]
    pub fn ass_border(&self) -> (u8, f32, f32) {
        match self {
            Self::None => (1, 2.0, 0.0),
            Self::Shadow => (1, 3.0, 2.0),
            Self::Box => (3, 4.0, 0.0),
            Self::Glow => (1, 4.0, 0.0),
        }
    }
}

/// Caption style configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    pub family: CaptionFamily,
    /// `#RRGGBB` colors; the first is the primary text color
    pub palette: Vec<String>,
    pub font_size: u32,
    pub font_family: String,
    pub emojis: bool,
    pub animation: Animation,
    pub backdrop: Backdrop,
    pub position: Position,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            family: CaptionFamily::Dynamic,
            palette: tone_palette(None),
            font_size: 52,
            font_family: "Arial Black".to_string(),
            emojis: true,
            animation: Animation::SlideUp,
            backdrop: Backdrop::Shadow,
            position: Position::Bottom,
        }
    }
}

/// Text palette for a narration tone
#[must_use]
pub fn tone_palette(tone: Option<EmotionalTone>) -> Vec<String> {
    let colors: [&str; 3] = match tone {
        Some(EmotionalTone::Inspirational) => ["#FFD700", "#FF6B6B", "#4ECDC4"],
        Some(EmotionalTone::Dramatic) => ["#FF4757", "#2F3542", "#FFA502"],
        Some(EmotionalTone::Peaceful) => ["#70A1FF", "#7BED9F", "#DDA0DD"],
        Some(EmotionalTone::Energetic) => ["#FF6B35", "#F7931E", "#FFD700"],
        Some(EmotionalTone::Contemplative) => ["#6C5CE7", "#A29BFE", "#FD79A8"],
        None => ["#FFFFFF", "#FFFF00", "#FF6B6B"],
    };
    colors.iter().map(|c| (*c).to_string()).collect()
}

/// Entrance animation for a narration tone
#[must_use]
pub fn tone_animation(tone: Option<EmotionalTone>) -> Animation {
    match tone {
        Some(EmotionalTone::Energetic) => Animation::Bounce,
        Some(EmotionalTone::Dramatic) => Animation::Zoom,
        Some(EmotionalTone::Contemplative) => Animation::FadeIn,
        _ => Animation::SlideUp,
    }
}

impl CaptionStyle {
    /// Default style tuned to the narration's tone
    #[must_use]
    pub fn for_tone(tone: Option<EmotionalTone>) -> Self {
        Self {
            palette: tone_palette(tone),
            animation: tone_animation(tone),
            ..Self::default()
        }
    }

    /// Primary text color as RGB
    #[must_use]
    pub fn primary_rgb(&self) -> [u8; 3] {
        self.palette
            .first()
            .and_then(|c| parse_hex(c))
            .unwrap_or([0xFF, 0xFF, 0xFF])
    }

    /// Palette as RGB, skipping malformed entries; never empty
    #[must_use]
    pub fn palette_rgb(&self) -> Vec<[u8; 3]> {
        let colors: Vec<[u8; 3]> = self.palette.iter().filter_map(|c| parse_hex(c)).collect();
        if colors.is_empty() {
            vec![[0xFF, 0xFF, 0xFF]]
        } else {
            colors
        }
    }

    /// `force_style` string for burning a plain track
    #[must_use]
    pub fn force_style(&self) -> String {
        let (border_style, outline, shadow) = self.backdrop.ass_border();
        format!(
            "FontName={},FontSize={},PrimaryColour={},OutlineColour=&H000000,\
             BackColour=&H80000000,Bold=1,BorderStyle={border_style},Outline={outline},\
             Shadow={shadow},Alignment={}",
            self.font_family,
            self.font_size,
            ass_color(self.primary_rgb()),
            self.position.ass_alignment(),
        )
    }
}

/// Parse `#RRGGBB` (the `#` is optional)
#[must_use]
pub fn parse_hex(color: &str) -> Option<[u8; 3]> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// ASS color `&HBBGGRR&`
#[must_use]
pub fn ass_color([r, g, b]: [u8; 3]) -> String {
    format!("&H{b:02X}{g:02X}{r:02X}&")
}

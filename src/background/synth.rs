//! Synthesized backgrounds
//!
//! A vertical gradient still with translucent decorations, written as a
//! binary PPM and turned into a slow pan/zoom clip by the muxing engine.
//! Decorations are placed with an RNG seeded per job, so the same job always
//! gets the same frame.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::captions::style::parse_hex;
use crate::media::FrameSize;
use crate::script::EmotionalTone;

/// Used when nothing else suggests colors
pub const DEFAULT_PALETTE: [&str; 2] = ["#667eea", "#764ba2"];

/// White at 10% opacity
const DECORATION_ALPHA: f64 = 0.1;

/// Shapes drawn over the gradient
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoration {
    Circles { count: usize, min_radius: f64, max_radius: f64 },
    Triangles { count: usize },
}

impl Decoration {
    /// Shapes for a mood; dramatic moods get angular shapes
    #[must_use]
    pub fn for_mood(mood: Option<&str>) -> Self {
        let mood = mood.map(str::to_lowercase).unwrap_or_default();
        if mood.contains("dramatic") {
            Self::Triangles { count: 8 }
        } else if mood.contains("peaceful") {
            Self::Circles {
                count: 10,
                min_radius: 40.0,
                max_radius: 120.0,
            }
        } else {
            Self::Circles {
                count: 15,
                min_radius: 30.0,
                max_radius: 90.0,
            }
        }
    }
}

/// Mood palette table, keyed by words in the mood description
fn mood_palette(mood: &str) -> Option<[&'static str; 2]> {
    const TABLE: &[(&str, [&str; 2])] = &[
        ("peaceful", ["#70A1FF", "#7BED9F"]),
        ("calm", ["#70A1FF", "#7BED9F"]),
        ("dramatic", ["#2F3542", "#FF4757"]),
        ("storm", ["#2F3542", "#57606F"]),
        ("hope", ["#FFD700", "#FF6B6B"]),
        ("warm", ["#FFA502", "#FF6348"]),
        ("joy", ["#FFD700", "#FF6B35"]),
        ("energetic", ["#FF6B35", "#F7931E"]),
        ("contemplative", ["#6C5CE7", "#A29BFE"]),
        ("night", ["#1E272E", "#6C5CE7"]),
        ("inspirational", ["#FFD700", "#4ECDC4"]),
    ];
    let mood = mood.to_lowercase();
    TABLE
        .iter()
        .find(|(word, _)| mood.contains(word))
        .map(|(_, colors)| *colors)
}

fn parsed(colors: &[String]) -> Vec<[u8; 3]> {
    colors.iter().filter_map(|c| parse_hex(c)).collect()
}

/// Gradient stops for the still.
///
/// Precedence: script visual palette, job caption palette, mood table
/// (visual mood, then tone), default.
#[must_use]
pub fn palette(
    visual: &[String],
    caption: &[String],
    mood: Option<&str>,
    tone: Option<EmotionalTone>,
) -> Vec<[u8; 3]> {
    for colors in [parsed(visual), parsed(caption)] {
        if !colors.is_empty() {
            return colors;
        }
    }
    let table = mood
        .and_then(mood_palette)
        .or_else(|| tone.and_then(|t| mood_palette(t.as_str())))
        .unwrap_or(DEFAULT_PALETTE);
    table.iter().filter_map(|c| parse_hex(c)).collect()
}

/// Stable per-job seed
#[must_use]
pub fn seed_for(id: uuid::Uuid) -> u64 {
    let (high, low) = id.as_u64_pair();
    high ^ low
}

/// RGB canvas
struct Canvas {
    size: FrameSize,
    pixels: Vec<u8>,
}

impl Canvas {
    fn gradient(size: FrameSize, stops: &[[u8; 3]]) -> Self {
        let (w, h) = (size.width as usize, size.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..size.height {
            let t = if size.height > 1 {
                f64::from(y) / f64::from(size.height - 1)
            } else {
                0.0
            };
            let color = lerp_stops(stops, t);
            for _ in 0..w {
                pixels.extend_from_slice(&color);
            }
        }
        Self { size, pixels }
    }

    fn blend(&mut self, x: u32, y: u32) {
        let i = ((y as usize) * (self.size.width as usize) + x as usize) * 3;
        for c in &mut self.pixels[i..i + 3] {
            let v = f64::from(*c) + (255.0 - f64::from(*c)) * DECORATION_ALPHA;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = v.round().min(255.0) as u8;
            *c = v;
        }
    }

    /// Pixel range covering `[lo, hi]`, clipped to `0..limit`
    fn span(lo: f64, hi: f64, limit: u32) -> std::ops::Range<u32> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start = lo.floor().max(0.0) as u32;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let end = (hi.ceil().max(0.0) as u32).min(limit);
        start.min(end)..end
    }

    fn circle(&mut self, cx: f64, cy: f64, r: f64) {
        let FrameSize { width, height } = self.size;
        for y in Self::span(cy - r, cy + r, height) {
            for x in Self::span(cx - r, cx + r, width) {
                let dx = f64::from(x) + 0.5 - cx;
                let dy = f64::from(y) + 0.5 - cy;
                if dx * dx + dy * dy <= r * r {
                    self.blend(x, y);
                }
            }
        }
    }

    fn triangle(&mut self, a: (f64, f64), b: (f64, f64), c: (f64, f64)) {
        let edge = |p: (f64, f64), q: (f64, f64), x: f64, y: f64| {
            (q.0 - p.0) * (y - p.1) - (q.1 - p.1) * (x - p.0)
        };
        let FrameSize { width, height } = self.size;
        let ys = Self::span(a.1.min(b.1).min(c.1), a.1.max(b.1).max(c.1), height);
        let xs = Self::span(a.0.min(b.0).min(c.0), a.0.max(b.0).max(c.0), width);
        for y in ys {
            for x in xs.clone() {
                let (px, py) = (f64::from(x) + 0.5, f64::from(y) + 0.5);
                let e0 = edge(a, b, px, py);
                let e1 = edge(b, c, px, py);
                let e2 = edge(c, a, px, py);
                let inside = (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0)
                    || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0);
                if inside {
                    self.blend(x, y);
                }
            }
        }
    }

    fn into_ppm(self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.size.width, self.size.height).into_bytes();
        out.extend(self.pixels);
        out
    }
}

fn lerp_stops(stops: &[[u8; 3]], t: f64) -> [u8; 3] {
    match stops {
        [] => [0x66, 0x7e, 0xea],
        [only] => *only,
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let scaled = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let lower = (scaled.floor() as usize).min(stops.len() - 2);
            #[allow(clippy::cast_precision_loss)]
            let frac = scaled - lower as f64;
            let (a, b) = (stops[lower], stops[lower + 1]);
            let mix = |i: usize| {
                let v = f64::from(a[i]) + (f64::from(b[i]) - f64::from(a[i])) * frac;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let v = v.round().clamp(0.0, 255.0) as u8;
                v
            };
            [mix(0), mix(1), mix(2)]
        }
    }
}

/// Render the still as binary PPM bytes
#[must_use]
pub fn render_still(
    size: FrameSize,
    stops: &[[u8; 3]],
    decoration: Decoration,
    seed: u64,
) -> Vec<u8> {
    let mut canvas = Canvas::gradient(size, stops);
    let mut rng = StdRng::seed_from_u64(seed);
    let (w, h) = (f64::from(size.width), f64::from(size.height));

    match decoration {
        Decoration::Circles {
            count,
            min_radius,
            max_radius,
        } => {
            for _ in 0..count {
                let cx = rng.gen_range(0.0..w);
                let cy = rng.gen_range(0.0..h);
                let r = rng.gen_range(min_radius..=max_radius);
                canvas.circle(cx, cy, r);
            }
        }
        Decoration::Triangles { count } => {
            for _ in 0..count {
                let mut point = || (rng.gen_range(0.0..w), rng.gen_range(0.0..h));
                let (a, b, c) = (point(), point(), point());
                canvas.triangle(a, b, c);
            }
        }
    }
    canvas.into_ppm()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: FrameSize = FrameSize::new(40, 60);

    fn header_len(ppm: &[u8]) -> usize {
        let header = b"P6\n40 60\n255\n";
        assert!(ppm.starts_with(header));
        header.len()
    }

    #[test]
    fn palette_precedence() {
        let visual = vec!["#000000".to_string()];
        let caption = vec!["#FFFFFF".to_string()];
        assert_eq!(palette(&visual, &caption, None, None), vec![[0, 0, 0]]);
        assert_eq!(palette(&[], &caption, None, None), vec![[255, 255, 255]]);
        assert_eq!(
            palette(&[], &[], Some("Calm meadow"), None),
            vec![[0x70, 0xA1, 0xFF], [0x7B, 0xED, 0x9F]]
        );
        assert_eq!(
            palette(&[], &[], Some("unknown"), Some(EmotionalTone::Dramatic)),
            vec![[0x2F, 0x35, 0x42], [0xFF, 0x47, 0x57]]
        );
        assert_eq!(
            palette(&[], &[], None, None),
            vec![[0x66, 0x7e, 0xea], [0x76, 0x4b, 0xa2]]
        );
    }

    #[test]
    fn invalid_colors_fall_through() {
        let visual = vec!["blue".to_string()];
        assert_eq!(
            palette(&visual, &[], None, None),
            vec![[0x66, 0x7e, 0xea], [0x76, 0x4b, 0xa2]]
        );
    }

    #[test]
    fn decorations_follow_mood() {
        assert_eq!(
            Decoration::for_mood(Some("Dramatic storm")),
            Decoration::Triangles { count: 8 }
        );
        assert!(matches!(
            Decoration::for_mood(Some("peaceful")),
            Decoration::Circles { count: 10, .. }
        ));
        assert!(matches!(
            Decoration::for_mood(None),
            Decoration::Circles { count: 15, .. }
        ));
    }

    #[test]
    fn gradient_runs_top_to_bottom() {
        let ppm = render_still(SMALL, &[[0, 0, 0], [200, 200, 200]], Decoration::Triangles { count: 0 }, 1);
        let start = header_len(&ppm);
        assert_eq!(ppm.len(), start + 40 * 60 * 3);
        assert_eq!(&ppm[start..start + 3], &[0, 0, 0]);
        let last = ppm.len() - 3;
        assert_eq!(&ppm[last..], &[200, 200, 200]);
    }

    #[test]
    fn same_seed_same_frame() {
        let stops = [[10, 20, 30], [40, 50, 60]];
        let deco = Decoration::for_mood(None);
        let a = render_still(SMALL, &stops, deco, 42);
        let b = render_still(SMALL, &stops, deco, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn decorations_lighten_pixels() {
        let stops = [[0, 0, 0]];
        let deco = Decoration::Circles {
            count: 5,
            min_radius: 10.0,
            max_radius: 20.0,
        };
        let ppm = render_still(SMALL, &stops, deco, 7);
        let start = header_len(&ppm);
        assert!(ppm[start..].iter().any(|&b| b > 0));
    }

    #[test]
    fn seed_is_stable_per_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(seed_for(id), seed_for(id));
    }
}

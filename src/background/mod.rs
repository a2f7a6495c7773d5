//! Background Acquirer
//!
//! Stock-search mode asks the stock collaborator for footage and keeps the
//! best-scoring clip. Any search or download problem, or an empty result,
//! falls back to a synthesized motion background; only a synthesis failure
//! is fatal.

pub mod stock;
pub mod synth;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::job::BackgroundMode;
use crate::media::{FrameSize, MediaEngine, MotionRequest};
use crate::providers::StockMediaSearch;
use crate::script::{EmotionalTone, Motion, VisualHints};
use crate::workspace::WorkArea;

use self::synth::Decoration;

/// Search terms used when the script gives none
const FALLBACK_KEYWORDS: &[(&str, &str)] = &[
    ("genesis", "creation nature light"),
    ("david", "warrior shepherd fields"),
    ("goliath", "battle strength courage"),
    ("john 3:16", "love light hope"),
    ("psalm 23", "peaceful valley shepherd"),
    ("matthew 5", "mountain sermon teaching"),
    ("luke 2", "baby birth star"),
    ("romans 8", "victory freedom joy"),
    ("revelation", "heaven golden light"),
    ("noah", "ark rainbow storm"),
    ("moses", "desert mountain fire"),
    ("jesus", "peaceful light healing"),
    ("paul", "journey roads travel"),
    ("mary", "gentle mother peaceful"),
    ("peter", "ocean fishing boat"),
];

const DEFAULT_KEYWORDS: &str = "peaceful nature spiritual light";

/// Keywords for a topic reference from the fallback table
#[must_use]
pub fn fallback_keywords(topic: &str) -> Vec<String> {
    let topic = topic.to_lowercase();
    let words = FALLBACK_KEYWORDS
        .iter()
        .find(|(key, _)| topic.contains(key))
        .map_or(DEFAULT_KEYWORDS, |(_, words)| *words);
    words.split_whitespace().map(str::to_string).collect()
}

/// What the acquirer needs to know about the job
#[derive(Debug, Clone, Default)]
pub struct BackgroundRequest {
    pub job_id: Uuid,
    pub topic: String,
    pub mode: BackgroundMode,
    /// Search keywords from the script; blanks already removed
    pub keywords: Vec<String>,
    pub frame: FrameSize,
    /// Length the clip must cover
    pub duration_secs: f64,
    pub visual: Option<VisualHints>,
    pub tone: Option<EmotionalTone>,
    /// Palette of the job's caption style, if one was given
    pub caption_palette: Vec<String>,
}

/// Acquired background in the work area
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    pub path: PathBuf,
    pub size: u64,
    /// `stock:<page url>` or `synthesized`
    pub source: String,
    pub effective_mode: BackgroundMode,
}

/// Background Acquirer
#[derive(Clone)]
pub struct BackgroundAcquirer {
    stock: Arc<dyn StockMediaSearch>,
    engine: Arc<dyn MediaEngine>,
}

impl BackgroundAcquirer {
    #[must_use]
    pub fn new(stock: Arc<dyn StockMediaSearch>, engine: Arc<dyn MediaEngine>) -> Self {
        Self { stock, engine }
    }

    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.stock.name()
    }

    #[instrument(skip(self, request, area), fields(job_id = %request.job_id, mode = request.mode.as_str()))]
    pub async fn acquire(&self, request: &BackgroundRequest, area: &WorkArea) -> Result<Background> {
        match request.mode {
            // No generator collaborator exists; generated mode uses stock
            BackgroundMode::StockSearch | BackgroundMode::ExternalGenerated => {
                if let Some(background) = self.try_stock(request, area).await {
                    return Ok(background);
                }
                info!("Falling back to a synthesized background");
                self.synthesize(request, area).await
            }
            BackgroundMode::SynthesizedMotion => self.synthesize(request, area).await,
        }
    }

    async fn try_stock(&self, request: &BackgroundRequest, area: &WorkArea) -> Option<Background> {
        let keywords = if request.keywords.is_empty() {
            fallback_keywords(&request.topic)
        } else {
            request.keywords.clone()
        };
        let dest = area.file("background_stock.mp4");

        match stock::fetch_best(
            self.stock.as_ref(),
            &keywords,
            request.frame.orientation(),
            request.duration_secs,
            &dest,
        )
        .await
        {
            Ok(Some(clip)) => Some(Background {
                path: dest,
                size: clip.size,
                source: format!("stock:{}", clip.page_url),
                effective_mode: BackgroundMode::StockSearch,
            }),
            Ok(None) => {
                warn!(?keywords, "Stock search found no usable clip");
                None
            }
            Err(e) => {
                warn!(error = %e, "Stock search failed");
                None
            }
        }
    }

    async fn synthesize(&self, request: &BackgroundRequest, area: &WorkArea) -> Result<Background> {
        let fail = PipelineError::BackgroundAcquisitionFailed;

        let visual = request.visual.clone().unwrap_or_else(|| VisualHints {
            motion: Motion::Medium,
            ..VisualHints::default()
        });
        let mood = visual
            .mood
            .clone()
            .or_else(|| request.tone.map(|t| t.as_str().to_string()));
        let stops = synth::palette(
            &visual.color_palette,
            &request.caption_palette,
            visual.mood.as_deref(),
            request.tone,
        );
        let still = synth::render_still(
            request.frame,
            &stops,
            Decoration::for_mood(mood.as_deref()),
            synth::seed_for(request.job_id),
        );

        let image = area.file("background.ppm");
        tokio::fs::write(&image, &still)
            .await
            .map_err(|e| fail(format!("writing {}: {e}", image.display())))?;

        let output = area.file("background.mp4");
        self.engine
            .render_motion(&MotionRequest {
                image,
                output: output.clone(),
                duration_secs: request.duration_secs,
                frame: request.frame,
                zoom_rate: visual.motion.zoom_rate(),
            })
            .await
            .map_err(|e| fail(e.to_string()))?;

        let size = tokio::fs::metadata(&output)
            .await
            .map_err(|e| fail(format!("motion clip missing: {e}")))?
            .len();
        Ok(Background {
            path: output,
            size,
            source: "synthesized".to_string(),
            effective_mode: BackgroundMode::SynthesizedMotion,
        })
    }
}

//! Script Generator
//!
//! Asks the text-generation collaborator for a structured script, validates
//! it and, when validation fails, sends a single repair instruction carrying
//! the bad payload and the error before giving up.

pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{PipelineError, Result};
use crate::job::{JobParams, VideoStyle};
use crate::providers::{CompletionRequest, TextGenerator};

const MIN_SCRIPT_CHARS: usize = 30;
const MAX_SCRIPT_CHARS: usize = 1000;
const MAX_HOOK_CHARS: usize = 100;
const MAX_CTA_CHARS: usize = 80;
const MAX_KEYWORDS: usize = 10;
const MIN_ESTIMATE_SECS: f64 = 15.0;
const MAX_ESTIMATE_SECS: f64 = 120.0;

/// Pause inserted before emphasised moments
const PAUSE: &str = "... ";

/// Overall feel of the narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalTone {
    Inspirational,
    Dramatic,
    Peaceful,
    Energetic,
    Contemplative,
}

impl EmotionalTone {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inspirational => "inspirational",
            Self::Dramatic => "dramatic",
            Self::Peaceful => "peaceful",
            Self::Energetic => "energetic",
            Self::Contemplative => "contemplative",
        }
    }
}

/// Camera motion for synthesized backgrounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motion {
    #[default]
    Slow,
    Medium,
    Fast,
    Static,
}

impl Motion {
    /// Zoom increment per output frame
    #[must_use]
    pub fn zoom_rate(&self) -> f64 {
        match self {
            Self::Slow => 0.0005,
            Self::Medium => 0.0015,
            Self::Fast => 0.003,
            Self::Static => 0.0,
        }
    }
}

/// Visual direction suggested alongside the script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualHints {
    pub mood: Option<String>,
    /// `#RRGGBB` colors
    pub color_palette: Vec<String>,
    pub motion: Motion,
}

/// A phrase worth stressing, with its rough offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    pub timestamp: f64,
    pub text: String,
    #[serde(default)]
    pub emphasis: bool,
}

/// Structured generator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub script: String,
    pub hook: String,
    pub call_to_action: String,
    #[serde(default)]
    pub key_moments: Vec<KeyMoment>,
    pub keywords: Vec<String>,
    pub estimated_duration: f64,
    #[serde(default)]
    pub emotional_tone: Option<EmotionalTone>,
    #[serde(default)]
    pub visual: Option<VisualHints>,
}

impl Script {
    /// Narration text handed to speech synthesis.
    ///
    /// Each emphasised key moment found verbatim in the script gets a short
    /// pause in front of it. Captions keep using the unpaced script.
    #[must_use]
    pub fn paced_narration(&self) -> String {
        let mut cuts: Vec<usize> = self
            .key_moments
            .iter()
            .filter(|m| m.emphasis && !m.text.trim().is_empty())
            .filter_map(|m| self.script.find(m.text.trim()))
            .filter(|&at| !self.script[..at].ends_with(PAUSE))
            .collect();
        cuts.sort_unstable();
        cuts.dedup();

        let mut out = String::with_capacity(self.script.len() + cuts.len() * PAUSE.len());
        let mut last = 0;
        for at in cuts {
            out.push_str(&self.script[last..at]);
            out.push_str(PAUSE);
            last = at;
        }
        out.push_str(&self.script[last..]);
        out
    }

    /// Keywords with blanks removed
    #[must_use]
    pub fn search_keywords(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Generator input, taken from the job parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRequest {
    pub topic: String,
    pub theme: Option<String>,
    pub custom_prompt: Option<String>,
    pub style: VideoStyle,
    pub duration_secs: u32,
    pub audio_genre: Option<String>,
}

impl From<&JobParams> for ScriptRequest {
    fn from(params: &JobParams) -> Self {
        Self {
            topic: params.topic.clone(),
            theme: params.theme.clone(),
            custom_prompt: params.custom_prompt.clone(),
            style: params.style,
            duration_secs: params.duration_secs,
            audio_genre: params.audio_genre.clone(),
        }
    }
}

/// Strip a markdown code fence around a payload, if present
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Decode a payload, tolerating code fences
pub(crate) fn parse_script(raw: &str) -> std::result::Result<Script, String> {
    serde_json::from_str(strip_fences(raw)).map_err(|e| format!("invalid JSON: {e}"))
}

/// Check a decoded script against the bounds for `duration_secs`
pub(crate) fn validate(script: &Script, duration_secs: u32) -> std::result::Result<(), String> {
    let chars = script.script.trim().chars().count();
    if !(MIN_SCRIPT_CHARS..=MAX_SCRIPT_CHARS).contains(&chars) {
        return Err(format!(
            "script must be {MIN_SCRIPT_CHARS}-{MAX_SCRIPT_CHARS} characters, got {chars}"
        ));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_words = (f64::from(duration_secs) * 3.0).ceil() as usize;
    let words = script.script.split_whitespace().count();
    if words > max_words {
        return Err(format!(
            "script has {words} words, at most {max_words} fit {duration_secs}s"
        ));
    }

    if script.hook.chars().count() > MAX_HOOK_CHARS {
        return Err(format!("hook exceeds {MAX_HOOK_CHARS} characters"));
    }
    if script.call_to_action.chars().count() > MAX_CTA_CHARS {
        return Err(format!("callToAction exceeds {MAX_CTA_CHARS} characters"));
    }
    if script.keywords.is_empty() || script.keywords.len() > MAX_KEYWORDS {
        return Err(format!(
            "keywords must hold 1-{MAX_KEYWORDS} entries, got {}",
            script.keywords.len()
        ));
    }

    let estimate = script.estimated_duration;
    if !(MIN_ESTIMATE_SECS..=MAX_ESTIMATE_SECS).contains(&estimate) {
        return Err(format!(
            "estimatedDuration must be {MIN_ESTIMATE_SECS}-{MAX_ESTIMATE_SECS}s, got {estimate}"
        ));
    }
    if let Some(moment) = script
        .key_moments
        .iter()
        .find(|m| !(0.0..=estimate).contains(&m.timestamp))
    {
        return Err(format!(
            "key moment at {}s lies outside 0-{estimate}s",
            moment.timestamp
        ));
    }
    Ok(())
}

fn parse_and_validate(raw: &str, duration_secs: u32) -> std::result::Result<Script, String> {
    let script = parse_script(raw)?;
    validate(&script, duration_secs)?;
    Ok(script)
}

/// Script Generator
#[derive(Clone)]
pub struct ScriptGenerator {
    text: Arc<dyn TextGenerator>,
}

impl ScriptGenerator {
    #[must_use]
    pub fn new(text: Arc<dyn TextGenerator>) -> Self {
        Self { text }
    }

    /// Provider name recorded in job metadata
    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.text.name()
    }

    /// Generate and validate a script, repairing a bad payload once
    #[instrument(skip(self, request), fields(topic = %request.topic, style = request.style.as_str()))]
    pub async fn generate(&self, request: &ScriptRequest) -> Result<Script> {
        let first = CompletionRequest {
            system: prompt::system_prompt(request),
            user: prompt::user_prompt(request),
            json: true,
        };
        let raw = self
            .text
            .complete(&first)
            .await
            .map_err(|e| PipelineError::ContentGenerationFailed(e.to_string()))?;

        let error = match parse_and_validate(&raw, request.duration_secs) {
            Ok(script) => {
                debug!(words = script.script.split_whitespace().count(), "Script accepted");
                return Ok(script);
            }
            Err(error) => error,
        };

        warn!(%error, "Script payload rejected, asking for a repair");
        let repair = CompletionRequest {
            system: first.system,
            user: prompt::repair_prompt(&raw, &error),
            json: true,
        };
        let repaired = self
            .text
            .complete(&repair)
            .await
            .map_err(|e| PipelineError::ContentGenerationFailed(e.to_string()))?;

        parse_and_validate(&repaired, request.duration_secs).map_err(|error| {
            PipelineError::ContentGenerationFailed(format!(
                "script still invalid after repair: {error}"
            ))
        })
    }
}

//! Speech Synthesizer Adapter
//!
//! One synthesis call per job. The audio is written into the work area and
//! its duration is probed from the file, never estimated from the text.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::SpeechSection;
use crate::error::{PipelineError, Result};
use crate::media::MediaEngine;
use crate::providers::{SpeechService, VoiceParams};
use crate::workspace::WorkArea;

impl From<&SpeechSection> for VoiceParams {
    fn from(section: &SpeechSection) -> Self {
        Self {
            model: section.model.clone(),
            voice: section.voice.clone(),
            speed: section.speed,
            format: section.format.clone(),
        }
    }
}

/// Synthesized narration in the work area
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub path: PathBuf,
    pub duration_secs: f64,
    pub size: u64,
}

/// Speech Synthesizer Adapter
#[derive(Clone)]
pub struct SpeechSynthesizer {
    service: Arc<dyn SpeechService>,
    engine: Arc<dyn MediaEngine>,
    voice: VoiceParams,
}

impl SpeechSynthesizer {
    #[must_use]
    pub fn new(
        service: Arc<dyn SpeechService>,
        engine: Arc<dyn MediaEngine>,
        voice: VoiceParams,
    ) -> Self {
        Self {
            service,
            engine,
            voice,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.service.name()
    }

    #[must_use]
    pub fn voice(&self) -> &VoiceParams {
        &self.voice
    }

    /// Synthesize `text` into `narration.<format>` and measure it
    #[instrument(skip(self, text, area), fields(chars = text.len()))]
    pub async fn synthesize(&self, text: &str, area: &WorkArea) -> Result<Narration> {
        let fail = PipelineError::SpeechSynthesisFailed;

        if text.trim().is_empty() {
            return Err(fail("narration is empty".to_string()));
        }

        let audio = self
            .service
            .synthesize(text, &self.voice)
            .await
            .map_err(|e| fail(e.to_string()))?;

        let path = area.file(&format!("narration.{}", self.voice.format));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| fail(format!("writing {}: {e}", path.display())))?;

        let duration_secs = self
            .engine
            .probe_duration(&path)
            .await
            .map_err(|e| fail(e.to_string()))?;
        if duration_secs.is_nan() || duration_secs <= 0.0 {
            return Err(fail(format!("narration has no duration ({duration_secs})")));
        }

        debug!(duration_secs, bytes = audio.len(), "Narration ready");
        Ok(Narration {
            path,
            duration_secs,
            size: audio.len() as u64,
        })
    }
}

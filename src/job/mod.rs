//! Video job data model and its transition rules
//!
//! A [`VideoJob`] moves strictly forward through [`JobStatus`] or straight
//! to `Failed`. Once a job is terminal every mutation is rejected, which is
//! how a cancellation stays in place while stage work is still in flight.

pub mod store;
pub mod updates;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::captions::style::CaptionStyle;
use crate::error::ErrorKind;
use crate::media::{FrameSize, Orientation};

/// Shortest accepted target duration, in seconds
pub const MIN_DURATION_SECS: u32 = 15;
/// Longest accepted target duration, in seconds
pub const MAX_DURATION_SECS: u32 = 90;
/// Maximum theme length in characters
pub const MAX_THEME_CHARS: usize = 100;
/// Maximum custom prompt length in characters
pub const MAX_PROMPT_CHARS: usize = 500;

/// Target platform style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStyle {
    #[default]
    Tiktok,
    InstagramReel,
    YoutubeShort,
}

impl VideoStyle {
    /// Output frame size for this style
    #[must_use]
    pub fn frame_size(&self) -> FrameSize {
        match self {
            Self::Tiktok | Self::InstagramReel | Self::YoutubeShort => FrameSize::PORTRAIT_HD,
        }
    }

    /// Orientation implied by the frame size
    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.frame_size().orientation()
    }

    /// Identifier used in prompts and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::InstagramReel => "instagram_reel",
            Self::YoutubeShort => "youtube_short",
        }
    }
}

/// How the background visual is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    #[default]
    StockSearch,
    SynthesizedMotion,
    ExternalGenerated,
}

impl BackgroundMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StockSearch => "stock_search",
            Self::SynthesizedMotion => "synthesized_motion",
            Self::ExternalGenerated => "external_generated",
        }
    }
}

/// Pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    GeneratingScript,
    GeneratingAudio,
    FetchingBackground,
    RenderingVideo,
    Uploading,
    Completed,
    Failed,
}

impl JobStatus {
    /// Progress percentage reached when entering this status
    #[must_use]
    pub fn checkpoint(&self) -> u8 {
        match self {
            Self::Pending | Self::Failed => 0,
            Self::GeneratingScript => 10,
            Self::GeneratingAudio => 30,
            Self::FetchingBackground => 50,
            Self::RenderingVideo => 70,
            Self::Uploading => 90,
            Self::Completed => 100,
        }
    }

    /// Position in the forward pipeline order
    fn ordinal(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::GeneratingScript => 1,
            Self::GeneratingAudio => 2,
            Self::FetchingBackground => 3,
            Self::RenderingVideo => 4,
            Self::Uploading => 5,
            Self::Completed => 6,
            Self::Failed => 7,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Why a mutation of a job was refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job is already in a terminal state")]
    Terminal,

    #[error("cannot move from {from:?} to {to:?}")]
    Backward { from: JobStatus, to: JobStatus },

    #[error("completed jobs cannot be cancelled")]
    AlreadyCompleted,
}

/// Produced asset types, each published under its own key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Audio,
    Background,
    FinalVideo,
}

impl AssetKind {
    /// Object key stem for this asset
    #[must_use]
    pub fn stem(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Background => "background",
            Self::FinalVideo => "final",
        }
    }
}

/// Immutable job input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// Topic reference (e.g. "Psalm 23:1" or "David & Goliath")
    pub topic: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub style: VideoStyle,
    #[serde(default)]
    pub background_mode: BackgroundMode,
    pub duration_secs: u32,
    #[serde(default)]
    pub caption_style: Option<CaptionStyle>,
    /// Audio genre hint ("lo-fi", "cinematic", "worship")
    #[serde(default)]
    pub audio_genre: Option<String>,
    /// Hold the job until this time; the scheduler starts it once due
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl JobParams {
    /// Create parameters with defaults for the optional fields
    #[must_use]
    pub fn new(topic: impl Into<String>, duration_secs: u32) -> Self {
        Self {
            topic: topic.into(),
            theme: None,
            custom_prompt: None,
            style: VideoStyle::default(),
            background_mode: BackgroundMode::default(),
            duration_secs,
            caption_style: None,
            audio_genre: None,
            scheduled_for: None,
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: VideoStyle) -> Self {
        self.style = style;
        self
    }

    #[must_use]
    pub fn with_background_mode(mut self, mode: BackgroundMode) -> Self {
        self.background_mode = mode;
        self
    }

    #[must_use]
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    #[must_use]
    pub fn with_caption_style(mut self, style: CaptionStyle) -> Self {
        self.caption_style = Some(style);
        self
    }

    #[must_use]
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Whether the job must wait for the scheduler at `now`
    #[must_use]
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_some_and(|at| at > now)
    }

    /// Check the bounds a caller must respect. Returns every violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.topic.trim().is_empty() {
            problems.push("topic reference is required".to_string());
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.duration_secs) {
            problems.push(format!(
                "duration must be between {MIN_DURATION_SECS} and {MAX_DURATION_SECS} seconds"
            ));
        }
        if self
            .theme
            .as_ref()
            .is_some_and(|t| t.chars().count() > MAX_THEME_CHARS)
        {
            problems.push(format!("theme cannot exceed {MAX_THEME_CHARS} characters"));
        }
        if self
            .custom_prompt
            .as_ref()
            .is_some_and(|p| p.chars().count() > MAX_PROMPT_CHARS)
        {
            problems.push(format!(
                "custom prompt cannot exceed {MAX_PROMPT_CHARS} characters"
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Free-form run metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_time_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_length_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_background_mode: Option<BackgroundMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotional_tone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_moments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption_segments: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub asset_sizes: BTreeMap<AssetKind, u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, String>,
}

/// Failure details recorded on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// The unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: Uuid,
    pub owner_id: String,
    pub params: JobParams,
    pub status: JobStatus,
    pub progress: u8,
    pub failure: Option<JobFailure>,
    pub narration: Option<String>,
    pub audio_url: Option<String>,
    pub background_url: Option<String>,
    pub final_video_url: Option<String>,
    pub metadata: JobMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// When a pipeline run was handed this job
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl VideoJob {
    /// Create a pending job
    #[must_use]
    pub fn new(owner_id: impl Into<String>, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            failure: None,
            narration: None,
            audio_url: None,
            background_url: None,
            final_video_url: None,
            metadata: JobMetadata::default(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            dispatched_at: None,
        }
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            Err(TransitionError::Terminal)
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move forward to `status`, raising progress to its checkpoint.
    pub fn advance(&mut self, status: JobStatus) -> Result<(), TransitionError> {
        self.ensure_open()?;
        if status == JobStatus::Failed || status.ordinal() <= self.status.ordinal() {
            return Err(TransitionError::Backward {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        self.progress = self.progress.max(status.checkpoint());
        if status == JobStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        self.touch();
        Ok(())
    }

    /// Mark the job failed. Progress is left where it was.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.status = JobStatus::Failed;
        self.failure = Some(JobFailure {
            kind,
            message: message.into(),
        });
        self.touch();
        Ok(())
    }

    /// Claim a pending job for a pipeline run. Returns `false` when the job
    /// was already claimed or has ended.
    pub fn dispatch(&mut self) -> bool {
        if self.status != JobStatus::Pending || self.dispatched_at.is_some() {
            return false;
        }
        self.dispatched_at = Some(Utc::now());
        self.touch();
        true
    }

    /// Pending, unclaimed and scheduled no later than `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.dispatched_at.is_none()
            && self.params.scheduled_for.is_some_and(|at| at <= now)
    }

    /// Record cancellation intent; completed jobs refuse it.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.status {
            JobStatus::Completed => Err(TransitionError::AlreadyCompleted),
            JobStatus::Failed => Err(TransitionError::Terminal),
            _ => self.fail(ErrorKind::Cancelled, "Cancelled by user"),
        }
    }

    pub fn record_narration(&mut self, narration: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_open()?;
        self.narration = Some(narration.into());
        self.touch();
        Ok(())
    }

    /// Attach a published asset URL and its size
    pub fn record_asset(
        &mut self,
        kind: AssetKind,
        url: impl Into<String>,
        size: u64,
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        let url = Some(url.into());
        match kind {
            AssetKind::Audio => self.audio_url = url,
            AssetKind::Background => self.background_url = url,
            AssetKind::FinalVideo => self.final_video_url = url,
        }
        self.metadata.asset_sizes.insert(kind, size);
        self.touch();
        Ok(())
    }

    /// Apply an edit to the metadata of a non-terminal job
    pub fn update_metadata(
        &mut self,
        edit: impl FnOnce(&mut JobMetadata),
    ) -> Result<(), TransitionError> {
        self.ensure_open()?;
        edit(&mut self.metadata);
        self.touch();
        Ok(())
    }

    /// Published URL for an asset kind
    #[must_use]
    pub fn asset_url(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::Audio => self.audio_url.as_deref(),
            AssetKind::Background => self.background_url.as_deref(),
            AssetKind::FinalVideo => self.final_video_url.as_deref(),
        }
    }
}

/// Snapshot handed to callers and subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub owner_id: String,
    pub topic: String,
    pub style: VideoStyle,
    pub background_mode: BackgroundMode,
    pub duration_secs: u32,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video_url: Option<String>,
    pub metadata: JobMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl From<&VideoJob> for JobView {
    fn from(job: &VideoJob) -> Self {
        Self {
            id: job.id,
            owner_id: job.owner_id.clone(),
            topic: job.params.topic.clone(),
            style: job.params.style,
            background_mode: job.params.background_mode,
            duration_secs: job.params.duration_secs,
            status: job.status,
            progress: job.progress,
            error_kind: job.failure.as_ref().map(|f| f.kind),
            error_message: job.failure.as_ref().map(|f| f.message.clone()),
            narration: job.narration.clone(),
            audio_url: job.audio_url.clone(),
            background_url: job.background_url.clone(),
            final_video_url: job.final_video_url.clone(),
            metadata: job.metadata.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            scheduled_for: job.params.scheduled_for,
        }
    }
}

impl JobView {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

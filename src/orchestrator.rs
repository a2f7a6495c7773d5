//! Job Orchestrator
//!
//! `submit` records a pending job and spawns its pipeline without waiting
//! for it. The pipeline walks the stages in order:
//!
//! ```text
//! PENDING -> GENERATING_SCRIPT -> GENERATING_AUDIO -> FETCHING_BACKGROUND
//!         -> RENDERING_VIDEO -> UPLOADING -> COMPLETED
//! ```
//!
//! A job with a future `scheduled_for` stays pending until the scheduler,
//! a periodic task started with [`Orchestrator::start_scheduler`], finds it
//! due and dispatches it.
//!
//! Every change is persisted through the job store first and then
//! broadcast. Any stage error fails the job; a change the store refuses
//! means the job was cancelled meanwhile, and the run stops without
//! persisting anything further. The work area is removed before the
//! terminal state is written.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::background::{BackgroundAcquirer, BackgroundRequest};
use crate::captions::style::CaptionStyle;
use crate::captions::CaptionEngine;
use crate::compositor::Compositor;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::job::store::{InMemoryJobStore, JobStore, Mutation, StoreError};
use crate::job::updates::UpdateHub;
use crate::job::{AssetKind, JobParams, JobStatus, JobView, TransitionError, VideoJob};
use crate::media::{FfmpegEngine, MediaEngine};
use crate::providers::{
    storage, ObjectStore, OpenAiSpeech, OpenAiText, PexelsSearch, SpeechService,
    StockMediaSearch, TextGenerator, VoiceParams,
};
use crate::publish::Publisher;
use crate::script::{ScriptGenerator, ScriptRequest};
use crate::speech::SpeechSynthesizer;
use crate::workspace::WorkArea;

/// External collaborators the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub speech: Arc<dyn SpeechService>,
    pub stock: Arc<dyn StockMediaSearch>,
    pub media: Arc<dyn MediaEngine>,
    pub objects: Arc<dyn ObjectStore>,
}

impl Collaborators {
    /// Vendor-backed collaborators from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            text: Arc::new(OpenAiText::from_config(&config.text)?),
            speech: Arc::new(OpenAiSpeech::from_config(&config.speech)?),
            stock: Arc::new(PexelsSearch::from_config(&config.stock)?),
            media: Arc::new(FfmpegEngine::from_config(config.media.clone())?),
            objects: Arc::from(storage::from_config(&config.storage)?),
        })
    }
}

/// Per-owner job counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub by_status: BTreeMap<JobStatus, usize>,
    pub completed_today: usize,
    /// Pending jobs still waiting for their scheduled time
    pub scheduled: usize,
}

/// Stage implementations
struct Stages {
    script: ScriptGenerator,
    speech: SpeechSynthesizer,
    background: BackgroundAcquirer,
    captions: CaptionEngine,
    compositor: Compositor,
    publisher: Publisher,
}

struct Inner {
    store: Arc<dyn JobStore>,
    hub: UpdateHub,
    stages: Stages,
    work_root: PathBuf,
    retention: Duration,
    limiter: Option<Arc<Semaphore>>,
    running: Mutex<HashMap<Uuid, JoinHandle<()>>>,
    scheduler: Mutex<Option<AbortHandle>>,
}

/// Caller-facing pipeline handle
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator over `store` and `collaborators`
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>, collaborators: Collaborators, config: &Config) -> Self {
        let Collaborators {
            text,
            speech,
            stock,
            media,
            objects,
        } = collaborators;

        let stages = Stages {
            script: ScriptGenerator::new(text),
            speech: SpeechSynthesizer::new(speech, media.clone(), VoiceParams::from(&config.speech)),
            background: BackgroundAcquirer::new(stock, media.clone()),
            captions: CaptionEngine::from_config(&config.captions),
            compositor: Compositor::new(media),
            publisher: Publisher::new(objects),
        };

        Self {
            inner: Arc::new(Inner {
                store,
                hub: UpdateHub::new(),
                stages,
                work_root: config.pipeline.work_root.clone(),
                retention: Duration::days(i64::from(config.retention.max_age_days)),
                limiter: config
                    .pipeline
                    .max_concurrent_jobs
                    .map(|n| Arc::new(Semaphore::new(n.max(1)))),
                running: Mutex::new(HashMap::new()),
                scheduler: Mutex::new(None),
            }),
        }
    }

    /// Orchestrator with vendor collaborators and an in-memory store
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(InMemoryJobStore::new()),
            Collaborators::from_config(config)?,
            config,
        ))
    }

    /// Record a pending job and start its pipeline in the background.
    ///
    /// Returns the pending snapshot without waiting for any stage. A job
    /// scheduled for later is only recorded; the scheduler starts it.
    #[instrument(skip(self, params), fields(topic = %params.topic))]
    pub async fn submit(&self, owner_id: &str, params: JobParams) -> Result<JobView> {
        params
            .validate()
            .map_err(|problems| PipelineError::InvalidParams(problems.join("; ")))?;

        let mut job = VideoJob::new(owner_id, params);
        let deferred = job.params.is_deferred(Utc::now());
        if !deferred {
            job.dispatch();
        }
        let id = job.id;
        let view = JobView::from(&job);
        self.inner.store.insert(job).await?;

        if deferred {
            info!(job_id = %id, scheduled_for = ?view.scheduled_for, "Job scheduled");
        } else {
            info!(job_id = %id, "Job submitted");
            self.spawn(id);
        }
        Ok(view)
    }

    /// Dispatch every scheduled job whose time has come. Returns how many
    /// were started.
    pub async fn start_due(&self) -> Result<usize> {
        let due = self.inner.store.list_due(Utc::now()).await?;
        let mut started = 0;
        for job in due {
            let mut claimed = false;
            let mutation: Mutation<'_> = Box::new(|job: &mut VideoJob| {
                claimed = job.dispatch();
                Ok(())
            });
            let outcome = self.inner.store.update(job.id, mutation).await;
            match outcome {
                Ok(_) if claimed => {
                    info!(job_id = %job.id, "Starting scheduled job");
                    self.spawn(job.id);
                    started += 1;
                }
                // Claimed elsewhere, cancelled or deleted meanwhile
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(started)
    }

    /// Check for due jobs every `period` until stopped. The first check
    /// runs immediately. Returns `false` when a scheduler is already running.
    pub fn start_scheduler(&self, period: std::time::Duration) -> bool {
        let mut slot = self.scheduler();
        if slot.is_some() {
            return false;
        }

        let inner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                match (Orchestrator { inner }).start_due().await {
                    Ok(0) => {}
                    Ok(started) => debug!(started, "Scheduler pass dispatched jobs"),
                    Err(e) => warn!(error = %e, "Scheduler pass failed"),
                }
            }
        });
        *slot = Some(task.abort_handle());
        info!(?period, "Scheduler started");
        true
    }

    /// Stop the scheduler. Returns `false` when none was running.
    pub fn stop_scheduler(&self) -> bool {
        match self.scheduler().take() {
            Some(handle) => {
                handle.abort();
                info!("Scheduler stopped");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn scheduler_running(&self) -> bool {
        self.scheduler().is_some()
    }

    pub async fn get(&self, id: Uuid) -> Result<JobView> {
        Ok(JobView::from(&self.inner.store.get(id).await?))
    }

    /// Jobs of `owner_id`, newest first
    pub async fn list(&self, owner_id: &str, limit: usize) -> Result<Vec<JobView>> {
        let jobs = self.inner.store.list_by_owner(owner_id, limit).await?;
        Ok(jobs.iter().map(JobView::from).collect())
    }

    /// Mark a job cancelled.
    ///
    /// Returns `false` for a completed job, which is left unchanged. An
    /// in-flight stage call is not interrupted; its result is discarded.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut changed = false;
        let mutation: Mutation<'_> = Box::new(|job: &mut VideoJob| {
            if job.status == JobStatus::Failed {
                return Ok(());
            }
            job.cancel()?;
            changed = true;
            Ok(())
        });

        let outcome = self.inner.store.update(id, mutation).await;
        match outcome {
            Ok(job) => {
                if changed {
                    info!(job_id = %id, "Job cancelled");
                    self.inner.hub.publish(JobView::from(&job));
                }
                Ok(true)
            }
            Err(StoreError::Rejected(TransitionError::AlreadyCompleted)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Stream of snapshots: the current one first, ending after a terminal one
    pub async fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, JobView>> {
        Ok(self
            .inner
            .hub
            .subscribe(self.inner.store.clone(), id)
            .await?)
    }

    /// Counts per status for an owner
    pub async fn stats(&self, owner_id: &str) -> Result<JobStats> {
        let jobs = self.inner.store.list_by_owner(owner_id, usize::MAX).await?;
        let today = Utc::now().date_naive();
        let mut stats = JobStats {
            total: jobs.len(),
            ..JobStats::default()
        };
        for job in &jobs {
            *stats.by_status.entry(job.status).or_default() += 1;
            if job.completed_at.is_some_and(|at| at.date_naive() == today) {
                stats.completed_today += 1;
            }
            if job.status == JobStatus::Pending
                && job.dispatched_at.is_none()
                && job.params.scheduled_for.is_some()
            {
                stats.scheduled += 1;
            }
        }
        Ok(stats)
    }

    /// Delete a terminal job and its published assets
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<JobView> {
        let job = self.inner.store.get(id).await?;
        if !job.status.is_terminal() {
            return Err(PipelineError::InvalidParams(format!(
                "job {id} is still running"
            )));
        }
        self.remove_assets(&job).await;
        let removed = self.inner.store.delete(id).await?;
        info!(job_id = %id, "Job deleted");
        Ok(JobView::from(&removed))
    }

    /// Remove terminal jobs untouched for longer than `max_age`, with their
    /// published assets. Returns how many were removed.
    pub async fn purge_expired(&self, max_age: Duration) -> Result<usize> {
        let cutoff: DateTime<Utc> = Utc::now() - max_age;
        let expired = self.inner.store.list_terminal_older_than(cutoff).await?;
        let mut removed = 0;
        for job in expired {
            self.remove_assets(&job).await;
            match self.inner.store.delete(job.id).await {
                Ok(_) => removed += 1,
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(removed, %cutoff, "Purged expired jobs");
        Ok(removed)
    }

    /// Configured retention age
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    /// Wait for a job's pipeline to finish and return its final snapshot.
    ///
    /// A scheduled job that has not started yet returns its pending snapshot.
    pub async fn wait_for(&self, id: Uuid) -> Result<JobView> {
        let task = self.running().remove(&id);
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(job_id = %id, error = %e, "Pipeline task ended abnormally");
            }
        }
        self.get(id).await
    }

    /// Stop the scheduler and wait for every running pipeline
    pub async fn shutdown(&self) {
        self.stop_scheduler();
        let tasks: Vec<(Uuid, JoinHandle<()>)> = self.running().drain().collect();
        debug!(tasks = tasks.len(), "Waiting for running pipelines");
        for (id, task) in tasks {
            if let Err(e) = task.await {
                error!(job_id = %id, error = %e, "Pipeline task ended abnormally");
            }
        }
    }

    async fn remove_assets(&self, job: &VideoJob) {
        let urls: Vec<(AssetKind, &str)> =
            [AssetKind::Audio, AssetKind::Background, AssetKind::FinalVideo]
                .into_iter()
                .filter_map(|kind| job.asset_url(kind).map(|url| (kind, url)))
                .collect();
        if !urls.is_empty() {
            self.inner.stages.publisher.remove_assets(job.id, &urls).await;
        }
    }

    fn spawn(&self, id: Uuid) {
        let mut running = self.running();
        let task = tokio::spawn(run(self.inner.clone(), id));
        running.insert(id, task);
    }

    fn scheduler(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn running(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// One detached pipeline run
async fn run(inner: Arc<Inner>, id: Uuid) {
    let _permit = match &inner.limiter {
        Some(limiter) => match limiter.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(e) => {
                inner
                    .finish(id, Err(PipelineError::Internal(e.to_string())))
                    .await;
                return;
            }
        },
        None => None,
    };

    let outcome = match WorkArea::create(&inner.work_root, id).await {
        Ok(mut area) => {
            let outcome = inner.execute(id, &area).await;
            if let Err(e) = area.cleanup().await {
                warn!(job_id = %id, error = %e, "Failed to remove work area");
            }
            outcome
        }
        Err(e) => Err(PipelineError::Internal(format!("work area: {e}"))),
    };

    inner.finish(id, outcome).await;
    inner
        .running
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
}

impl Inner {
    /// Persist a change, then broadcast it
    async fn persist(&self, id: Uuid, mutation: Mutation<'_>) -> Result<VideoJob> {
        let job = self.store.update(id, mutation).await?;
        self.hub.publish(JobView::from(&job));
        Ok(job)
    }

    async fn advance(&self, id: Uuid, status: JobStatus) -> Result<()> {
        debug!(job_id = %id, stage = ?status, "Entering stage");
        self.persist(id, Box::new(move |job: &mut VideoJob| job.advance(status)))
            .await
            .map(|_| ())
    }

    /// Stop before spending an upload on a job that is no longer running
    async fn ensure_running(&self, id: Uuid) -> Result<()> {
        if self.store.get(id).await?.status.is_terminal() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    async fn publish_asset(
        &self,
        id: Uuid,
        kind: AssetKind,
        path: &std::path::Path,
    ) -> Result<()> {
        self.ensure_running(id).await?;
        let published = self.stages.publisher.publish(id, kind, path).await?;
        let url = published.url.clone();
        let recorded = self
            .persist(
                id,
                Box::new(move |job: &mut VideoJob| {
                    job.record_asset(kind, published.url, published.size)
                }),
            )
            .await;

        match recorded {
            Ok(_) => Ok(()),
            Err(PipelineError::Cancelled) => {
                // Cancelled mid-upload: the job will never reference this object
                debug!(job_id = %id, %url, "Removing upload of cancelled job");
                self.stages
                    .publisher
                    .remove_assets(id, &[(kind, url.as_str())])
                    .await;
                Err(PipelineError::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, area), fields(job_id = %id))]
    async fn execute(&self, id: Uuid, area: &WorkArea) -> Result<()> {
        let job = self.store.get(id).await?;
        let params = job.params;
        let frame = params.style.frame_size();
        let stages = &self.stages;

        // Script
        self.advance(id, JobStatus::GeneratingScript).await?;
        let script = stages.script.generate(&ScriptRequest::from(&params)).await?;
        let narration_text = script.script.clone();
        let tone = script.emotional_tone;
        let moments = script.key_moments.len();
        let text_provider = stages.script.provider();
        self.persist(
            id,
            Box::new(move |job: &mut VideoJob| {
                job.record_narration(narration_text)?;
                job.update_metadata(|m| {
                    m.emotional_tone = tone.map(|t| t.as_str().to_string());
                    m.key_moments = Some(moments);
                    m.providers.insert("text".into(), text_provider.into());
                })
            }),
        )
        .await?;

        // Narration
        self.advance(id, JobStatus::GeneratingAudio).await?;
        let narration = stages
            .speech
            .synthesize(&script.paced_narration(), area)
            .await?;
        let audio_secs = narration.duration_secs;
        let voice_model = format!(
            "{}/{}",
            stages.speech.voice().model,
            stages.speech.voice().voice
        );
        let speech_provider = stages.speech.provider();
        let storage_provider = stages.publisher.provider();
        self.persist(
            id,
            Box::new(move |job: &mut VideoJob| {
                job.update_metadata(|m| {
                    m.audio_length_secs = Some(audio_secs);
                    m.voice_model = Some(voice_model);
                    m.providers.insert("speech".into(), speech_provider.into());
                    m.providers.insert("storage".into(), storage_provider.into());
                })
            }),
        )
        .await?;
        self.publish_asset(id, AssetKind::Audio, &narration.path).await?;

        // Background
        self.advance(id, JobStatus::FetchingBackground).await?;
        let caption_palette = params
            .caption_style
            .as_ref()
            .map(|s| s.palette.clone())
            .unwrap_or_default();
        let background = stages
            .background
            .acquire(
                &BackgroundRequest {
                    job_id: id,
                    topic: params.topic.clone(),
                    mode: params.background_mode,
                    keywords: script.search_keywords(),
                    frame,
                    duration_secs: audio_secs.max(f64::from(params.duration_secs)),
                    visual: script.visual.clone(),
                    tone,
                    caption_palette,
                },
                area,
            )
            .await?;
        let source = background.source.clone();
        let effective = background.effective_mode;
        let stock_provider = stages.background.provider();
        self.persist(
            id,
            Box::new(move |job: &mut VideoJob| {
                job.update_metadata(|m| {
                    m.background_source = Some(source);
                    m.effective_background_mode = Some(effective);
                    m.providers.insert("stock".into(), stock_provider.into());
                })
            }),
        )
        .await?;
        self.publish_asset(id, AssetKind::Background, &background.path)
            .await?;

        // Captions and mux
        self.advance(id, JobStatus::RenderingVideo).await?;
        let style = params
            .caption_style
            .clone()
            .unwrap_or_else(|| CaptionStyle::for_tone(tone));
        let captions_dir = area
            .subdir("captions")
            .await
            .map_err(|e| PipelineError::CaptionGenerationFailed(e.to_string()))?;
        let captions = stages
            .captions
            .render(&script.script, audio_secs, &style, frame, &captions_dir)
            .await?;
        let composition = stages
            .compositor
            .compose(
                &background.path,
                &narration.path,
                &captions.track,
                &style,
                frame,
                area.path(),
            )
            .await?;
        let segments = captions.segments.len();
        let render_secs = composition.render_secs;
        self.persist(
            id,
            Box::new(move |job: &mut VideoJob| {
                job.update_metadata(|m| {
                    m.caption_segments = Some(segments);
                    m.render_time_secs = Some(render_secs);
                })
            }),
        )
        .await?;

        // Final upload
        self.advance(id, JobStatus::Uploading).await?;
        self.publish_asset(id, AssetKind::FinalVideo, &composition.path)
            .await?;
        Ok(())
    }

    /// Persist the terminal state of a run
    async fn finish(&self, id: Uuid, outcome: Result<()>) {
        let result = match outcome {
            Ok(()) => self
                .persist(id, Box::new(|job: &mut VideoJob| job.advance(JobStatus::Completed)))
                .await
                .map(|_| info!(job_id = %id, "Job completed")),
            Err(PipelineError::Cancelled) => {
                info!(job_id = %id, "Run stopped after cancellation");
                return;
            }
            Err(e) => {
                warn!(job_id = %id, kind = %e.kind(), error = %e, "Job failed");
                let kind = e.kind();
                let message = e.user_message();
                self.persist(id, Box::new(move |job: &mut VideoJob| job.fail(kind, message)))
                    .await
                    .map(|_| ())
            }
        };

        match result {
            Ok(()) | Err(PipelineError::Cancelled) => {}
            Err(e) => error!(job_id = %id, error = %e, "Could not record job outcome"),
        }
    }
}

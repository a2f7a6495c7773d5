//! `VerseReel` - scripture topics to short-form vertical videos
//!
//! # Pipeline
//!
//! - **Script**: a language model writes narration, hook, keywords and mood
//! - **Narration**: text-to-speech, measured with ffprobe
//! - **Background**: best-scoring stock clip, or a synthesized gradient with slow motion
//! - **Captions**: timed word chunks as SRT, styled ASS, or gradient overlay frames
//! - **Compositing**: one ffmpeg pass muxes background, narration and captions
//! - **Publishing**: every asset lands under `videos/<job id>/` in the object store
//!
//! Jobs run in the background; callers poll or subscribe for progress.
//!
//! # Example
//!
//! ```rust,no_run
//! use versereel::{Config, JobParams, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let orchestrator = Orchestrator::from_config(&config)?;
//!     let job = orchestrator
//!         .submit("user-1", JobParams::new("Psalm 23:1", 45))
//!         .await?;
//!     let done = orchestrator.wait_for(job.id).await?;
//!     println!("{:?} {:?}", done.status, done.final_video_url);
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod captions;
pub mod compositor;
pub mod config;
pub mod error;
pub mod job;
pub mod media;
pub mod orchestrator;
pub mod providers;
pub mod publish;
pub mod script;
pub mod speech;
pub mod telemetry;
pub mod workspace;

pub use captions::style::{CaptionFamily, CaptionStyle};
pub use config::Config;
pub use error::{ErrorKind, PipelineError, Result};
pub use job::store::{InMemoryJobStore, JobStore};
pub use job::{BackgroundMode, JobParams, JobStatus, JobView, VideoStyle};
pub use orchestrator::{Collaborators, JobStats, Orchestrator};
pub use script::{EmotionalTone, Script};

/// Version of versereel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

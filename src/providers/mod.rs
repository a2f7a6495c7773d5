//! External collaborators consumed by the pipeline
//!
//! Each capability sits behind a narrow async trait so stages only see the
//! contract, never the vendor:
//!
//! - [`TextGenerator`]: instruction in, structured text out
//! - [`SpeechService`]: narration text in, audio bytes out
//! - [`StockMediaSearch`]: keywords in, scored-later candidates out
//! - [`ObjectStore`]: bytes in, durable URL out
//!
//! HTTP implementations live in [`openai`], [`pexels`] and [`storage`].

pub mod openai;
pub mod pexels;
pub mod storage;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::Orientation;

pub use openai::{OpenAiSpeech, OpenAiText};
pub use pexels::PexelsSearch;
pub use storage::{HttpObjectStore, LocalObjectStore};

/// Collaborator errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    Config(String),
}

/// One request to the text-generation capability
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instruction template, already rendered
    pub system: String,
    /// Parameters rendered as the user turn
    pub user: String,
    /// Ask for a JSON object payload
    pub json: bool,
}

/// Voice parameters for speech synthesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
}

/// A downloadable rendition of a stock clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFile {
    pub link: String,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl StockFile {
    #[must_use]
    pub fn orientation(&self) -> Option<Orientation> {
        Orientation::from_dimensions(self.width, self.height)
    }

    #[must_use]
    pub fn is_hd(&self) -> bool {
        self.quality
            .as_deref()
            .is_some_and(|q| q.eq_ignore_ascii_case("hd"))
    }
}

/// A stock search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCandidate {
    pub id: String,
    /// Canonical page URL of the clip
    pub page_url: String,
    pub duration_secs: f64,
    /// Lowercase descriptive tags
    pub tags: Vec<String>,
    pub files: Vec<StockFile>,
}

/// Text-generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name recorded in job metadata
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

/// Speech synthesis capability
#[async_trait]
pub trait SpeechService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str, voice: &VoiceParams) -> Result<Bytes, ProviderError>;
}

/// Stock-media search capability
#[async_trait]
pub trait StockMediaSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        keywords: &[String],
        orientation: Orientation,
    ) -> Result<Vec<StockCandidate>, ProviderError>;

    /// Download `url` into `dest`, returning the byte count
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProviderError>;
}

/// Durable object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Store `bytes` under `key` and return a stable URL
    async fn put(&self, bytes: Bytes, key: &str, content_type: &str)
        -> Result<String, ProviderError>;

    async fn delete(&self, key: &str) -> Result<(), ProviderError>;
}

/// Shared HTTP client for vendor APIs
pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("versereel/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turn a non-success response into [`ProviderError::Status`]
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    message.truncate(500);
    Err(ProviderError::Status {
        service,
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_file_hd_and_orientation() {
        let file = StockFile {
            link: "https://cdn/x.mp4".into(),
            quality: Some("HD".into()),
            width: 1080,
            height: 1920,
        };
        assert!(file.is_hd());
        assert_eq!(file.orientation(), Some(Orientation::Portrait));
    }

    #[test]
    fn stock_file_without_dimensions_has_no_orientation() {
        let file = StockFile {
            link: "x".into(),
            quality: None,
            width: 0,
            height: 0,
        };
        assert!(!file.is_hd());
        assert_eq!(file.orientation(), None);
    }

    #[test]
    fn status_error_names_service() {
        let err = ProviderError::Status {
            service: "pexels",
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "pexels returned HTTP 429: slow down");
    }
}

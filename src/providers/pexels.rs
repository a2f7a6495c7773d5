//! Pexels video search
//!
//! Pexels does not return tags for videos, so descriptive words are taken
//! from the page slug (`/video/sunset-over-the-sea-123456/`).

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

use super::{check_status, http_client, ProviderError, StockCandidate, StockFile, StockMediaSearch};
use crate::config::StockSection;
use crate::media::Orientation;

pub struct PexelsSearch {
    client: Client,
    api_base: String,
    api_key: String,
    per_page: u32,
}

impl PexelsSearch {
    pub fn new(api_key: impl Into<String>, section: &StockSection) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            api_base: section.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            per_page: section.per_page,
        })
    }

    pub fn from_config(section: &StockSection) -> Result<Self, ProviderError> {
        let key = crate::config::secret_from_env(&section.api_key_env)
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        Self::new(key, section)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    url: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsFile {
    link: String,
    #[serde(default)]
    quality: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Words from the last non-numeric part of a Pexels page URL
fn slug_tags(page_url: &str) -> Vec<String> {
    let Ok(url) = Url::parse(page_url) else {
        return Vec::new();
    };
    let Some(slug) = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
    else {
        return Vec::new();
    };

    slug.split('-')
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_lowercase)
        .collect()
}

fn into_candidates(response: SearchResponse) -> Vec<StockCandidate> {
    response
        .videos
        .into_iter()
        .map(|v| StockCandidate {
            id: v.id.to_string(),
            tags: slug_tags(&v.url),
            page_url: v.url,
            duration_secs: v.duration,
            files: v
                .video_files
                .into_iter()
                .map(|f| StockFile {
                    link: f.link,
                    quality: f.quality,
                    width: f.width.unwrap_or(0),
                    height: f.height.unwrap_or(0),
                })
                .collect(),
        })
        .collect()
}

#[async_trait]
impl StockMediaSearch for PexelsSearch {
    fn name(&self) -> &'static str {
        "pexels"
    }

    #[instrument(skip(self), fields(orientation = orientation.as_str()))]
    async fn search(
        &self,
        keywords: &[String],
        orientation: Orientation,
    ) -> Result<Vec<StockCandidate>, ProviderError> {
        let url = format!("{}/videos/search", self.api_base);
        let query = keywords.join(" ");
        let per_page = self.per_page.to_string();
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.api_key)
            .query(&[
                ("query", query.as_str()),
                ("per_page", per_page.as_str()),
                ("orientation", orientation.as_str()),
                ("size", "medium"),
            ])
            .send()
            .await?;
        let body: SearchResponse = check_status("pexels", response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let candidates = into_candidates(body);
        debug!(count = candidates.len(), "Stock search returned");
        Ok(candidates)
    }

    #[instrument(skip(self, dest))]
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, ProviderError> {
        let response = check_status("pexels", self.client.get(url).send().await?).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(bytes = written, "Stock clip downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_come_from_slug() {
        assert_eq!(
            slug_tags("https://www.pexels.com/video/sunset-over-calm-sea-857195/"),
            vec!["sunset", "over", "calm", "sea"]
        );
    }

    #[test]
    fn tags_empty_for_bad_urls() {
        assert!(slug_tags("not a url").is_empty());
        assert!(slug_tags("https://www.pexels.com/").is_empty());
    }

    #[test]
    fn response_maps_to_candidates() {
        let raw = r#"{
            "page": 1,
            "videos": [{
                "id": 42,
                "url": "https://www.pexels.com/video/light-through-clouds-42/",
                "duration": 24,
                "video_files": [
                    {"link": "https://v/hd.mp4", "quality": "hd", "width": 1080, "height": 1920},
                    {"link": "https://v/sd.mp4", "quality": "sd", "width": null, "height": null}
                ]
            }]
        }"#;
        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        let candidates = into_candidates(response);
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.id, "42");
        assert!((c.duration_secs - 24.0).abs() < f64::EPSILON);
        assert_eq!(c.tags, vec!["light", "through", "clouds"]);
        assert_eq!(c.files.len(), 2);
        assert_eq!(c.files[1].width, 0);
    }

    #[test]
    fn empty_response_is_no_candidates() {
        let response: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(into_candidates(response).is_empty());
    }
}

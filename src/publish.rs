//! Artifact Publisher
//!
//! Uploads one asset at a time to the object store under
//! `videos/{job id}/{audio|background|final}.{ext}`.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::job::AssetKind;
use crate::providers::ObjectStore;

/// Content type from a file extension
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ppm" => "image/x-portable-pixmap",
        _ => "application/octet-stream",
    }
}

/// Object key for an asset
#[must_use]
pub fn object_key(job_id: Uuid, kind: AssetKind, path: &Path) -> String {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
    format!("videos/{job_id}/{}.{ext}", kind.stem())
}

/// Published asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub url: String,
    pub size: u64,
}

/// Artifact Publisher
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn provider(&self) -> &'static str {
        self.store.name()
    }

    /// Upload the file at `path` as the job's `kind` asset
    #[instrument(skip(self, path), fields(job_id = %job_id, kind = kind.stem()))]
    pub async fn publish(&self, job_id: Uuid, kind: AssetKind, path: &Path) -> Result<Published> {
        let fail = PipelineError::PublishFailed;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| fail(format!("reading {}: {e}", path.display())))?;
        let size = data.len() as u64;
        let key = object_key(job_id, kind, path);

        let url = self
            .store
            .put(Bytes::from(data), &key, content_type(path))
            .await
            .map_err(|e| fail(format!("{key}: {e}")))?;
        debug!(%url, size, "Published asset");
        Ok(Published { url, size })
    }

    /// Remove every published asset of a job.
    ///
    /// Best effort: failures are logged, the rest is still attempted.
    pub async fn remove_assets(&self, job_id: Uuid, urls: &[(AssetKind, &str)]) {
        for (kind, url) in urls {
            let Some(key) = key_from_url(job_id, *kind, url) else {
                warn!(%url, "Cannot derive object key from URL");
                continue;
            };
            if let Err(e) = self.store.delete(&key).await {
                warn!(%key, error = %e, "Failed to delete published asset");
            }
        }
    }
}

/// Recover the object key from a published URL
fn key_from_url(job_id: Uuid, kind: AssetKind, url: &str) -> Option<String> {
    let prefix = format!("videos/{job_id}/{}.", kind.stem());
    let start = url.find(&prefix)?;
    Some(url[start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalObjectStore;

    fn scratch(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("versereel-{name}-{}", Uuid::new_v4()))
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("final.mp4")), "video/mp4");
        assert_eq!(content_type(Path::new("narration.MP3")), "audio/mpeg");
        assert_eq!(content_type(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("x.ppm")), "image/x-portable-pixmap");
        assert_eq!(content_type(Path::new("x")), "application/octet-stream");
    }

    #[test]
    fn keys_follow_layout() {
        let id = Uuid::nil();
        assert_eq!(
            object_key(id, AssetKind::FinalVideo, Path::new("/tmp/w/final.mp4")),
            "videos/00000000-0000-0000-0000-000000000000/final.mp4"
        );
        assert_eq!(
            object_key(id, AssetKind::Audio, Path::new("narration.mp3")),
            "videos/00000000-0000-0000-0000-000000000000/audio.mp3"
        );
    }

    #[test]
    fn key_recovered_from_url() {
        let id = Uuid::nil();
        let url = format!("https://cdn.example.com/videos/{id}/background.mp4");
        assert_eq!(
            key_from_url(id, AssetKind::Background, &url).unwrap(),
            format!("videos/{id}/background.mp4")
        );
        assert!(key_from_url(id, AssetKind::Audio, &url).is_none());
    }

    #[tokio::test]
    async fn publish_and_remove_with_local_store() {
        let root = scratch("objects");
        let work = scratch("work");
        tokio::fs::create_dir_all(&work).await.unwrap();
        let file = work.join("narration.mp3");
        tokio::fs::write(&file, b"ID3").await.unwrap();

        let publisher = Publisher::new(Arc::new(LocalObjectStore::new(root.clone())));
        let id = Uuid::new_v4();
        let published = publisher.publish(id, AssetKind::Audio, &file).await.unwrap();
        assert_eq!(published.size, 3);
        assert!(published.url.starts_with("file://"));
        let stored = root.join(format!("videos/{id}/audio.mp3"));
        assert!(stored.exists());

        publisher
            .remove_assets(id, &[(AssetKind::Audio, published.url.as_str())])
            .await;
        assert!(!stored.exists());

        let _ = std::fs::remove_dir_all(root);
        let _ = std::fs::remove_dir_all(work);
    }

    #[tokio::test]
    async fn unreadable_file_is_publish_failure() {
        let publisher = Publisher::new(Arc::new(LocalObjectStore::new(scratch("objects"))));
        let err = publisher
            .publish(Uuid::new_v4(), AssetKind::Audio, Path::new("/definitely/missing.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PublishFailed(_)));
    }
}

//! Object store implementations

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{check_status, http_client, ObjectStore, ProviderError};
use crate::config::StorageSection;

/// Reject keys that would escape the store root
fn checked_key(key: &str) -> Result<&Path, ProviderError> {
    let path = Path::new(key);
    if key.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ProviderError::Config(format!("invalid object key {key:?}")));
    }
    Ok(path)
}

/// Stores objects below a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn url_for(path: &Path) -> String {
        format!("file://{}", path.display())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<String, ProviderError> {
        let dest = self.root.join(checked_key(key)?);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, &bytes).await?;
        debug!(key, content_type, bytes = bytes.len(), "Stored object locally");
        Ok(Self::url_for(&dest))
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        let path = self.root.join(checked_key(key)?);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Uploads objects with HTTP PUT
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    public_base: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        public_base: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn upload_url(&self, key: &str) -> String {
        format!("{}/{key}", self.endpoint)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn put(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<String, ProviderError> {
        checked_key(key)?;
        let request = self
            .client
            .put(self.upload_url(key))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        check_status("object store", self.authorize(request).send().await?).await?;
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        checked_key(key)?;
        let request = self.client.delete(self.upload_url(key));
        let response = self.authorize(request).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status("object store", response).await?;
        Ok(())
    }
}

/// Build the configured store
pub fn from_config(section: &StorageSection) -> Result<Box<dyn ObjectStore>, ProviderError> {
    match section {
        StorageSection::Local { directory } => Ok(Box::new(LocalObjectStore::new(directory.clone()))),
        StorageSection::Http {
            endpoint,
            public_base,
            token_env,
        } => {
            let token = token_env
                .as_deref()
                .map(crate::config::secret_from_env)
                .transpose()
                .map_err(|e| ProviderError::Config(e.to_string()))?;
            Ok(Box::new(HttpObjectStore::new(
                endpoint.clone(),
                public_base.clone(),
                token,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("versereel-store-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn local_put_writes_file_and_returns_file_url() {
        let root = scratch();
        let store = LocalObjectStore::new(&root);
        let url = store
            .put(Bytes::from_static(b"abc"), "videos/1/audio.mp3", "audio/mpeg")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("videos/1/audio.mp3"));
        let written = tokio::fs::read(root.join("videos/1/audio.mp3")).await.unwrap();
        assert_eq!(written, b"abc");

        store.delete("videos/1/audio.mp3").await.unwrap();
        store.delete("videos/1/audio.mp3").await.unwrap();
        assert!(!root.join("videos/1/audio.mp3").exists());
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn local_put_rejects_escaping_keys() {
        let store = LocalObjectStore::new(scratch());
        for key in ["../x", "/etc/passwd", ""] {
            assert!(store
                .put(Bytes::from_static(b"x"), key, "text/plain")
                .await
                .is_err());
        }
    }

    #[test]
    fn http_urls_join_cleanly() {
        let store = HttpObjectStore::new(
            "https://upload.example.com/bucket/",
            "https://cdn.example.com/",
            None,
        )
        .unwrap();
        assert_eq!(
            store.upload_url("videos/1/final.mp4"),
            "https://upload.example.com/bucket/videos/1/final.mp4"
        );
        assert_eq!(
            store.public_url("videos/1/final.mp4"),
            "https://cdn.example.com/videos/1/final.mp4"
        );
    }

    #[test]
    fn from_config_builds_local_store() {
        let store = from_config(&StorageSection::Local {
            directory: scratch(),
        })
        .unwrap();
        assert_eq!(store.name(), "local");
    }
}

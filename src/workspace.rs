//! Per-job work area
//!
//! Each run gets `<root>/<job id>/`, used by no other job. The directory is
//! removed by [`WorkArea::cleanup`] on every exit path; dropping an area that
//! was never cleaned removes it synchronously as a last resort.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Exclusive scratch directory for one job run
#[derive(Debug)]
pub struct WorkArea {
    path: PathBuf,
    cleaned: bool,
}

impl WorkArea {
    /// Create a fresh directory for `job_id` under `root`.
    ///
    /// Any leftover directory from an earlier run of the same id is removed
    /// first.
    pub async fn create(root: &Path, job_id: Uuid) -> io::Result<Self> {
        let path = root.join(job_id.to_string());
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            warn!(path = %path.display(), "Removing stale work area");
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Created work area");
        Ok(Self {
            path,
            cleaned: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the work area
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Create a sub-directory inside the work area
    pub async fn subdir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.path.join(name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Delete the directory and everything in it. Idempotent.
    pub async fn cleanup(&mut self) -> io::Result<()> {
        if self.cleaned {
            return Ok(());
        }
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.cleaned = true;
        debug!(path = %self.path.display(), "Removed work area");
        Ok(())
    }
}

impl Drop for WorkArea {
    fn drop(&mut self) {
        if !self.cleaned {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), "Work area left behind: {}", e);
                }
            }
        }
    }
}

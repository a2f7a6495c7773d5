//! Durable job records
//!
//! The orchestrator never holds a job across stages; it applies each change
//! through [`JobStore::update`], which runs the mutation under the store's
//! lock. A cancellation that lands between two stages therefore wins: the
//! next stage's mutation sees a terminal job and is rejected.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TransitionError, VideoJob};

/// Store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("transition rejected: {0}")]
    Rejected(TransitionError),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// An atomic edit of one job record
pub type Mutation<'a> = Box<dyn FnOnce(&mut VideoJob) -> Result<(), TransitionError> + Send + 'a>;

/// Persistence seam for job records
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: VideoJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<VideoJob, StoreError>;

    /// Jobs owned by `owner`, newest first
    async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<VideoJob>, StoreError>;

    /// Apply `mutation` atomically and return the stored result.
    ///
    /// When the mutation refuses, the record is left untouched.
    async fn update(&self, id: Uuid, mutation: Mutation<'_>) -> Result<VideoJob, StoreError>;

    /// Remove a record, returning it
    async fn delete(&self, id: Uuid) -> Result<VideoJob, StoreError>;

    /// Terminal jobs last touched before `cutoff`
    async fn list_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<VideoJob>, StoreError>;

    /// Scheduled jobs waiting to start at `now`, earliest first
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<VideoJob>, StoreError>;
}

/// Process-local store backed by a map
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, VideoJob>>,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: VideoJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Backend(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<VideoJob, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_by_owner(&self, owner: &str, limit: usize) -> Result<Vec<VideoJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut owned: Vec<VideoJob> = jobs
            .values()
            .filter(|j| j.owner_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn update(&self, id: Uuid, mutation: Mutation<'_>) -> Result<VideoJob, StoreError> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        // Work on a copy so a refused mutation leaves no partial edits
        let mut draft = stored.clone();
        mutation(&mut draft).map_err(StoreError::Rejected)?;
        *stored = draft.clone();
        Ok(draft)
    }

    async fn delete(&self, id: Uuid) -> Result<VideoJob, StoreError> {
        self.jobs
            .write()
            .await
            .remove(&id)
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_terminal_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<VideoJob>, StoreError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<VideoJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<VideoJob> = jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by_key(|j| j.params.scheduled_for);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobParams, JobStatus};

    fn job(owner: &str) -> VideoJob {
        VideoJob::new(owner, JobParams::new("Genesis 1:1", 30))
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        let id = j.id;
        store.insert(j).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().id, id);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn update_applies_mutation() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        let id = j.id;
        store.insert(j).await.unwrap();

        let updated = store
            .update(id, Box::new(|j| j.advance(JobStatus::GeneratingScript)))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::GeneratingScript);
        assert_eq!(store.get(id).await.unwrap().progress, 10);
    }

    #[tokio::test]
    async fn refused_mutation_leaves_record_untouched() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        let id = j.id;
        store.insert(j).await.unwrap();
        store
            .update(id, Box::new(|j| j.advance(JobStatus::Completed)))
            .await
            .unwrap();
        let before = store.get(id).await.unwrap();

        let err = store
            .update(
                id,
                Box::new(|j| {
                    j.narration = Some("sneaky".into());
                    j.advance(JobStatus::Uploading)
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(store.get(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn list_by_owner_is_newest_first_and_limited() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for offset in 0..3 {
            let mut j = job("owner");
            j.created_at += chrono::Duration::seconds(offset);
            ids.push(j.id);
            store.insert(j).await.unwrap();
        }
        store.insert(job("other")).await.unwrap();

        let listed = store.list_by_owner("owner", 2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
    }

    #[tokio::test]
    async fn terminal_listing_skips_running_jobs() {
        let store = InMemoryJobStore::new();
        let running = job("a");
        let mut done = job("a");
        done.advance(JobStatus::Completed).unwrap();
        let done_id = done.id;
        store.insert(running).await.unwrap();
        store.insert(done).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let old = store.list_terminal_older_than(cutoff).await.unwrap();
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].id, done_id);
    }

    #[tokio::test]
    async fn due_listing_orders_by_schedule_and_skips_claimed() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        let later = VideoJob::new(
            "a",
            JobParams::new("Ruth 1:16", 30).scheduled_for(now - chrono::Duration::seconds(5)),
        );
        let earlier = VideoJob::new(
            "a",
            JobParams::new("Ruth 1:17", 30).scheduled_for(now - chrono::Duration::minutes(5)),
        );
        let future = VideoJob::new(
            "a",
            JobParams::new("Ruth 1:18", 30).scheduled_for(now + chrono::Duration::hours(1)),
        );
        let (later_id, earlier_id) = (later.id, earlier.id);
        for j in [later, earlier, future, job("a")] {
            store.insert(j).await.unwrap();
        }

        let due = store.list_due(now).await.unwrap();
        let ids: Vec<Uuid> = due.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![earlier_id, later_id]);

        store
            .update(earlier_id, Box::new(|j| {
                j.dispatch();
                Ok(())
            }))
            .await
            .unwrap();
        let due = store.list_due(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, later_id);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = InMemoryJobStore::new();
        let j = job("a");
        let id = j.id;
        store.insert(j).await.unwrap();
        assert_eq!(store.len().await, 1);
        store.delete(id).await.unwrap();
        assert!(store.is_empty().await);
    }
}

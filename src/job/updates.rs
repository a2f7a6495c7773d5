//! Per-job update channel
//!
//! Every persisted change is published here as a [`JobView`]. Push is an
//! optimisation: subscribers start from a store snapshot and resync from the
//! store when they fall behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::store::{JobStore, StoreError};
use super::JobView;

const CHANNEL_CAPACITY: usize = 16;

type Channels = Arc<Mutex<HashMap<Uuid, broadcast::Sender<JobView>>>>;

/// Broadcast hub keyed by job id
#[derive(Debug, Default)]
pub struct UpdateHub {
    channels: Channels,
}

impl UpdateHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, id: Uuid) -> broadcast::Sender<JobView> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish a snapshot. Terminal snapshots close the channel.
    pub fn publish(&self, view: JobView) {
        let id = view.id;
        let terminal = view.is_terminal();
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(tx) = channels.get(&id) {
            // No receivers is fine: nobody is watching this job
            let delivered = tx.send(view).unwrap_or(0);
            debug!(job_id = %id, delivered, "Published job update");
        }
        if terminal {
            channels.remove(&id);
        }
    }

    /// Number of jobs with an open channel
    #[cfg(test)]
    #[must_use]
    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Subscribe to a job's updates.
    ///
    /// The stream yields the current snapshot first and ends after yielding
    /// a terminal snapshot.
    pub async fn subscribe(
        &self,
        store: Arc<dyn JobStore>,
        id: Uuid,
    ) -> Result<BoxStream<'static, JobView>, StoreError> {
        // Register before the snapshot so no change slips between the two
        let rx = self.sender(id).subscribe();
        let snapshot = match store.get(id).await {
            Ok(job) => JobView::from(&job),
            Err(e) => {
                drop(rx);
                forget_if_idle(&self.channels, id);
                return Err(e);
            }
        };

        if snapshot.is_terminal() {
            drop(rx);
            forget_if_idle(&self.channels, id);
            return Ok(stream::once(async move { snapshot }).boxed());
        }

        let state = Subscription {
            store,
            id,
            rx,
            _release: Release {
                channels: Arc::clone(&self.channels),
                id,
            },
            pending: Some(snapshot),
            done: false,
        };
        Ok(stream::unfold(state, Subscription::next).boxed())
    }
}

fn forget_if_idle(channels: &Channels, id: Uuid) {
    let mut channels = channels
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if channels.get(&id).is_some_and(|tx| tx.receiver_count() == 0) {
        channels.remove(&id);
    }
}

/// Drops the job's channel once its last subscriber goes away
struct Release {
    channels: Channels,
    id: Uuid,
}

impl Drop for Release {
    fn drop(&mut self) {
        forget_if_idle(&self.channels, self.id);
    }
}

// Field order matters: `rx` must drop before `_release` checks the count
struct Subscription {
    store: Arc<dyn JobStore>,
    id: Uuid,
    rx: broadcast::Receiver<JobView>,
    _release: Release,
    pending: Option<JobView>,
    done: bool,
}

impl Subscription {
    async fn next(mut self) -> Option<(JobView, Self)> {
        if self.done {
            return None;
        }
        if let Some(view) = self.pending.take() {
            self.done = view.is_terminal();
            return Some((view, self));
        }

        let view = match self.rx.recv().await {
            Ok(view) => view,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(job_id = %self.id, skipped, "Subscriber lagged, resyncing");
                JobView::from(&self.store.get(self.id).await.ok()?)
            }
            Err(broadcast::error::RecvError::Closed) => {
                // Closed after a terminal publish we may not have seen
                let latest = JobView::from(&self.store.get(self.id).await.ok()?);
                if !latest.is_terminal() {
                    return None;
                }
                latest
            }
        };
        self.done = view.is_terminal();
        Some((view, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::store::InMemoryJobStore;
    use crate::job::{JobParams, JobStatus, VideoJob};

    async fn setup() -> (Arc<dyn JobStore>, UpdateHub, Uuid) {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let job = VideoJob::new("u", JobParams::new("Psalm 23:1", 45));
        let id = job.id;
        store.insert(job).await.unwrap();
        (store, UpdateHub::new(), id)
    }

    async fn advance(store: &Arc<dyn JobStore>, hub: &UpdateHub, id: Uuid, status: JobStatus) {
        let job = store
            .update(id, Box::new(move |j| j.advance(status)))
            .await
            .unwrap();
        hub.publish(JobView::from(&job));
    }

    #[tokio::test]
    async fn subscriber_sees_snapshot_then_updates_then_ends() {
        let (store, hub, id) = setup().await;
        let mut updates = hub.subscribe(Arc::clone(&store), id).await.unwrap();

        advance(&store, &hub, id, JobStatus::GeneratingScript).await;
        advance(&store, &hub, id, JobStatus::Completed).await;

        let seen: Vec<JobStatus> = updates.by_ref().map(|v| v.status).collect().await;
        assert_eq!(
            seen,
            vec![
                JobStatus::Pending,
                JobStatus::GeneratingScript,
                JobStatus::Completed
            ]
        );
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn subscribing_to_terminal_job_yields_once() {
        let (store, hub, id) = setup().await;
        advance(&store, &hub, id, JobStatus::Completed).await;

        let seen: Vec<JobView> = hub
            .subscribe(Arc::clone(&store), id)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, JobStatus::Completed);
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn subscribing_to_unknown_job_fails() {
        let (store, hub, _) = setup().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            hub.subscribe(store, missing).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_resyncs_from_store() {
        let (store, hub, id) = setup().await;
        let updates = hub.subscribe(Arc::clone(&store), id).await.unwrap();

        // Overflow the channel without reaching a terminal state
        for _ in 0..(CHANNEL_CAPACITY + 4) {
            let job = store.get(id).await.unwrap();
            hub.publish(JobView::from(&job));
        }
        advance(&store, &hub, id, JobStatus::Completed).await;

        let seen: Vec<JobView> = updates.collect().await;
        assert_eq!(seen.first().map(|v| v.status), Some(JobStatus::Pending));
        assert_eq!(seen.last().map(|v| v.status), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn repeated_terminal_subscribes_leave_no_channel() {
        let (store, hub, id) = setup().await;
        advance(&store, &hub, id, JobStatus::Completed).await;

        for _ in 0..3 {
            let seen: Vec<JobView> = hub
                .subscribe(Arc::clone(&store), id)
                .await
                .unwrap()
                .collect()
                .await;
            assert_eq!(seen.len(), 1);
        }
        assert_eq!(hub.open_channels(), 0);
    }

    #[tokio::test]
    async fn dropping_live_stream_closes_channel() {
        let (store, hub, id) = setup().await;
        let mut first = hub.subscribe(Arc::clone(&store), id).await.unwrap();
        let second = hub.subscribe(Arc::clone(&store), id).await.unwrap();
        assert_eq!(first.next().await.map(|v| v.status), Some(JobStatus::Pending));
        assert_eq!(hub.open_channels(), 1);

        drop(second);
        assert_eq!(hub.open_channels(), 1);
        drop(first);
        assert_eq!(hub.open_channels(), 0);

        // A later publish for the abandoned job does not resurrect it
        advance(&store, &hub, id, JobStatus::GeneratingScript).await;
        assert_eq!(hub.open_channels(), 0);
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let hub = UpdateHub::new();
        let job = VideoJob::new("u", JobParams::new("x", 30));
        hub.publish(JobView::from(&job));
        assert_eq!(hub.open_channels(), 0);
    }
}

//! Pushes the authoritative dataset to every connected observer as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::response::sse::Event;
use futures::Stream;
use reconcile::Dataset;
use reconcile::protocol::DATASET_EVENT;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::authority::Authority;

static NEXT_SUBSCRIBER: AtomicU64 = AtomicU64::new(1);

/// One observer's view of the channel. Logs when the connection goes away.
struct Subscription {
    id: u64,
    authority: Arc<Authority>,
    pending: Option<Arc<Dataset>>,
    updates: broadcast::Receiver<Arc<Dataset>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our receiver is still counted until this returns.
        log::info!(
            "Subscriber {} disconnected ({} still open)",
            self.id,
            self.authority.subscriber_count().saturating_sub(1)
        );
    }
}

impl Subscription {
    async fn next(&mut self) -> Option<Arc<Dataset>> {
        if let Some(first) = self.pending.take() {
            return Some(first);
        }
        loop {
            match self.updates.recv().await {
                Ok(dataset) => return Some(dataset),
                // Every event is a full dataset; the next one covers what was missed.
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "Subscriber {} fell behind, skipped {skipped} update(s)",
                        self.id
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// The stream of `dataset` events for one new observer, starting with the current dataset.
pub async fn dataset_events(
    authority: Arc<Authority>,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let (current, updates) = authority.subscribe().await;
    let subscription = Subscription {
        id: NEXT_SUBSCRIBER.fetch_add(1, Ordering::Relaxed),
        pending: Some(current),
        updates,
        authority,
    };
    log::info!(
        "Subscriber {} connected ({} open)",
        subscription.id,
        subscription.authority.subscriber_count()
    );

    futures::stream::unfold(subscription, |mut subscription| async move {
        loop {
            let dataset = subscription.next().await?;
            match Event::default().event(DATASET_EVENT).json_data(&*dataset) {
                Ok(event) => return Some((Ok(event), subscription)),
                Err(e) => log::error!("Failed to encode dataset event: {e:?}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use reconcile::storage::DatasetFile;
    use serde_json::json;

    fn project(id: &str) -> Dataset {
        Dataset::from_value(json!({"projects": {id: {"id": id, "version": 1, "updatedAt": "T1"}}}))
            .unwrap()
    }

    #[tokio::test]
    async fn closing_the_stream_unsubscribes() {
        let dir = tempfile::tempdir().unwrap();
        let authority = Arc::new(
            Authority::open(DatasetFile::new(dir.path().join("dataset.json")), 8).unwrap(),
        );

        let first = Box::pin(dataset_events(Arc::clone(&authority)).await);
        let second = Box::pin(dataset_events(Arc::clone(&authority)).await);
        assert_eq!(authority.subscriber_count(), 2);

        drop(first);
        assert_eq!(authority.subscriber_count(), 1);
        drop(second);
        assert_eq!(authority.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn events_start_with_the_current_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let authority = Arc::new(
            Authority::open(DatasetFile::new(dir.path().join("dataset.json")), 8).unwrap(),
        );
        authority.reconcile(project("p1")).await.unwrap();

        let mut events = Box::pin(dataset_events(Arc::clone(&authority)).await);
        assert!(events.next().await.is_some());

        authority.reconcile(project("p2")).await.unwrap();
        assert!(events.next().await.is_some());
        assert_eq!(authority.subscriber_count(), 1);
    }
}

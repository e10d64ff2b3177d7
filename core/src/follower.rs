//! Pull-based snapshot reconciliation.
//!
//! A [`SnapshotFollower`] subscribes to a venue's topic, fetches a full
//! snapshot once on start and again after every notification, and publishes
//! the latest snapshot on a `watch` channel. A lagged subscription is handled
//! like any other notification.

use crate::consumer::QueueReader;
use crate::fanout::{ChangeFeed, QueueChanged};
use crate::types::{QueueSnapshot, VenueId};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Background task keeping a venue's snapshot current.
///
/// The task stops when the follower is dropped or the feed closes.
#[derive(Debug)]
pub struct SnapshotFollower {
    venue_id: VenueId,
    rx: watch::Receiver<Option<QueueSnapshot>>,
    handle: JoinHandle<()>,
}

impl SnapshotFollower {
    /// Subscribes to `venue_id` and starts following it.
    ///
    /// The subscription is taken before the first fetch, so no change between
    /// the two is missed.
    pub async fn spawn(reader: Arc<dyn QueueReader>, feed: &ChangeFeed, venue_id: VenueId) -> Self {
        let changes = feed.subscribe(venue_id).await;
        let (tx, rx) = watch::channel(None);

        let handle = tokio::spawn(follow(reader, venue_id, changes, tx));

        Self {
            venue_id,
            rx,
            handle,
        }
    }

    /// The followed venue.
    #[must_use]
    pub const fn venue_id(&self) -> VenueId {
        self.venue_id
    }

    /// Latest snapshot, `None` until the first fetch succeeds.
    #[must_use]
    pub fn latest(&self) -> Option<QueueSnapshot> {
        self.rx.borrow().clone()
    }

    /// A receiver for snapshot updates.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<QueueSnapshot>> {
        self.rx.clone()
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the follower task has stopped.
    pub async fn next(&mut self) -> Option<QueueSnapshot> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

impl Drop for SnapshotFollower {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn follow(
    reader: Arc<dyn QueueReader>,
    venue_id: VenueId,
    mut changes: broadcast::Receiver<QueueChanged>,
    tx: watch::Sender<Option<QueueSnapshot>>,
) {
    tracing::debug!(%venue_id, "Snapshot follower started");
    refetch(reader.as_ref(), venue_id, &tx).await;

    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Notifications carry no payload; one refetch covers them all
                    tracing::debug!(%venue_id, missed, "Follower lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            () = tx.closed() => break,
        }

        refetch(reader.as_ref(), venue_id, &tx).await;
    }

    tracing::debug!(%venue_id, "Snapshot follower stopped");
}

async fn refetch(
    reader: &dyn QueueReader,
    venue_id: VenueId,
    tx: &watch::Sender<Option<QueueSnapshot>>,
) {
    match reader.snapshot(venue_id).await {
        Ok(snapshot) => {
            tx.send_replace(Some(snapshot));
        }
        Err(err) => {
            tracing::warn!(%venue_id, error = %err, "Snapshot refetch failed, keeping previous");
        }
    }
}

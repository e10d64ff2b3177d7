//! Per-venue change notification.
//!
//! Every successful write publishes a payload-free [`QueueChanged`] on the
//! venue's topic. Subscribers respond by re-fetching a full snapshot, so a
//! lagged receiver loses nothing: one refetch covers any number of missed
//! notifications.
//!
//! ```text
//! engine write ──> ChangeFeed::publish(venue) ──┬──> host console
//!                                               ├──> display
//!                                               └──> singer views
//! ```

use crate::settings::DEFAULT_CHANGE_FEED_CAPACITY;
use crate::types::VenueId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// "Something changed for this venue; re-fetch."
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueChanged {
    /// Venue whose queue changed
    pub venue_id: VenueId,
}

/// Type alias for the topic map.
type TopicMap = Arc<RwLock<HashMap<VenueId, broadcast::Sender<QueueChanged>>>>;

/// Broadcast topics keyed by venue.
///
/// Cloning is cheap; clones share the same topics.
#[derive(Clone)]
pub struct ChangeFeed {
    topics: TopicMap,
    capacity: usize,
}

impl ChangeFeed {
    /// Creates a feed whose topics buffer `capacity` notifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Notifies every subscriber of `venue_id`.
    ///
    /// Returns the number of receivers reached. Publishing to a venue nobody
    /// follows is a no-op.
    pub async fn publish(&self, venue_id: VenueId) -> usize {
        let reached = {
            let topics = self.topics.read().await;
            match topics.get(&venue_id) {
                Some(sender) => sender.send(QueueChanged { venue_id }).unwrap_or(0),
                None => return 0,
            }
        };

        if reached == 0 {
            // Every receiver is gone
            let mut topics = self.topics.write().await;
            if topics
                .get(&venue_id)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                topics.remove(&venue_id);
            }
        }

        metrics::counter!("encore.notifications.published").increment(1);
        tracing::trace!(%venue_id, reached, "Published queue change");
        reached
    }

    /// Subscribes to `venue_id`'s topic, creating it on first use.
    ///
    /// Topics of other venues whose receivers have all been dropped are
    /// removed at the same time.
    pub async fn subscribe(&self, venue_id: VenueId) -> broadcast::Receiver<QueueChanged> {
        let mut topics = self.topics.write().await;
        let before = topics.len();
        topics.retain(|venue, sender| *venue == venue_id || sender.receiver_count() > 0);
        if topics.len() < before {
            tracing::debug!(removed = before - topics.len(), "Dropped abandoned change topics");
        }

        topics
            .entry(venue_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of venues with live subscribers.
    pub async fn topic_count(&self) -> usize {
        self.topics
            .read()
            .await
            .values()
            .filter(|sender| sender.receiver_count() > 0)
            .count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

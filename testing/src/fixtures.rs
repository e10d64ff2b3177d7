//! Builders for test entries and a ready-wired engine.

use crate::mocks::{ManualClock, TEST_EPOCH_SECS, test_clock};
use crate::store::InMemoryQueueStore;
use chrono::{DateTime, Utc};
use encore_core::engine::QueueEngine;
use encore_core::environment::Clock;
use encore_core::fanout::ChangeFeed;
use encore_core::settings::EngineSettings;
use encore_core::status::EntryStatus;
use encore_core::types::{QueueEntry, RequesterId, SongRequest, VenueId};
use std::sync::Arc;
use std::time::Duration;

/// An entry with the given status and position, requested at [`test_clock`] time.
///
/// Finished entries get `completed_at` set to the same instant.
#[must_use]
pub fn entry_fixture(venue_id: VenueId, status: EntryStatus, position: i64) -> QueueEntry {
    let requested_at = DateTime::<Utc>::from_timestamp(TEST_EPOCH_SECS, 0).unwrap_or_default();
    let mut entry = QueueEntry::submitted(
        request_fixture(venue_id, &format!("Song {position}")),
        position,
        requested_at,
    );
    entry.status = status;
    if status.is_finished() {
        entry.completed_at = Some(requested_at);
    }
    entry
}

/// A request from a fresh singer.
#[must_use]
pub fn request_fixture(venue_id: VenueId, song_title: &str) -> SongRequest {
    SongRequest::new(venue_id, RequesterId::new(), song_title, "Test Artist")
}

/// An engine over an in-memory store and a manual clock.
///
/// Conflict backoff is zero so retry tests run instantly.
#[derive(Clone, Debug)]
pub struct TestQueue {
    /// The engine under test
    pub engine: QueueEngine,
    /// Its store
    pub store: InMemoryQueueStore,
    /// Its clock, starting at [`test_clock`] time
    pub clock: ManualClock,
    /// Its change feed
    pub feed: ChangeFeed,
    /// A venue to work with
    pub venue_id: VenueId,
}

impl TestQueue {
    /// Default settings, zero backoff
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(EngineSettings {
            conflict_backoff: Duration::ZERO,
            ..EngineSettings::default()
        })
    }

    /// Custom settings
    #[must_use]
    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = InMemoryQueueStore::new();
        let clock = ManualClock::new(test_clock().now());
        let feed = ChangeFeed::new(settings.change_feed_capacity);
        let engine = QueueEngine::new(
            Arc::new(store.clone()),
            feed.clone(),
            Arc::new(clock.clone()),
            settings,
        );

        Self {
            engine,
            store,
            clock,
            feed,
            venue_id: VenueId::new(),
        }
    }

    /// Submits `song_title` from a fresh singer at [`TestQueue::venue_id`].
    ///
    /// # Panics
    ///
    /// Panics if the submission fails.
    #[allow(clippy::expect_used)]
    pub async fn submit(&self, song_title: &str) -> QueueEntry {
        self.engine
            .submit(request_fixture(self.venue_id, song_title))
            .await
            .expect("submission should succeed")
    }
}

impl Default for TestQueue {
    fn default() -> Self {
        Self::new()
    }
}

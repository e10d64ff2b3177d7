//! In-memory [`QueueStore`] for tests and single-process demos.
//!
//! Every operation runs inside one critical section, which gives the same
//! atomicity the Postgres store gets from transactions. Fault injection hooks
//! let tests provoke conflicts and outages.

use chrono::{DateTime, Utc};
use encore_core::error::StoreError;
use encore_core::plan::{self, EntryChange};
use encore_core::position;
use encore_core::status::EntryStatus;
use encore_core::store::{QueueStore, StoreFuture};
use encore_core::types::{EntryId, QueueEntry, RequesterId, SongRequest, VenueId, VenueQueueState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    /// Venue → paused
    venues: HashMap<VenueId, bool>,
    entries: HashMap<EntryId, QueueEntry>,
    /// Insertion order, for stable oldest-first reads
    order: Vec<EntryId>,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Faults {
    /// Upcoming `apply` calls that fail with a conflict
    conflicts: usize,
    unavailable: bool,
    apply_calls: usize,
}

impl State {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults.unavailable {
            Err(StoreError::Database("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn venue_entries(&self, venue_id: VenueId) -> impl Iterator<Item = &QueueEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(move |e| e.venue_id == venue_id)
    }

    fn active(&self, venue_id: VenueId) -> Vec<QueueEntry> {
        let mut active: Vec<QueueEntry> = self
            .venue_entries(venue_id)
            .filter(|e| e.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|e| e.position);
        active
    }

    fn insert(&mut self, entry: QueueEntry) {
        if !self.entries.contains_key(&entry.id) {
            self.order.push(entry.id);
        }
        self.entries.insert(entry.id, entry);
    }
}

/// Queue state held in process memory.
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use encore_testing::InMemoryQueueStore;
/// use encore_core::store::QueueStore;
/// use encore_core::types::VenueId;
///
/// # async fn example() -> Result<(), encore_core::StoreError> {
/// let store = InMemoryQueueStore::new();
/// let venue = VenueId::new();
///
/// assert!(store.toggle_paused(venue).await?);
/// assert!(!store.toggle_paused(venue).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryQueueStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryQueueStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other test
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `entry` as is, bypassing every check.
    pub fn seed(&self, entry: QueueEntry) {
        let mut state = self.lock();
        state.venues.entry(entry.venue_id).or_insert(false);
        state.insert(entry);
    }

    /// Every stored entry of a venue (any status), in insertion order.
    #[must_use]
    pub fn all_entries(&self, venue_id: VenueId) -> Vec<QueueEntry> {
        self.lock().venue_entries(venue_id).cloned().collect()
    }

    /// Total number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Makes the next `count` calls to [`QueueStore::apply`] fail with a conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().faults.conflicts = count;
    }

    /// While `true`, every operation fails with [`StoreError::Database`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    /// Number of [`QueueStore::apply`] calls so far, including failed ones.
    #[must_use]
    pub fn apply_calls(&self) -> usize {
        self.lock().faults.apply_calls
    }
}

impl QueueStore for InMemoryQueueStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.lock().check_available() })
    }

    fn ensure_venue(&self, venue_id: VenueId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_available()?;
            state.venues.entry(venue_id).or_insert(false);
            Ok(())
        })
    }

    fn venue_state(&self, venue_id: VenueId) -> StoreFuture<'_, VenueQueueState> {
        Box::pin(async move {
            let state = self.lock();
            state.check_available()?;
            Ok(VenueQueueState {
                venue_id,
                paused: state.venues.get(&venue_id).copied().unwrap_or(false),
            })
        })
    }

    fn toggle_paused(&self, venue_id: VenueId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_available()?;
            let paused = state.venues.entry(venue_id).or_insert(false);
            *paused = !*paused;
            Ok(*paused)
        })
    }

    fn set_paused(&self, venue_id: VenueId, paused: bool) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_available()?;
            state.venues.insert(venue_id, paused);
            Ok(paused)
        })
    }

    fn insert_waiting(
        &self,
        request: SongRequest,
        requested_at: DateTime<Utc>,
    ) -> StoreFuture<'_, QueueEntry> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_available()?;

            let venue_id = request.venue_id;
            if state.venues.get(&venue_id).copied().unwrap_or(false) {
                return Err(StoreError::VenuePaused(venue_id));
            }

            let tail = position::next_tail_position(state.venue_entries(venue_id));
            let entry = QueueEntry::submitted(request, tail, requested_at);
            state.venues.entry(venue_id).or_insert(false);
            state.insert(entry.clone());
            Ok(entry)
        })
    }

    fn entry(&self, entry_id: EntryId) -> StoreFuture<'_, Option<QueueEntry>> {
        Box::pin(async move {
            let state = self.lock();
            state.check_available()?;
            Ok(state.entries.get(&entry_id).cloned())
        })
    }

    fn active_entries(&self, venue_id: VenueId) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let state = self.lock();
            state.check_available()?;
            Ok(state.active(venue_id))
        })
    }

    fn skipped_since(
        &self,
        venue_id: VenueId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let state = self.lock();
            state.check_available()?;
            let mut skipped: Vec<QueueEntry> = state
                .venue_entries(venue_id)
                .filter(|e| {
                    e.status == EntryStatus::Skipped && e.completed_at.is_some_and(|at| at >= since)
                })
                .cloned()
                .collect();
            skipped.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
            Ok(skipped)
        })
    }

    fn entries_for_requester(
        &self,
        venue_id: VenueId,
        requester_id: RequesterId,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let state = self.lock();
            state.check_available()?;
            Ok(state
                .venue_entries(venue_id)
                .filter(|e| e.requester_id == requester_id)
                .cloned()
                .collect())
        })
    }

    fn apply(
        &self,
        venue_id: VenueId,
        changes: Vec<EntryChange>,
    ) -> StoreFuture<'_, Vec<QueueEntry>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.check_available()?;
            state.faults.apply_calls += 1;

            if state.faults.conflicts > 0 {
                state.faults.conflicts -= 1;
                return Err(StoreError::Conflict {
                    venue_id,
                    reason: "injected conflict".to_string(),
                });
            }

            let mut rows = state.active(venue_id);
            for change in &changes {
                if rows.iter().any(|e| e.id == change.entry_id) {
                    continue;
                }
                match state.entries.get(&change.entry_id) {
                    Some(entry) if entry.venue_id == venue_id => rows.push(entry.clone()),
                    _ => return Err(StoreError::NotFound(change.entry_id)),
                }
            }

            let updated = plan::apply_plan(venue_id, &rows, &changes)?;
            for entry in &updated {
                state.insert(entry.clone());
            }
            Ok(updated)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::entry_fixture;

    #[tokio::test]
    async fn test_insert_assigns_tail() {
        let store = InMemoryQueueStore::new();
        let venue = VenueId::new();
        store.seed(entry_fixture(venue, EntryStatus::NowSinging, 4));
        store.seed(entry_fixture(venue, EntryStatus::Completed, 9));

        let entry = store
            .insert_waiting(
                SongRequest::new(venue, RequesterId::new(), "Song", "Artist"),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(entry.position, 5);
        assert_eq!(entry.status, EntryStatus::Waiting);
    }

    #[tokio::test]
    async fn test_insert_refused_while_paused() {
        let store = InMemoryQueueStore::new();
        let venue = VenueId::new();
        store.set_paused(venue, true).await.unwrap();

        let result = store
            .insert_waiting(
                SongRequest::new(venue, RequesterId::new(), "Song", "Artist"),
                Utc::now(),
            )
            .await;

        assert_eq!(result, Err(StoreError::VenuePaused(venue)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_venue_reads_open() {
        let store = InMemoryQueueStore::new();
        let venue = VenueId::new();
        assert!(!store.venue_state(venue).await.unwrap().paused);
    }

    #[tokio::test]
    async fn test_failed_apply_writes_nothing() {
        let store = InMemoryQueueStore::new();
        let venue = VenueId::new();
        let a = entry_fixture(venue, EntryStatus::Waiting, 1);
        let b = entry_fixture(venue, EntryStatus::Waiting, 2);
        store.seed(a.clone());
        store.seed(b.clone());

        // First change is valid, second expects a stale position
        let mut stale = EntryChange::for_entry(&b)
            .with_position(plan::PositionChange::Exact(1));
        stale.expected.position = 7;
        let changes = vec![
            EntryChange::for_entry(&a).with_position(plan::PositionChange::Exact(2)),
            stale,
        ];

        let result = store.apply(venue, changes).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.active_entries(venue).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_reads() {
        let store = InMemoryQueueStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.active_entries(VenueId::new()).await,
            Err(StoreError::Database(_))
        ));
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}

//! Persistence boundary for queue state.
//!
//! Implementations:
//!
//! - `PostgresQueueStore` in `encore-postgres` (production)
//! - `InMemoryQueueStore` in `encore-testing` (tests, single-process demos)
//!
//! # Atomicity
//!
//! Every write method is one indivisible operation. [`QueueStore::apply`]
//! checks each change's expectation, resolves [`PositionChange::Tail`], writes
//! and validates inside a single transaction (or critical section), so a
//! composite command is never observed half-applied.
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so the engine can
//! hold an `Arc<dyn QueueStore>`.
//!
//! [`PositionChange::Tail`]: crate::plan::PositionChange::Tail

use crate::error::StoreError;
use crate::plan::EntryChange;
use crate::types::{EntryId, QueueEntry, RequesterId, SongRequest, VenueId, VenueQueueState};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`QueueStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable queue state, shared by every consumer of a venue.
pub trait QueueStore: Send + Sync {
    /// Cheap round trip used by readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the backend is unreachable.
    fn ping(&self) -> StoreFuture<'_, ()>;

    /// Registers a venue if it is unknown. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn ensure_venue(&self, venue_id: VenueId) -> StoreFuture<'_, ()>;

    /// A venue's flags. Unknown venues read as open.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn venue_state(&self, venue_id: VenueId) -> StoreFuture<'_, VenueQueueState>;

    /// Flips `paused` in one indivisible step and returns the new value.
    ///
    /// Two concurrent calls yield two flips.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn toggle_paused(&self, venue_id: VenueId) -> StoreFuture<'_, bool>;

    /// Sets `paused` explicitly and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn set_paused(&self, venue_id: VenueId, paused: bool) -> StoreFuture<'_, bool>;

    /// Appends a `waiting` entry at the venue's tail.
    ///
    /// The tail is resolved in the same atomic step as the pause check and the
    /// insert, so concurrent submissions never share a position.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VenuePaused`] if the venue is paused at write time
    /// - [`StoreError::Database`] on backend failure
    fn insert_waiting(
        &self,
        request: SongRequest,
        requested_at: DateTime<Utc>,
    ) -> StoreFuture<'_, QueueEntry>;

    /// Looks up one entry in any status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn entry(&self, entry_id: EntryId) -> StoreFuture<'_, Option<QueueEntry>>;

    /// Active entries of a venue, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn active_entries(&self, venue_id: VenueId) -> StoreFuture<'_, Vec<QueueEntry>>;

    /// Skipped entries with `completed_at >= since`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn skipped_since(
        &self,
        venue_id: VenueId,
        since: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<QueueEntry>>;

    /// Every entry a requester submitted at a venue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on backend failure.
    fn entries_for_requester(
        &self,
        venue_id: VenueId,
        requester_id: RequesterId,
    ) -> StoreFuture<'_, Vec<QueueEntry>>;

    /// Applies a plan atomically and returns the updated entries.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if a planned entry does not exist in the venue
    /// - [`StoreError::Conflict`] if a row no longer matches its expectation or
    ///   the result would break a per-venue invariant; nothing is written
    /// - [`StoreError::Database`] on backend failure
    fn apply(
        &self,
        venue_id: VenueId,
        changes: Vec<EntryChange>,
    ) -> StoreFuture<'_, Vec<QueueEntry>>;
}

//! Capability-scoped consumers of a venue's queue.
//!
//! - [`HostConsole`]: every operator command, reads, and its own confirmation countdown
//! - [`DisplayView`]: read-only view for the venue screen
//! - [`SingerView`]: submit and follow one singer's own requests
//!
//! All three read through [`QueueReader`], the read surface the engine
//! implements.

use crate::confirmation::{ConfirmationTracker, ConfirmationWindow, HeadAction, HeadStatus};
use crate::engine::QueueEngine;
use crate::environment::Clock;
use crate::error::QueueError;
use crate::plan::{self, PlanInput, QueueCommand};
use crate::status::EntryStatus;
use crate::types::{
    QueueEntry, QueueSnapshot, RequesterId, SongRequest, VenueId, VenueQueueState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by [`QueueReader`] methods.
pub type ReadFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Read surface shared by every consumer.
pub trait QueueReader: Send + Sync {
    /// The entry currently performing.
    fn now_singing(&self, venue_id: VenueId) -> ReadFuture<'_, Option<QueueEntry>>;

    /// The entry confirmed as next.
    fn up_next(&self, venue_id: VenueId) -> ReadFuture<'_, Option<QueueEntry>>;

    /// The line, ordered by position.
    fn waiting(&self, venue_id: VenueId) -> ReadFuture<'_, Vec<QueueEntry>>;

    /// Entries skipped within `window`, most recent first.
    fn recently_skipped(&self, venue_id: VenueId, window: Duration)
    -> ReadFuture<'_, Vec<QueueEntry>>;

    /// Everything a consumer renders, in one read.
    fn snapshot(&self, venue_id: VenueId) -> ReadFuture<'_, QueueSnapshot>;

    /// The venue's flags.
    fn venue_state(&self, venue_id: VenueId) -> ReadFuture<'_, VenueQueueState>;
}

impl QueueReader for QueueEngine {
    fn now_singing(&self, venue_id: VenueId) -> ReadFuture<'_, Option<QueueEntry>> {
        Box::pin(self.get_now_singing(venue_id))
    }

    fn up_next(&self, venue_id: VenueId) -> ReadFuture<'_, Option<QueueEntry>> {
        Box::pin(self.get_up_next(venue_id))
    }

    fn waiting(&self, venue_id: VenueId) -> ReadFuture<'_, Vec<QueueEntry>> {
        Box::pin(self.get_waiting(venue_id))
    }

    fn recently_skipped(
        &self,
        venue_id: VenueId,
        window: Duration,
    ) -> ReadFuture<'_, Vec<QueueEntry>> {
        Box::pin(self.get_recently_skipped(venue_id, window))
    }

    fn snapshot(&self, venue_id: VenueId) -> ReadFuture<'_, QueueSnapshot> {
        Box::pin(Self::snapshot(self, venue_id))
    }

    fn venue_state(&self, venue_id: VenueId) -> ReadFuture<'_, VenueQueueState> {
        Box::pin(Self::venue_state(self, venue_id))
    }
}

// ============================================================================
// Host console
// ============================================================================

/// Operator console for one venue.
///
/// Commands are previewed on the local snapshot with the same planner the
/// engine uses, so the console reflects them before the round trip. If the
/// engine rejects the command, the last snapshot read from the store is
/// restored.
pub struct HostConsole {
    engine: QueueEngine,
    venue_id: VenueId,
    tracker: ConfirmationTracker,
    /// What the console currently shows (possibly an optimistic preview)
    shown: Option<QueueSnapshot>,
    /// Last snapshot read from the store
    known_good: Option<QueueSnapshot>,
}

impl HostConsole {
    /// Creates a console; call [`HostConsole::refresh`] to load the queue.
    #[must_use]
    pub fn new(engine: QueueEngine, venue_id: VenueId) -> Self {
        let window = ConfirmationWindow::new(engine.settings().confirmation_window);
        Self {
            engine,
            venue_id,
            tracker: ConfirmationTracker::new(window),
            shown: None,
            known_good: None,
        }
    }

    /// The venue this console controls.
    #[must_use]
    pub const fn venue_id(&self) -> VenueId {
        self.venue_id
    }

    /// What the console currently shows.
    #[must_use]
    pub const fn snapshot(&self) -> Option<&QueueSnapshot> {
        self.shown.as_ref()
    }

    /// Re-reads the queue and updates the countdown.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure; the shown snapshot is kept.
    pub async fn refresh(&mut self) -> Result<&QueueSnapshot, QueueError> {
        let snapshot = self.engine.snapshot(self.venue_id).await?;
        self.tracker
            .observe(snapshot.head_of_line().map(|e| e.id), snapshot.fetched_at);
        self.known_good = Some(snapshot.clone());
        Ok(self.shown.insert(snapshot))
    }

    /// Countdown state for the head of line.
    #[must_use]
    pub fn head_status(&self, now: DateTime<Utc>) -> HeadStatus {
        self.tracker.status(now)
    }

    /// Runs an operator command with an optimistic preview.
    ///
    /// # Errors
    ///
    /// Any [`QueueError`] from the engine. The shown snapshot is rolled back to
    /// the last one read from the store.
    pub async fn run(&mut self, command: QueueCommand) -> Result<Vec<QueueEntry>, QueueError> {
        if let Some(preview) = self.preview(command) {
            self.shown = Some(preview);
        }

        match self.engine.execute(command).await {
            Ok(updated) => {
                if let Err(err) = self.refresh().await {
                    tracing::warn!(
                        venue_id = %self.venue_id,
                        error = %err,
                        "Refresh after command failed"
                    );
                }
                Ok(updated)
            }
            Err(err) => {
                tracing::debug!(venue_id = %self.venue_id, error = %err, "Rolling back preview");
                self.shown.clone_from(&self.known_good);
                Err(err)
            }
        }
    }

    /// Applies a head-of-line action offered by [`HostConsole::head_status`].
    ///
    /// # Errors
    ///
    /// - [`QueueError::Validation`] if the line is empty or the action is not
    ///   offered for the head's current countdown state
    /// - [`QueueError::Conflict`] if the shown head is no longer the head of
    ///   line; nothing is written and the console shows the fresh snapshot
    /// - any error from [`HostConsole::run`]
    pub async fn act(&mut self, action: HeadAction) -> Result<Vec<QueueEntry>, QueueError> {
        let status = self.tracker.status(self.engine.clock().now());
        let Some(entry_id) = status.entry_id() else {
            return Err(QueueError::Validation("Nobody is waiting".to_string()));
        };
        if !status.actions().contains(&action) {
            return Err(QueueError::Validation(format!(
                "Action {action:?} is not available for entry {entry_id} right now"
            )));
        }

        let fresh_head = self
            .engine
            .snapshot(self.venue_id)
            .await?
            .head_of_line()
            .map(|e| e.id);
        if fresh_head != Some(entry_id) {
            tracing::info!(
                venue_id = %self.venue_id,
                %entry_id,
                ?fresh_head,
                "Head of line changed before the action was applied"
            );
            if let Err(err) = self.refresh().await {
                tracing::warn!(
                    venue_id = %self.venue_id,
                    error = %err,
                    "Refresh after stale action failed"
                );
            }
            return Err(QueueError::Conflict {
                venue_id: self.venue_id,
                attempts: 1,
            });
        }

        self.run(action.command(entry_id)).await
    }

    /// Adds a request on a singer's behalf.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::submit`].
    pub async fn submit(&mut self, request: SongRequest) -> Result<QueueEntry, QueueError> {
        let entry = self.engine.submit(request).await?;
        if let Err(err) = self.refresh().await {
            tracing::warn!(venue_id = %self.venue_id, error = %err, "Refresh after submit failed");
        }
        Ok(entry)
    }

    /// Flips the pause flag.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::toggle_pause`].
    pub async fn toggle_pause(&mut self) -> Result<bool, QueueError> {
        let paused = self.engine.toggle_pause(self.venue_id).await?;
        if let Some(shown) = self.shown.as_mut() {
            shown.paused = paused;
        }
        Ok(paused)
    }

    /// Sets the pause flag.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::set_paused`].
    pub async fn set_paused(&mut self, paused: bool) -> Result<bool, QueueError> {
        let paused = self.engine.set_paused(self.venue_id, paused).await?;
        if let Some(shown) = self.shown.as_mut() {
            shown.paused = paused;
        }
        Ok(paused)
    }

    /// Plans `command` against the shown snapshot and returns the result.
    ///
    /// `None` if there is nothing loaded or the local plan fails; the engine
    /// has the final word either way.
    fn preview(&self, command: QueueCommand) -> Option<QueueSnapshot> {
        let shown = self.shown.as_ref()?;
        let active = shown.active_entries();
        let planned = plan::plan(
            command,
            PlanInput::new(&active, &shown.recently_skipped),
            shown.fetched_at,
        )
        .ok()?;

        let rows: Vec<QueueEntry> = active
            .iter()
            .chain(shown.recently_skipped.iter())
            .cloned()
            .collect();
        let updated = plan::apply_plan(self.venue_id, &rows, &planned).ok()?;

        let merged = rows.into_iter().map(|row| {
            updated
                .iter()
                .find(|u| u.id == row.id)
                .cloned()
                .unwrap_or(row)
        });
        let state = VenueQueueState {
            venue_id: self.venue_id,
            paused: shown.paused,
        };
        Some(QueueSnapshot::from_rows(state, merged, shown.fetched_at))
    }
}

impl std::fmt::Debug for HostConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConsole")
            .field("venue_id", &self.venue_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Display
// ============================================================================

/// What the venue screen renders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFrame {
    /// Queue contents, including recently skipped entries
    pub snapshot: QueueSnapshot,
    /// Countdown for the head of line
    pub head: HeadStatus,
}

/// Read-only view for a venue screen.
pub struct DisplayView {
    reader: Arc<dyn QueueReader>,
    venue_id: VenueId,
    tracker: ConfirmationTracker,
}

impl DisplayView {
    /// Creates a view over `reader`.
    #[must_use]
    pub fn new(
        reader: Arc<dyn QueueReader>,
        venue_id: VenueId,
        window: ConfirmationWindow,
    ) -> Self {
        Self {
            reader,
            venue_id,
            tracker: ConfirmationTracker::new(window),
        }
    }

    /// Reads the queue and derives the head's countdown.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn refresh(&mut self) -> Result<DisplayFrame, QueueError> {
        let snapshot = self.reader.snapshot(self.venue_id).await?;
        Ok(self.render(snapshot))
    }

    /// Derives a frame from a snapshot read elsewhere (e.g. by a follower).
    pub fn render(&mut self, snapshot: QueueSnapshot) -> DisplayFrame {
        let head = self
            .tracker
            .observe(snapshot.head_of_line().map(|e| e.id), snapshot.fetched_at);
        DisplayFrame { snapshot, head }
    }

    /// Countdown for the last rendered head at `now`.
    #[must_use]
    pub fn head_status(&self, now: DateTime<Utc>) -> HeadStatus {
        self.tracker.status(now)
    }
}

// ============================================================================
// Singer
// ============================================================================

/// One of a singer's requests as the singer sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// The entry
    pub entry: QueueEntry,
    /// Singers who will start before this one, while it is waiting
    pub ahead: Option<usize>,
}

/// A singer's view of one venue.
pub struct SingerView {
    engine: QueueEngine,
    venue_id: VenueId,
    requester_id: RequesterId,
}

impl SingerView {
    /// Creates a view for `requester_id` at `venue_id`.
    #[must_use]
    pub const fn new(engine: QueueEngine, venue_id: VenueId, requester_id: RequesterId) -> Self {
        Self {
            engine,
            venue_id,
            requester_id,
        }
    }

    /// Queues a song.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::submit`]; a paused venue yields
    /// [`QueueError::SubmissionPaused`].
    pub async fn submit(
        &self,
        song_title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Result<QueueEntry, QueueError> {
        self.engine
            .submit(SongRequest::new(
                self.venue_id,
                self.requester_id,
                song_title,
                artist,
            ))
            .await
    }

    /// The singer's requests, oldest first, with their place in line.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn my_requests(&self) -> Result<Vec<RequestStatus>, QueueError> {
        let entries = self
            .engine
            .requests_for(self.venue_id, self.requester_id)
            .await?;
        let snapshot = self.engine.snapshot(self.venue_id).await?;
        let up_next = usize::from(snapshot.up_next.is_some());

        Ok(entries
            .into_iter()
            .map(|entry| {
                let ahead = if entry.status == EntryStatus::Waiting {
                    snapshot.ahead_of(entry.id).map(|n| n + up_next)
                } else {
                    None
                };
                RequestStatus { entry, ahead }
            })
            .collect())
    }

    /// Whether the venue is taking requests.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn accepting_requests(&self) -> Result<bool, QueueError> {
        Ok(!self.engine.venue_state(self.venue_id).await?.paused)
    }
}

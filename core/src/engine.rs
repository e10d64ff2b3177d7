//! The queue engine: commands, submissions and reads for every venue.
//!
//! Each operator command follows the same path:
//!
//! ```text
//! load rows ──> plan (pure) ──> store.apply (atomic) ──> publish QueueChanged
//!     ▲                              │
//!     └──── StoreError::Conflict ────┘  (re-read and re-plan, bounded)
//! ```
//!
//! A notification is published only after a write succeeded. Invalid
//! transitions found on a fresh read are returned immediately.

use crate::environment::Clock;
use crate::error::{QueueError, StoreError};
use crate::fanout::{ChangeFeed, QueueChanged};
use crate::plan::{self, CommandKind, PlanInput, QueueCommand};
use crate::position::{self, Direction};
use crate::settings::EngineSettings;
use crate::status::EntryStatus;
use crate::store::QueueStore;
use crate::types::{
    EntryId, QueueEntry, QueueSnapshot, RequesterId, SongRequest, VenueId, VenueQueueState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const EPOCH: chrono::DateTime<chrono::Utc> = chrono::DateTime::UNIX_EPOCH;

/// Rows a command is planned against.
struct Loaded {
    venue_id: VenueId,
    active: Vec<QueueEntry>,
    inactive: Vec<QueueEntry>,
}

/// Queue operations shared by every consumer.
///
/// Cloning is cheap; clones share the store, the change feed and the clock.
#[derive(Clone)]
pub struct QueueEngine {
    store: Arc<dyn QueueStore>,
    feed: ChangeFeed,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl QueueEngine {
    /// Creates an engine over `store`, publishing on `feed`.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        feed: ChangeFeed,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            feed,
            clock,
            settings,
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The change feed notifications are published on.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// The engine's clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Subscribes to a venue's change notifications.
    pub async fn subscribe(&self, venue_id: VenueId) -> broadcast::Receiver<QueueChanged> {
        self.feed.subscribe(venue_id).await
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Appends a singer's request to the tail of the line.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Validation`] for a blank title or over-long text
    /// - [`QueueError::SubmissionPaused`] if the venue is paused; nothing is created
    /// - [`QueueError::Storage`] on store failure
    #[tracing::instrument(
        skip(self, request),
        fields(venue_id = %request.venue_id, requester_id = %request.requester_id)
    )]
    pub async fn submit(&self, request: SongRequest) -> Result<QueueEntry, QueueError> {
        let started = Instant::now();
        let result = self.submit_inner(request).await;
        record(CommandKind::Submit, &result, started);

        if let Ok(entry) = &result {
            tracing::info!(entry_id = %entry.id, position = entry.position, "Request queued");
        }
        result
    }

    async fn submit_inner(&self, request: SongRequest) -> Result<QueueEntry, QueueError> {
        let request = request.normalized()?;
        let venue_id = request.venue_id;

        self.store.ensure_venue(venue_id).await?;
        if self.store.venue_state(venue_id).await?.paused {
            return Err(QueueError::SubmissionPaused { venue_id });
        }

        // The store re-checks the flag in the same step as the insert
        let entry = self
            .store
            .insert_waiting(request, self.clock.now())
            .await?;

        self.feed.publish(venue_id).await;
        Ok(entry)
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    /// `waiting → up_next`.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn promote(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Promote { entry_id }).await
    }

    /// `up_next → now_singing`.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn start(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Start { entry_id }).await
    }

    /// `now_singing → completed`.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn complete(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Complete { entry_id }).await
    }

    /// `waiting | up_next → skipped`.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn skip(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Skip { entry_id }).await
    }

    /// Returns a skipped entry to the tail, or sends the head of line back.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn reinstate(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Reinstate { entry_id }).await
    }

    /// Exchanges the positions of two waiting entries.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn swap(&self, a: EntryId, b: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Swap { a, b }).await
    }

    /// Moves a waiting entry one place towards the head.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn move_up(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Move {
            entry_id,
            direction: Direction::Up,
        })
        .await
    }

    /// Moves a waiting entry one place towards the tail.
    ///
    /// # Errors
    ///
    /// See [`QueueEngine::execute`].
    pub async fn move_down(&self, entry_id: EntryId) -> Result<Vec<QueueEntry>, QueueError> {
        self.execute(QueueCommand::Move {
            entry_id,
            direction: Direction::Down,
        })
        .await
    }

    /// Runs an operator command and returns the entries it changed.
    ///
    /// # Errors
    ///
    /// - [`QueueError::EntryNotFound`] if a named entry does not exist
    /// - [`QueueError::InvalidTransition`] if the entry's status does not permit the command
    /// - [`QueueError::InvariantViolation`] for a second `up_next`/`now_singing`
    /// - [`QueueError::Validation`] for malformed reorders
    /// - [`QueueError::Conflict`] if concurrent writes kept invalidating the plan
    /// - [`QueueError::Storage`] on store failure
    #[tracing::instrument(skip(self), fields(command = %command.kind()))]
    pub async fn execute(&self, command: QueueCommand) -> Result<Vec<QueueEntry>, QueueError> {
        let started = Instant::now();
        let result = self.execute_with_retry(command).await;
        record(command.kind(), &result, started);
        result
    }

    async fn execute_with_retry(
        &self,
        command: QueueCommand,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let loaded = self.load(command).await?;
            let planned = plan::plan(
                command,
                PlanInput::new(&loaded.active, &loaded.inactive),
                self.clock.now(),
            )?;

            match self.store.apply(loaded.venue_id, planned.into_vec()).await {
                Ok(updated) => {
                    self.feed.publish(loaded.venue_id).await;
                    tracing::info!(
                        venue_id = %loaded.venue_id,
                        changed = updated.len(),
                        attempts,
                        "Command applied"
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { reason, .. })
                    if attempts <= self.settings.max_conflict_retries =>
                {
                    metrics::counter!("encore.conflict_retries").increment(1);
                    tracing::warn!(
                        venue_id = %loaded.venue_id,
                        attempts,
                        %reason,
                        "Queue changed during command, re-planning"
                    );
                    tokio::time::sleep(self.settings.conflict_backoff).await;
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(QueueError::Conflict {
                        venue_id: loaded.venue_id,
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads the venue's active rows plus any named entry that is not active.
    async fn load(&self, command: QueueCommand) -> Result<Loaded, QueueError> {
        let ids = command.entry_ids();
        let mut named = Vec::with_capacity(ids.len());
        for &id in &ids {
            let entry = self
                .store
                .entry(id)
                .await?
                .ok_or(QueueError::EntryNotFound(id))?;
            named.push(entry);
        }

        let venue_id = named
            .first()
            .map(|e| e.venue_id)
            .ok_or_else(|| QueueError::Validation("Command names no entry".to_string()))?;
        if named.iter().any(|e| e.venue_id != venue_id) {
            return Err(QueueError::Validation(
                "Entries belong to different venues".to_string(),
            ));
        }

        let active = self.store.active_entries(venue_id).await?;
        let inactive = named
            .into_iter()
            .filter(|e| !active.iter().any(|a| a.id == e.id))
            .collect();

        Ok(Loaded {
            venue_id,
            active,
            inactive,
        })
    }

    // ========================================================================
    // Pause control
    // ========================================================================

    /// Flips the venue's pause flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    #[tracing::instrument(skip(self))]
    pub async fn toggle_pause(&self, venue_id: VenueId) -> Result<bool, QueueError> {
        let started = Instant::now();
        let result = self.toggle_pause_inner(venue_id).await;
        record(CommandKind::Pause, &result, started);
        result
    }

    async fn toggle_pause_inner(&self, venue_id: VenueId) -> Result<bool, QueueError> {
        self.store.ensure_venue(venue_id).await?;
        let paused = self.store.toggle_paused(venue_id).await?;
        self.feed.publish(venue_id).await;
        tracing::info!(%venue_id, paused, "Pause toggled");
        Ok(paused)
    }

    /// Sets the venue's pause flag.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    #[tracing::instrument(skip(self))]
    pub async fn set_paused(&self, venue_id: VenueId, paused: bool) -> Result<bool, QueueError> {
        let started = Instant::now();
        let result = self.set_paused_inner(venue_id, paused).await;
        record(CommandKind::Pause, &result, started);
        result
    }

    async fn set_paused_inner(&self, venue_id: VenueId, paused: bool) -> Result<bool, QueueError> {
        self.store.ensure_venue(venue_id).await?;
        let paused = self.store.set_paused(venue_id, paused).await?;
        self.feed.publish(venue_id).await;
        tracing::info!(%venue_id, paused, "Pause set");
        Ok(paused)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The entry currently performing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn get_now_singing(
        &self,
        venue_id: VenueId,
    ) -> Result<Option<QueueEntry>, QueueError> {
        self.single_holder(venue_id, EntryStatus::NowSinging).await
    }

    /// The entry confirmed as next.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn get_up_next(&self, venue_id: VenueId) -> Result<Option<QueueEntry>, QueueError> {
        self.single_holder(venue_id, EntryStatus::UpNext).await
    }

    async fn single_holder(
        &self,
        venue_id: VenueId,
        status: EntryStatus,
    ) -> Result<Option<QueueEntry>, QueueError> {
        Ok(self
            .store
            .active_entries(venue_id)
            .await?
            .into_iter()
            .find(|e| e.status == status))
    }

    /// The line, ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn get_waiting(&self, venue_id: VenueId) -> Result<Vec<QueueEntry>, QueueError> {
        let active = self.store.active_entries(venue_id).await?;
        Ok(position::waiting_line(&active).into_iter().cloned().collect())
    }

    /// Entries skipped within `window` of now, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn get_recently_skipped(
        &self,
        venue_id: VenueId,
        window: Duration,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        // Floored at the epoch so every store can bind it
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let since = self
            .clock
            .now()
            .checked_sub_signed(window)
            .map_or(EPOCH, |since| since.max(EPOCH));
        Ok(self.store.skipped_since(venue_id, since).await?)
    }

    /// Full snapshot of a venue's queue, using the configured skip retention.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn snapshot(&self, venue_id: VenueId) -> Result<QueueSnapshot, QueueError> {
        let state = self.store.venue_state(venue_id).await?;
        let active = self.store.active_entries(venue_id).await?;
        let skipped = self
            .get_recently_skipped(venue_id, self.settings.skip_retention)
            .await?;

        Ok(QueueSnapshot::from_rows(
            state,
            active.into_iter().chain(skipped),
            self.clock.now(),
        ))
    }

    /// The venue's flags.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn venue_state(&self, venue_id: VenueId) -> Result<VenueQueueState, QueueError> {
        Ok(self.store.venue_state(venue_id).await?)
    }

    /// Every request a singer submitted at the venue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on store failure.
    pub async fn requests_for(
        &self,
        venue_id: VenueId,
        requester_id: RequesterId,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self
            .store
            .entries_for_requester(venue_id, requester_id)
            .await?)
    }
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn record<T>(kind: CommandKind, result: &Result<T, QueueError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(err) => {
            match err {
                QueueError::Storage(_) => {
                    tracing::error!(command = %kind, error = %err, "Command failed");
                }
                _ => tracing::warn!(command = %kind, error = %err, "Command rejected"),
            }
            err.code()
        }
    };

    metrics::counter!("encore.commands", "command" => kind.as_str(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("encore.command.duration_seconds", "command" => kind.as_str())
        .record(started.elapsed().as_secs_f64());
}

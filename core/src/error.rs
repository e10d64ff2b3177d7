//! Error types for queue operations and persistence.

use crate::plan::CommandKind;
use crate::status::EntryStatus;
use crate::types::{EntryId, VenueId};
use thiserror::Error;

/// Errors surfaced to the consumer that invoked an operation.
///
/// None of these trigger compensating transitions.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The entry's current status does not permit the operation.
    #[error("Cannot {operation} entry {entry_id}: it is {from}")]
    InvalidTransition {
        /// Target entry
        entry_id: EntryId,
        /// Status the entry was found in
        from: EntryStatus,
        /// Operation that was attempted
        operation: CommandKind,
    },

    /// The operation would create a second `up_next` or `now_singing` entry.
    #[error("Venue {venue_id} already has an entry {status}: {holder}")]
    InvariantViolation {
        /// Venue
        venue_id: VenueId,
        /// The single-holder status
        status: EntryStatus,
        /// Entry currently holding that status
        holder: EntryId,
    },

    /// The venue is paused and is not accepting new requests.
    #[error("The queue is paused; new requests are not being accepted right now.")]
    SubmissionPaused {
        /// Paused venue
        venue_id: VenueId,
    },

    /// No entry with this id exists.
    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The queue kept changing underneath the operation.
    #[error("Queue for venue {venue_id} changed concurrently; gave up after {attempts} attempts")]
    Conflict {
        /// Venue
        venue_id: VenueId,
        /// Attempts made, including the first
        attempts: usize,
    },

    /// The persistence layer failed.
    #[error("Storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl QueueError {
    /// Returns `true` if re-reading and re-planning may succeed.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            Self::SubmissionPaused { .. } => "QUEUE_PAUSED",
            Self::EntryNotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::Storage(_) => "STORAGE_FAILURE",
        }
    }
}

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VenuePaused(venue_id) => Self::SubmissionPaused { venue_id },
            StoreError::NotFound(entry_id) => Self::EntryNotFound(entry_id),
            StoreError::Conflict { venue_id, .. } => Self::Conflict {
                venue_id,
                attempts: 1,
            },
            err @ StoreError::Database(_) => Self::Storage(err),
        }
    }
}

/// Errors produced by [`QueueStore`](crate::store::QueueStore) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, query or transaction failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row no longer matches the plan's expectation, or the write
    /// would break a per-venue uniqueness invariant.
    #[error("Conflict on venue {venue_id}: {reason}")]
    Conflict {
        /// Venue
        venue_id: VenueId,
        /// What did not match
        reason: String,
    },

    /// Insert refused because the venue is paused.
    #[error("Venue {0} is paused")]
    VenuePaused(VenueId),

    /// Entry referenced by a change does not exist.
    #[error("Entry not found: {0}")]
    NotFound(EntryId),
}

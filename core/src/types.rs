//! Domain types for the performance queue.

use crate::error::QueueError;
use crate::position;
use crate::status::EntryStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length (in characters) of a song title or artist name.
pub const MAX_TEXT_LEN: usize = 200;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from a UUID
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of a queue entry
    EntryId
);
uuid_id!(
    /// Identifier of the venue that owns a queue
    VenueId
);
uuid_id!(
    /// Identifier of the singer who submitted a request
    RequesterId
);

/// One singer's queued request for a song.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Owning venue
    pub venue_id: VenueId,
    /// Singer who submitted the request
    pub requester_id: RequesterId,
    /// Song title (free text)
    pub song_title: String,
    /// Artist (free text)
    pub artist: String,
    /// Lifecycle status
    pub status: EntryStatus,
    /// Ordering key, unique among active entries of the venue
    pub position: i64,
    /// When the request was submitted
    pub requested_at: DateTime<Utc>,
    /// When the entry was completed or skipped
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Creates a freshly submitted `waiting` entry at `position`.
    #[must_use]
    pub fn submitted(request: SongRequest, position: i64, requested_at: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            venue_id: request.venue_id,
            requester_id: request.requester_id,
            song_title: request.song_title,
            artist: request.artist,
            status: EntryStatus::Waiting,
            position,
            requested_at,
            completed_at: None,
        }
    }

    /// Returns `true` if the entry takes part in ordering.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Per-venue queue flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueQueueState {
    /// Venue
    pub venue_id: VenueId,
    /// While `true`, new submissions are rejected
    pub paused: bool,
}

impl VenueQueueState {
    /// State of a venue that has never been paused.
    #[must_use]
    pub const fn open(venue_id: VenueId) -> Self {
        Self {
            venue_id,
            paused: false,
        }
    }
}

/// A singer's submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRequest {
    /// Venue to queue at
    pub venue_id: VenueId,
    /// Submitting singer
    pub requester_id: RequesterId,
    /// Song title
    pub song_title: String,
    /// Artist
    pub artist: String,
}

impl SongRequest {
    /// Creates a new request
    #[must_use]
    pub fn new(
        venue_id: VenueId,
        requester_id: RequesterId,
        song_title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            venue_id,
            requester_id,
            song_title: song_title.into(),
            artist: artist.into(),
        }
    }

    /// Trims the free-text fields and checks their lengths.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] if the title is empty or either field
    /// exceeds [`MAX_TEXT_LEN`] characters.
    pub fn normalized(self) -> Result<Self, QueueError> {
        let song_title = self.song_title.trim().to_string();
        let artist = self.artist.trim().to_string();

        if song_title.is_empty() {
            return Err(QueueError::Validation("Song title cannot be empty".to_string()));
        }
        if song_title.chars().count() > MAX_TEXT_LEN {
            return Err(QueueError::Validation(format!(
                "Song title too long (max {MAX_TEXT_LEN} characters)"
            )));
        }
        if artist.chars().count() > MAX_TEXT_LEN {
            return Err(QueueError::Validation(format!(
                "Artist too long (max {MAX_TEXT_LEN} characters)"
            )));
        }

        Ok(Self {
            song_title,
            artist,
            ..self
        })
    }
}

/// Full view of a venue's queue at one instant.
///
/// This is what every consumer re-fetches after a change notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Venue
    pub venue_id: VenueId,
    /// Whether submissions are paused
    pub paused: bool,
    /// Entry currently performing
    pub now_singing: Option<QueueEntry>,
    /// Entry confirmed as next
    pub up_next: Option<QueueEntry>,
    /// The line, ordered by position
    pub waiting: Vec<QueueEntry>,
    /// Skipped entries inside the retention window, most recent first
    pub recently_skipped: Vec<QueueEntry>,
    /// When the snapshot was read
    pub fetched_at: DateTime<Utc>,
}

impl QueueSnapshot {
    /// Empty snapshot for a venue.
    #[must_use]
    pub const fn empty(venue_id: VenueId, fetched_at: DateTime<Utc>) -> Self {
        Self {
            venue_id,
            paused: false,
            now_singing: None,
            up_next: None,
            waiting: Vec::new(),
            recently_skipped: Vec::new(),
            fetched_at,
        }
    }

    /// Groups raw rows into a snapshot.
    ///
    /// `rows` may contain active entries and skipped entries; completed entries
    /// are dropped.
    #[must_use]
    pub fn from_rows(
        state: VenueQueueState,
        rows: impl IntoIterator<Item = QueueEntry>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut snapshot = Self::empty(state.venue_id, fetched_at);
        snapshot.paused = state.paused;

        for entry in rows {
            match entry.status {
                EntryStatus::Waiting => snapshot.waiting.push(entry),
                EntryStatus::UpNext => snapshot.up_next = Some(entry),
                EntryStatus::NowSinging => snapshot.now_singing = Some(entry),
                EntryStatus::Skipped => snapshot.recently_skipped.push(entry),
                EntryStatus::Completed => {}
            }
        }

        snapshot.waiting.sort_by_key(|e| e.position);
        snapshot
            .recently_skipped
            .sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        snapshot
    }

    /// Active entries in position order.
    #[must_use]
    pub fn active_entries(&self) -> Vec<QueueEntry> {
        let mut active: Vec<QueueEntry> = self
            .now_singing
            .iter()
            .chain(self.up_next.iter())
            .chain(self.waiting.iter())
            .cloned()
            .collect();
        active.sort_by_key(|e| e.position);
        active
    }

    /// The waiting entry with the lowest position.
    #[must_use]
    pub fn head_of_line(&self) -> Option<&QueueEntry> {
        position::head_of_line(&self.waiting)
    }

    /// Looks up an entry anywhere in the snapshot.
    #[must_use]
    pub fn find(&self, entry_id: EntryId) -> Option<&QueueEntry> {
        self.now_singing
            .iter()
            .chain(self.up_next.iter())
            .chain(self.waiting.iter())
            .chain(self.recently_skipped.iter())
            .find(|e| e.id == entry_id)
    }

    /// Number of waiting entries ahead of `entry_id` in the line.
    #[must_use]
    pub fn ahead_of(&self, entry_id: EntryId) -> Option<usize> {
        self.waiting.iter().position(|e| e.id == entry_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(venue: VenueId, status: EntryStatus, position: i64) -> QueueEntry {
        let mut e = QueueEntry::submitted(
            SongRequest::new(venue, RequesterId::new(), "Song", "Artist"),
            position,
            Utc::now(),
        );
        e.status = status;
        e
    }

    #[test]
    fn test_request_is_trimmed() {
        let request = SongRequest::new(VenueId::new(), RequesterId::new(), "  Valerie ", " Amy ")
            .normalized()
            .unwrap();
        assert_eq!(request.song_title, "Valerie");
        assert_eq!(request.artist, "Amy");
    }

    #[test]
    fn test_request_rejects_blank_title() {
        let result =
            SongRequest::new(VenueId::new(), RequesterId::new(), "   ", "Amy").normalized();
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_request_rejects_long_artist() {
        let artist = "x".repeat(MAX_TEXT_LEN + 1);
        let result =
            SongRequest::new(VenueId::new(), RequesterId::new(), "Song", artist).normalized();
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_snapshot_grouping() {
        let venue = VenueId::new();
        let rows = vec![
            entry(venue, EntryStatus::Waiting, 5),
            entry(venue, EntryStatus::NowSinging, 1),
            entry(venue, EntryStatus::Waiting, 3),
            entry(venue, EntryStatus::UpNext, 2),
            entry(venue, EntryStatus::Completed, 0),
        ];

        let snapshot = QueueSnapshot::from_rows(VenueQueueState::open(venue), rows, Utc::now());

        assert_eq!(snapshot.now_singing.as_ref().unwrap().position, 1);
        assert_eq!(snapshot.up_next.as_ref().unwrap().position, 2);
        let line: Vec<i64> = snapshot.waiting.iter().map(|e| e.position).collect();
        assert_eq!(line, vec![3, 5]);
        assert_eq!(snapshot.head_of_line().unwrap().position, 3);
        assert_eq!(snapshot.active_entries().len(), 4);
    }

    #[test]
    fn test_ahead_of_counts_line_position() {
        let venue = VenueId::new();
        let first = entry(venue, EntryStatus::Waiting, 1);
        let second = entry(venue, EntryStatus::Waiting, 2);
        let second_id = second.id;

        let snapshot =
            QueueSnapshot::from_rows(VenueQueueState::open(venue), vec![second, first], Utc::now());

        assert_eq!(snapshot.ahead_of(second_id), Some(1));
        assert_eq!(snapshot.ahead_of(EntryId::new()), None);
    }
}

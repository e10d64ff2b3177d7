//! Command planning over a queue snapshot.
//!
//! [`plan`] is a pure function: it validates an operator command against the
//! rows it was given and describes the resulting writes as [`EntryChange`]
//! values. Nothing is written here. Each change records the `(status,
//! position)` the planner saw, so a store can refuse to apply a plan computed
//! from a stale read.
//!
//! The same planner backs the engine and a console's optimistic preview, which
//! is why [`apply_plan`] lives next to it.

use crate::error::{QueueError, StoreError};
use crate::position::{self, Direction};
use crate::status::EntryStatus;
use crate::types::{EntryId, QueueEntry, VenueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;

// ============================================================================
// Commands
// ============================================================================

/// Operator commands on existing entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum QueueCommand {
    /// `waiting → up_next` (manual "Up Next" or "Confirm Singer")
    Promote {
        /// Entry to promote
        entry_id: EntryId,
    },
    /// `up_next → now_singing`
    Start {
        /// Entry to start
        entry_id: EntryId,
    },
    /// `now_singing → completed`
    Complete {
        /// Entry to complete
        entry_id: EntryId,
    },
    /// `waiting | up_next → skipped`
    Skip {
        /// Entry to skip
        entry_id: EntryId,
    },
    /// `skipped → waiting` (undo) or timed-out head back to the tail
    Reinstate {
        /// Entry to reinstate
        entry_id: EntryId,
    },
    /// Exchange the positions of two waiting entries
    Swap {
        /// First entry
        a: EntryId,
        /// Second entry
        b: EntryId,
    },
    /// Exchange positions with the neighbour in the line
    Move {
        /// Entry to move
        entry_id: EntryId,
        /// Which neighbour
        direction: Direction,
    },
}

impl QueueCommand {
    /// The command's kind, for errors and metrics.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Promote { .. } => CommandKind::Promote,
            Self::Start { .. } => CommandKind::Start,
            Self::Complete { .. } => CommandKind::Complete,
            Self::Skip { .. } => CommandKind::Skip,
            Self::Reinstate { .. } => CommandKind::Reinstate,
            Self::Swap { .. } => CommandKind::Swap,
            Self::Move { .. } => CommandKind::Move,
        }
    }

    /// Entries the command names directly.
    #[must_use]
    pub fn entry_ids(&self) -> SmallVec<[EntryId; 2]> {
        match *self {
            Self::Promote { entry_id }
            | Self::Start { entry_id }
            | Self::Complete { entry_id }
            | Self::Skip { entry_id }
            | Self::Reinstate { entry_id }
            | Self::Move { entry_id, .. } => smallvec![entry_id],
            Self::Swap { a, b } => smallvec![a, b],
        }
    }
}

/// Operation names, without arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Submission of a new request
    Submit,
    /// See [`QueueCommand::Promote`]
    Promote,
    /// See [`QueueCommand::Start`]
    Start,
    /// See [`QueueCommand::Complete`]
    Complete,
    /// See [`QueueCommand::Skip`]
    Skip,
    /// See [`QueueCommand::Reinstate`]
    Reinstate,
    /// See [`QueueCommand::Swap`]
    Swap,
    /// See [`QueueCommand::Move`]
    Move,
    /// Pause flag change
    Pause,
}

impl CommandKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Promote => "promote",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Skip => "skip",
            Self::Reinstate => "reinstate",
            Self::Swap => "swap",
            Self::Move => "move",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Changes
// ============================================================================

/// Row state a change was planned against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expected {
    /// Status seen at planning time
    pub status: EntryStatus,
    /// Position seen at planning time
    pub position: i64,
}

/// How a change affects `position`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PositionChange {
    /// Leave as is
    Keep,
    /// Set to this value
    Exact(i64),
    /// `max(active position) + 1`, resolved at write time
    Tail,
}

/// How a change affects `completed_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CompletedAtChange {
    /// Leave as is
    Keep,
    /// Set to this instant
    Set(DateTime<Utc>),
    /// Clear
    Clear,
}

/// One expectation-checked row update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryChange {
    /// Row to update
    pub entry_id: EntryId,
    /// What the row must still look like
    pub expected: Expected,
    /// New status, if it changes
    pub status: Option<EntryStatus>,
    /// Position update
    pub position: PositionChange,
    /// `completed_at` update
    pub completed_at: CompletedAtChange,
}

impl EntryChange {
    /// A change that expects `entry` as it is and updates nothing yet.
    #[must_use]
    pub const fn for_entry(entry: &QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            expected: Expected {
                status: entry.status,
                position: entry.position,
            },
            status: None,
            position: PositionChange::Keep,
            completed_at: CompletedAtChange::Keep,
        }
    }

    /// Sets the new status.
    #[must_use]
    pub const fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the position update.
    #[must_use]
    pub const fn with_position(mut self, position: PositionChange) -> Self {
        self.position = position;
        self
    }

    /// Sets the `completed_at` update.
    #[must_use]
    pub const fn with_completed_at(mut self, completed_at: CompletedAtChange) -> Self {
        self.completed_at = completed_at;
        self
    }

    /// Returns `true` if `entry` still matches what the planner saw.
    #[must_use]
    pub fn matches(&self, entry: &QueueEntry) -> bool {
        entry.id == self.entry_id
            && entry.status == self.expected.status
            && entry.position == self.expected.position
    }

    /// Returns `true` if the change needs the tail position resolved.
    #[must_use]
    pub const fn needs_tail(&self) -> bool {
        matches!(self.position, PositionChange::Tail)
    }

    /// Applies the change, using `tail` for [`PositionChange::Tail`].
    pub fn apply_to(&self, entry: &mut QueueEntry, tail: i64) {
        if let Some(status) = self.status {
            entry.status = status;
        }
        match self.position {
            PositionChange::Keep => {}
            PositionChange::Exact(position) => entry.position = position,
            PositionChange::Tail => entry.position = tail,
        }
        match self.completed_at {
            CompletedAtChange::Keep => {}
            CompletedAtChange::Set(at) => entry.completed_at = Some(at),
            CompletedAtChange::Clear => entry.completed_at = None,
        }
    }
}

/// The writes one command produces. Swaps touch two rows, everything else one.
pub type Plan = SmallVec<[EntryChange; 2]>;

// ============================================================================
// Planning
// ============================================================================

/// Rows a command is planned against.
#[derive(Clone, Copy, Debug)]
pub struct PlanInput<'a> {
    /// Every active entry of the venue
    pub active: &'a [QueueEntry],
    /// Named entries that are not active (e.g. a skipped entry being reinstated)
    pub inactive: &'a [QueueEntry],
}

impl<'a> PlanInput<'a> {
    /// Creates a new input
    #[must_use]
    pub const fn new(active: &'a [QueueEntry], inactive: &'a [QueueEntry]) -> Self {
        Self { active, inactive }
    }

    /// Finds an entry by id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EntryNotFound`] if neither list holds it.
    pub fn find(&self, entry_id: EntryId) -> Result<&'a QueueEntry, QueueError> {
        self.active
            .iter()
            .chain(self.inactive.iter())
            .find(|e| e.id == entry_id)
            .ok_or(QueueError::EntryNotFound(entry_id))
    }
}

/// Validates `command` against `input` and describes its writes.
///
/// # Errors
///
/// - [`QueueError::EntryNotFound`] if a named entry is missing from `input`
/// - [`QueueError::InvalidTransition`] if an entry's status does not permit the command
/// - [`QueueError::InvariantViolation`] if another entry already holds `up_next`/`now_singing`
/// - [`QueueError::Validation`] for malformed reorders
pub fn plan(
    command: QueueCommand,
    input: PlanInput<'_>,
    now: DateTime<Utc>,
) -> Result<Plan, QueueError> {
    let kind = command.kind();

    match command {
        QueueCommand::Promote { entry_id } => {
            let entry = input.find(entry_id)?;
            require_transition(entry, EntryStatus::UpNext, kind)?;
            require_vacant(input.active, entry, EntryStatus::UpNext)?;
            Ok(smallvec![
                EntryChange::for_entry(entry).with_status(EntryStatus::UpNext)
            ])
        }

        QueueCommand::Start { entry_id } => {
            let entry = input.find(entry_id)?;
            require_transition(entry, EntryStatus::NowSinging, kind)?;
            require_vacant(input.active, entry, EntryStatus::NowSinging)?;
            Ok(smallvec![
                EntryChange::for_entry(entry).with_status(EntryStatus::NowSinging)
            ])
        }

        QueueCommand::Complete { entry_id } => {
            let entry = input.find(entry_id)?;
            require_transition(entry, EntryStatus::Completed, kind)?;
            Ok(smallvec![
                EntryChange::for_entry(entry)
                    .with_status(EntryStatus::Completed)
                    .with_completed_at(CompletedAtChange::Set(now))
            ])
        }

        QueueCommand::Skip { entry_id } => {
            let entry = input.find(entry_id)?;
            require_transition(entry, EntryStatus::Skipped, kind)?;
            Ok(smallvec![
                EntryChange::for_entry(entry)
                    .with_status(EntryStatus::Skipped)
                    .with_completed_at(CompletedAtChange::Set(now))
            ])
        }

        QueueCommand::Reinstate { entry_id } => plan_reinstate(input, entry_id),

        QueueCommand::Swap { a, b } => plan_swap(input, a, b, kind),

        QueueCommand::Move {
            entry_id,
            direction,
        } => {
            let entry = input.find(entry_id)?;
            require_waiting(entry, kind)?;

            let line = position::waiting_line(input.active);
            let Some(other) = position::neighbour(&line, entry_id, direction) else {
                let edge = match direction {
                    Direction::Up => "head",
                    Direction::Down => "end",
                };
                return Err(QueueError::Validation(format!(
                    "Entry {entry_id} is already at the {edge} of the line"
                )));
            };

            plan_swap(input, entry_id, other.id, kind)
        }
    }
}

fn plan_reinstate(input: PlanInput<'_>, entry_id: EntryId) -> Result<Plan, QueueError> {
    let entry = input.find(entry_id)?;

    match entry.status {
        EntryStatus::Skipped => Ok(smallvec![
            EntryChange::for_entry(entry)
                .with_status(EntryStatus::Waiting)
                .with_position(PositionChange::Tail)
                .with_completed_at(CompletedAtChange::Clear)
        ]),
        // Only the head goes back in line, and only if someone is behind it
        EntryStatus::Waiting
            if position::head_of_line(input.active).is_some_and(|head| head.id == entry_id)
                && position::waiting_line(input.active).len() > 1 =>
        {
            Ok(smallvec![
                EntryChange::for_entry(entry).with_position(PositionChange::Tail)
            ])
        }
        from => Err(QueueError::InvalidTransition {
            entry_id,
            from,
            operation: CommandKind::Reinstate,
        }),
    }
}

fn plan_swap(
    input: PlanInput<'_>,
    a: EntryId,
    b: EntryId,
    kind: CommandKind,
) -> Result<Plan, QueueError> {
    if a == b {
        return Err(QueueError::Validation(format!(
            "Cannot swap entry {a} with itself"
        )));
    }

    let first = input.find(a)?;
    let second = input.find(b)?;
    require_waiting(first, kind)?;
    require_waiting(second, kind)?;

    if first.venue_id != second.venue_id {
        return Err(QueueError::Validation(format!(
            "Entries {a} and {b} belong to different venues"
        )));
    }

    Ok(smallvec![
        EntryChange::for_entry(first).with_position(PositionChange::Exact(second.position)),
        EntryChange::for_entry(second).with_position(PositionChange::Exact(first.position)),
    ])
}

fn require_transition(
    entry: &QueueEntry,
    target: EntryStatus,
    operation: CommandKind,
) -> Result<(), QueueError> {
    if entry.status.can_transition_to(target) && entry.status != target {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            entry_id: entry.id,
            from: entry.status,
            operation,
        })
    }
}

fn require_waiting(entry: &QueueEntry, operation: CommandKind) -> Result<(), QueueError> {
    if entry.status == EntryStatus::Waiting {
        Ok(())
    } else {
        Err(QueueError::InvalidTransition {
            entry_id: entry.id,
            from: entry.status,
            operation,
        })
    }
}

fn require_vacant(
    active: &[QueueEntry],
    entry: &QueueEntry,
    status: EntryStatus,
) -> Result<(), QueueError> {
    match position::holder(active, status, entry.id) {
        Some(holder) => Err(QueueError::InvariantViolation {
            venue_id: entry.venue_id,
            status,
            holder: holder.id,
        }),
        None => Ok(()),
    }
}

// ============================================================================
// Applying
// ============================================================================

/// Applies `plan` to a venue's rows, all or nothing.
///
/// `rows` must contain every active entry of the venue plus any inactive entry
/// the plan names. On success, returns the updated entries in plan order; the
/// caller writes them back. `rows` itself is never modified.
///
/// # Errors
///
/// - [`StoreError::NotFound`] if a planned entry is missing from `rows`
/// - [`StoreError::Conflict`] if a row no longer matches its expectation, or the
///   result would break position uniqueness or the single `up_next`/`now_singing` rule
pub fn apply_plan(
    venue_id: VenueId,
    rows: &[QueueEntry],
    plan: &[EntryChange],
) -> Result<Vec<QueueEntry>, StoreError> {
    let tail = position::next_tail_position(rows);
    let mut after: Vec<QueueEntry> = rows.to_vec();
    let mut updated = Vec::with_capacity(plan.len());

    for change in plan {
        let entry = after
            .iter_mut()
            .find(|e| e.id == change.entry_id)
            .ok_or(StoreError::NotFound(change.entry_id))?;

        if !change.matches(entry) {
            return Err(StoreError::Conflict {
                venue_id,
                reason: format!(
                    "entry {} is {} at position {}, expected {} at position {}",
                    entry.id,
                    entry.status,
                    entry.position,
                    change.expected.status,
                    change.expected.position
                ),
            });
        }

        change.apply_to(entry, tail);
        updated.push(entry.clone());
    }

    if !position::positions_distinct(&after) {
        return Err(StoreError::Conflict {
            venue_id,
            reason: "active positions would collide".to_string(),
        });
    }
    if !position::single_holders(&after) {
        return Err(StoreError::Conflict {
            venue_id,
            reason: "a second up_next or now_singing entry would exist".to_string(),
        });
    }

    Ok(updated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{RequesterId, SongRequest};

    fn entry(venue: VenueId, status: EntryStatus, position: i64) -> QueueEntry {
        let mut e = QueueEntry::submitted(
            SongRequest::new(venue, RequesterId::new(), "Song", "Artist"),
            position,
            Utc::now(),
        );
        e.status = status;
        e
    }

    fn line(venue: VenueId, n: i64) -> Vec<QueueEntry> {
        (1..=n).map(|p| entry(venue, EntryStatus::Waiting, p)).collect()
    }

    #[test]
    fn test_promote_changes_only_target() {
        let venue = VenueId::new();
        let rows = line(venue, 3);
        let target = rows[1].id;

        let plan = plan(
            QueueCommand::Promote { entry_id: target },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].entry_id, target);
        assert_eq!(plan[0].status, Some(EntryStatus::UpNext));
        assert_eq!(plan[0].position, PositionChange::Keep);
    }

    #[test]
    fn test_second_up_next_is_invariant_violation() {
        let venue = VenueId::new();
        let mut rows = line(venue, 2);
        rows[0].status = EntryStatus::UpNext;
        let holder = rows[0].id;

        let result = plan(
            QueueCommand::Promote {
                entry_id: rows[1].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );

        assert!(matches!(
            result,
            Err(QueueError::InvariantViolation {
                holder: h,
                status: EntryStatus::UpNext,
                ..
            }) if h == holder
        ));
    }

    #[test]
    fn test_start_requires_up_next() {
        let venue = VenueId::new();
        let rows = line(venue, 1);

        let result = plan(
            QueueCommand::Start {
                entry_id: rows[0].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );

        assert!(matches!(
            result,
            Err(QueueError::InvalidTransition {
                from: EntryStatus::Waiting,
                operation: CommandKind::Start,
                ..
            })
        ));
    }

    #[test]
    fn test_skip_sets_completed_at() {
        let venue = VenueId::new();
        let rows = line(venue, 1);
        let now = Utc::now();

        let plan = plan(
            QueueCommand::Skip {
                entry_id: rows[0].id,
            },
            PlanInput::new(&rows, &[]),
            now,
        )
        .unwrap();

        assert_eq!(plan[0].status, Some(EntryStatus::Skipped));
        assert_eq!(plan[0].completed_at, CompletedAtChange::Set(now));
    }

    #[test]
    fn test_reinstate_skipped_goes_to_tail() {
        let venue = VenueId::new();
        let rows = line(venue, 2);
        let mut skipped = entry(venue, EntryStatus::Skipped, 1);
        skipped.completed_at = Some(Utc::now());

        let plan = plan(
            QueueCommand::Reinstate {
                entry_id: skipped.id,
            },
            PlanInput::new(&rows, std::slice::from_ref(&skipped)),
            Utc::now(),
        )
        .unwrap();

        let mut all = rows.clone();
        all.push(skipped.clone());
        let updated = apply_plan(venue, &all, &plan).unwrap();

        assert_eq!(updated[0].status, EntryStatus::Waiting);
        assert_eq!(updated[0].position, 3);
        assert!(updated[0].completed_at.is_none());
    }

    #[test]
    fn test_reinstate_only_applies_to_head() {
        let venue = VenueId::new();
        let rows = line(venue, 3);

        let head = plan(
            QueueCommand::Reinstate {
                entry_id: rows[0].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        )
        .unwrap();
        let updated = apply_plan(venue, &rows, &head).unwrap();
        assert_eq!(updated[0].position, 4);
        assert_eq!(updated[0].status, EntryStatus::Waiting);

        let not_head = plan(
            QueueCommand::Reinstate {
                entry_id: rows[1].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );
        assert!(matches!(not_head, Err(QueueError::InvalidTransition { .. })));
    }

    #[test]
    fn test_reinstate_sole_waiting_entry_rejected() {
        let venue = VenueId::new();
        let rows = line(venue, 1);

        let result = plan(
            QueueCommand::Reinstate {
                entry_id: rows[0].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );

        assert!(matches!(result, Err(QueueError::InvalidTransition { .. })));
    }

    #[test]
    fn test_swap_exchanges_positions() {
        let venue = VenueId::new();
        let rows = line(venue, 2);

        let plan = plan(
            QueueCommand::Swap {
                a: rows[0].id,
                b: rows[1].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        )
        .unwrap();
        let updated = apply_plan(venue, &rows, &plan).unwrap();

        assert_eq!(updated[0].id, rows[0].id);
        assert_eq!(updated[0].position, 2);
        assert_eq!(updated[1].position, 1);
        assert_eq!(updated[0].status, EntryStatus::Waiting);
        assert_eq!(updated[0].song_title, rows[0].song_title);
    }

    #[test]
    fn test_swap_with_itself_rejected() {
        let venue = VenueId::new();
        let rows = line(venue, 1);
        let id = rows[0].id;

        let result = plan(
            QueueCommand::Swap { a: id, b: id },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_move_up_at_head_rejected() {
        let venue = VenueId::new();
        let rows = line(venue, 2);

        let result = plan(
            QueueCommand::Move {
                entry_id: rows[0].id,
                direction: Direction::Up,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        );
        assert!(matches!(result, Err(QueueError::Validation(_))));
    }

    #[test]
    fn test_move_down_swaps_with_next() {
        let venue = VenueId::new();
        let mut rows = line(venue, 3);
        // A gap in positions must not matter
        rows[2].position = 10;

        let plan = plan(
            QueueCommand::Move {
                entry_id: rows[1].id,
                direction: Direction::Down,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].position, PositionChange::Exact(10));
        assert_eq!(plan[1].entry_id, rows[2].id);
        assert_eq!(plan[1].position, PositionChange::Exact(2));
    }

    #[test]
    fn test_stale_expectation_is_conflict() {
        let venue = VenueId::new();
        let rows = line(venue, 2);

        let plan = plan(
            QueueCommand::Swap {
                a: rows[0].id,
                b: rows[1].id,
            },
            PlanInput::new(&rows, &[]),
            Utc::now(),
        )
        .unwrap();

        // Someone else swapped first
        let mut moved = rows.clone();
        moved[0].position = 2;
        moved[1].position = 1;

        assert!(matches!(
            apply_plan(venue, &moved, &plan),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_apply_rejects_second_now_singing() {
        let venue = VenueId::new();
        let mut rows = line(venue, 2);
        rows[0].status = EntryStatus::NowSinging;
        rows[1].status = EntryStatus::UpNext;

        let change = EntryChange::for_entry(&rows[1]).with_status(EntryStatus::NowSinging);
        assert!(matches!(
            apply_plan(venue, &rows, &[change]),
            Err(StoreError::Conflict { .. })
        ));
    }

    #[test]
    fn test_command_serialization() {
        let id = EntryId::new();
        let json = serde_json::to_value(QueueCommand::Move {
            entry_id: id,
            direction: Direction::Up,
        })
        .unwrap();
        assert_eq!(json["command"], "move");
        assert_eq!(json["direction"], "up");
    }
}

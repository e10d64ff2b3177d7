//! Position assignment and local reordering.
//!
//! Positions are assigned, never renumbered: new and reinstated entries take
//! `max(active position) + 1`, and reordering exchanges the positions of two
//! neighbours in the waiting line. A move touches exactly two rows, so moves on
//! disjoint pairs never contend.

use crate::status::EntryStatus;
use crate::types::{EntryId, QueueEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Position given to the first entry of an empty queue.
pub const FIRST_POSITION: i64 = 1;

/// Direction of a single-step move within the line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the head of the line
    Up,
    /// Towards the tail of the line
    Down,
}

/// Position the next appended entry receives.
///
/// Only active entries are considered; finished entries keep stale positions.
#[must_use]
pub fn next_tail_position<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> i64 {
    entries
        .into_iter()
        .filter(|e| e.is_active())
        .map(|e| e.position)
        .max()
        .map_or(FIRST_POSITION, |max| max + 1)
}

/// Waiting entries ordered by position ascending.
#[must_use]
pub fn waiting_line(entries: &[QueueEntry]) -> Vec<&QueueEntry> {
    let mut line: Vec<&QueueEntry> = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Waiting)
        .collect();
    line.sort_by_key(|e| e.position);
    line
}

/// The waiting entry with the lowest position.
#[must_use]
pub fn head_of_line(entries: &[QueueEntry]) -> Option<&QueueEntry> {
    entries
        .iter()
        .filter(|e| e.status == EntryStatus::Waiting)
        .min_by_key(|e| e.position)
}

/// The entry immediately before (`Up`) or after (`Down`) `entry_id` in `line`.
#[must_use]
pub fn neighbour<'a>(
    line: &[&'a QueueEntry],
    entry_id: EntryId,
    direction: Direction,
) -> Option<&'a QueueEntry> {
    let index = line.iter().position(|e| e.id == entry_id)?;
    match direction {
        Direction::Up => index.checked_sub(1).and_then(|i| line.get(i)).copied(),
        Direction::Down => line.get(index + 1).copied(),
    }
}

/// The active entry holding `status`, other than `except`.
#[must_use]
pub fn holder(entries: &[QueueEntry], status: EntryStatus, except: EntryId) -> Option<&QueueEntry> {
    entries
        .iter()
        .find(|e| e.status == status && e.id != except)
}

/// Returns `true` if no two active entries share a position.
#[must_use]
pub fn positions_distinct(entries: &[QueueEntry]) -> bool {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| e.is_active())
        .all(|e| seen.insert(e.position))
}

/// Returns `true` if at most one entry is `up_next` and at most one is `now_singing`.
#[must_use]
pub fn single_holders(entries: &[QueueEntry]) -> bool {
    let count = |status| entries.iter().filter(|e| e.status == status).count();
    count(EntryStatus::UpNext) <= 1 && count(EntryStatus::NowSinging) <= 1
}
